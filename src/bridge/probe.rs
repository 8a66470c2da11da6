//! Capability probing.
//!
//! Given a freshly loaded renderer module, the prober finds a constructor signature
//! that works, then resolves every capability slot against the new instance. All
//! candidate lists are fixed and scanned attribute names are sorted, so the same
//! renderer always yields the same [`CapabilityMap`].

use crate::bridge::action::LogicalAction;
use crate::bridge::capability::{
    ActionBinding, CapabilityMap, FrameAccessor, RefreshHook, StateProbe,
};
use crate::config::{self, DisplayProfile};
use crate::error::{PreviewError, Result};
use crate::renderer::{
    ConstructorArgs, Dependencies, GpioStub, RendererModule, RendererObject, SignatureKind, Value,
};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Zero-argument frame methods, in probe order.
pub const FRAME_METHODS: &[&str] = &["get_frame", "get_framebuffer"];
/// Attributes that conventionally hold the framebuffer, in probe order.
pub const FRAME_ATTRIBUTES: &[&str] = &["framebuffer", "image", "frame", "newimage", "buffer"];
/// Upper bound on attributes inspected by the structural scan.
pub const MAX_SCANNED_ATTRIBUTES: usize = 64;

pub const REFRESH_METHODS: &[&str] = &[
    "render",
    "draw",
    "update",
    "tick",
    "loop",
    "paint",
    "display",
    "refresh",
    "render_menu",
    "renderMenu",
];
/// Child object some renderers draw into instead of holding the frame themselves.
pub const LCD_OBJECT: &str = "LCD";
pub const LCD_FRAME_ATTRIBUTES: &[&str] = &["frame", "image", "framebuffer", "newimage", "buffer"];
pub const LCD_REFRESH_METHODS: &[&str] = &[
    "display",
    "refresh",
    "show",
    "update",
    "LCD_Display",
    "LCD_Show",
];

pub const CLEANUP_METHODS: &[&str] = &["cleanup", "close", "shutdown", "stop"];
pub const SNAPSHOT_METHODS: &[&str] = &["current_screen", "get_state", "screen_id"];
pub const SNAPSHOT_ATTRIBUTES: &[&str] = &["current_location", "current_screen"];
pub const RESTORE_METHODS: &[&str] = &["restore_state", "set_state", "go_to", "goto_screen"];
pub const GENERIC_INPUT_METHODS: &[&str] = &["handle_key", "handle_input", "on_key"];
pub const ENCODER_METHODS: &[&str] = &["encoder", "on_encoder", "rotate", "on_rotate"];

/// Number of back presses standing in for a missing home action.
pub const HOME_VIA_BACK_PRESSES: u8 = 5;

/// Preferred call for an action, tried before the plain method names.
fn preferred_call(action: LogicalAction) -> Option<(&'static str, Value)> {
    match action {
        LogicalAction::Up => Some(("change_pointer", Value::Int(-1))),
        LogicalAction::Down => Some(("change_pointer", Value::Int(1))),
        LogicalAction::Left => Some(("change_value", Value::from("LEFT"))),
        LogicalAction::Right => Some(("change_value", Value::from("RIGHT"))),
        LogicalAction::Select => Some(("enter_menu", Value::None)),
        LogicalAction::Back => Some(("go_back", Value::None)),
        _ => None,
    }
}

/// Zero-argument method names for an action, in probe order.
pub fn action_candidates(action: LogicalAction) -> &'static [&'static str] {
    match action {
        LogicalAction::Up => &["button_up", "on_up", "nav_up", "up"],
        LogicalAction::Down => &["button_down", "on_down", "nav_down", "down"],
        LogicalAction::Left => &["button_left", "on_left", "nav_left", "left"],
        LogicalAction::Right => &["button_right", "on_right", "nav_right", "right"],
        LogicalAction::Select => &["button_enter", "on_enter", "select", "enter", "ok"],
        LogicalAction::Back => &["button_back", "on_back", "back", "cancel"],
        LogicalAction::Home => &["home", "go_home", "to_root", "menu_home"],
        LogicalAction::EncoderCw | LogicalAction::EncoderCcw => &[],
    }
}

/// Everything a constructor might need.
///
/// The font directory is looked up again on every probe, so fonts dropped into
/// `<root>/fonts` after startup reach the next rebind.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    pub root: PathBuf,
    /// Directory named by the font environment variable, tried after the root's own
    pub font_env: Option<PathBuf>,
    pub display_profile: Option<DisplayProfile>,
    pub gpio: GpioStub,
}

impl ProbeContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            font_env: None,
            display_profile: None,
            gpio: GpioStub::new(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn font_dir(&self) -> Option<PathBuf> {
        config::discover_font_dir(&self.root, self.font_env.clone())
    }

    fn missing_fonts_hint(&self) -> String {
        format!(
            "missing fonts {}: place them in {} or set {}",
            config::REQUIRED_FONTS.join(" / "),
            self.root.join("fonts").display(),
            config::FONT_DIR_ENV
        )
    }
}

/// A constructed instance with its resolved capabilities.
pub struct ProbeOutcome {
    pub instance: Box<dyn RendererObject>,
    pub capabilities: CapabilityMap,
}

/// Discovers how to drive a renderer module.
#[derive(Debug, Clone)]
pub struct Prober {
    context: ProbeContext,
}

impl Prober {
    pub fn new(context: ProbeContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ProbeContext {
        &self.context
    }

    pub fn set_display_profile(&mut self, profile: Option<DisplayProfile>) {
        self.context.display_profile = profile;
    }

    /// Constructor attempts in probe order.
    pub fn candidate_signatures(&self) -> Vec<ConstructorArgs> {
        self.signatures(self.context.font_dir())
    }

    fn signatures(&self, font_dir: Option<PathBuf>) -> Vec<ConstructorArgs> {
        vec![
            ConstructorArgs::NoArgs,
            ConstructorArgs::ConfigPath(self.context.config_path()),
            ConstructorArgs::Dependencies(Dependencies {
                config_path: self.context.config_path(),
                font_dir,
                display_profile: self.context.display_profile,
                gpio: self.context.gpio.clone(),
            }),
        ]
    }

    /// Construct an instance and resolve its capability map.
    pub fn probe(&self, module: &dyn RendererModule) -> Result<ProbeOutcome> {
        let font_dir = self.context.font_dir();
        match &font_dir {
            Some(dir) => log::debug!("fonts found in {}", dir.display()),
            None => log::debug!("no font directory under {}", self.context.root.display()),
        }
        let fonts_missing = font_dir.is_none();

        let mut failures = Vec::new();
        for args in self.signatures(font_dir) {
            match module.construct(&args) {
                Ok(mut instance) => {
                    log::debug!(
                        "{} constructed with {} signature",
                        module.name(),
                        args.kind().as_str()
                    );
                    let capabilities = resolve_capabilities(instance.as_mut(), &args);
                    return Ok(ProbeOutcome {
                        instance,
                        capabilities,
                    });
                }
                Err(fault) => {
                    log::debug!(
                        "{} rejected {} signature: {}",
                        module.name(),
                        args.kind().as_str(),
                        fault
                    );
                    failures.push(format!("{}: {}", args.kind().as_str(), fault));
                    if args.kind() == SignatureKind::Dependencies {
                        // A rejected attempt may have registered callbacks before failing.
                        self.context.gpio.cleanup();
                    }
                }
            }
        }
        let mut message = format!(
            "no constructor signature accepted by {} ({})",
            module.name(),
            failures.join("; ")
        );
        if fonts_missing {
            message.push_str("; ");
            message.push_str(&self.context.missing_fonts_hint());
        }
        Err(PreviewError::binding(message))
    }
}

fn resolve_capabilities(
    instance: &mut dyn RendererObject,
    args: &ConstructorArgs,
) -> CapabilityMap {
    let refresh = resolve_refresh(instance);
    if let Some(hook) = &refresh {
        // The first frame usually only exists after one render pass.
        if let Err(fault) = hook.call(instance) {
            log::warn!("initial {hook} failed: {fault}");
        }
    }

    let frame = resolve_frame_accessor(instance);
    if !frame.is_supported() {
        log::warn!("no frame accessor found; frames will be unavailable");
    }

    CapabilityMap {
        constructor: args.kind(),
        frame,
        actions: resolve_actions(instance),
        refresh,
        cleanup: first_method(instance, CLEANUP_METHODS),
        snapshot: resolve_snapshot(instance),
        restore: first_method(instance, RESTORE_METHODS),
    }
}

fn first_method(instance: &dyn RendererObject, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find(|name| instance.has_method(name))
        .map(|name| name.to_string())
}

/// Own render methods first, then the `LCD` child's display methods.
fn resolve_refresh(instance: &dyn RendererObject) -> Option<RefreshHook> {
    if let Some(name) = first_method(instance, REFRESH_METHODS) {
        return Some(RefreshHook::Method(name));
    }
    let lcd = instance.child(LCD_OBJECT)?;
    first_method(lcd, LCD_REFRESH_METHODS).map(|method| RefreshHook::Child {
        object: LCD_OBJECT.to_string(),
        method,
    })
}

/// Resolve the frame accessor: methods, then well-known attributes, then a bounded
/// scan, then the same attribute search on the `LCD` child.
pub fn resolve_frame_accessor(instance: &mut dyn RendererObject) -> FrameAccessor {
    for name in FRAME_METHODS {
        if !instance.has_method(name) {
            continue;
        }
        match instance.call(name, &[]) {
            Ok(value) if value.as_image().is_some() => {
                return FrameAccessor::Method(name.to_string())
            }
            Ok(value) => log::debug!("{name}() returned {value}, not an image"),
            Err(fault) => log::debug!("{name}() failed while probing: {fault}"),
        }
    }

    if let Some(name) = find_image_attribute(instance, FRAME_ATTRIBUTES) {
        return FrameAccessor::Attribute(name);
    }
    if let Some(name) = scan_image_attributes(instance, FRAME_ATTRIBUTES) {
        return FrameAccessor::Scanned(name);
    }

    let Some(lcd) = instance.child(LCD_OBJECT) else {
        return FrameAccessor::Unsupported;
    };
    find_image_attribute(lcd, LCD_FRAME_ATTRIBUTES)
        .or_else(|| scan_image_attributes(lcd, LCD_FRAME_ATTRIBUTES))
        .map(|attribute| FrameAccessor::Child {
            object: LCD_OBJECT.to_string(),
            attribute,
        })
        .unwrap_or(FrameAccessor::Unsupported)
}

fn find_image_attribute(object: &dyn RendererObject, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find(|name| is_image_attribute(object, name))
        .map(|name| name.to_string())
}

/// Sorted, capped scan over attributes not already tried by name.
fn scan_image_attributes(object: &dyn RendererObject, tried: &[&str]) -> Option<String> {
    let mut names = object.attribute_names();
    names.sort();
    names.dedup();
    names
        .into_iter()
        .filter(|name| !tried.contains(&name.as_str()))
        .take(MAX_SCANNED_ATTRIBUTES)
        .find(|name| is_image_attribute(object, name))
}

fn is_image_attribute(instance: &dyn RendererObject, name: &str) -> bool {
    instance
        .attribute(name)
        .is_some_and(|value| value.as_image().is_some())
}

/// Resolve every logical action against the instance's methods.
pub fn resolve_actions(instance: &dyn RendererObject) -> BTreeMap<LogicalAction, ActionBinding> {
    let generic = first_method(instance, GENERIC_INPUT_METHODS);
    let mut actions = BTreeMap::new();

    // Direct actions first; encoder and home may derive from them.
    for action in LogicalAction::ALL {
        if action.is_encoder() {
            continue;
        }
        let binding = direct_binding(instance, action)
            .or_else(|| {
                generic.as_ref().map(|method| ActionBinding::Generic {
                    method: method.clone(),
                    symbol: action.symbol().to_string(),
                })
            })
            .unwrap_or(ActionBinding::Unsupported);
        actions.insert(action, binding);
    }

    let home_unsupported = matches!(
        actions.get(&LogicalAction::Home),
        Some(ActionBinding::Unsupported)
    );
    let back_supported = actions
        .get(&LogicalAction::Back)
        .is_some_and(ActionBinding::is_supported);
    if home_unsupported && back_supported {
        actions.insert(
            LogicalAction::Home,
            ActionBinding::Derived {
                via: LogicalAction::Back,
                repeat: HOME_VIA_BACK_PRESSES,
            },
        );
    }

    for (action, delta, fallback) in [
        (LogicalAction::EncoderCw, 1, LogicalAction::Down),
        (LogicalAction::EncoderCcw, -1, LogicalAction::Up),
    ] {
        let binding = match first_method(instance, ENCODER_METHODS) {
            Some(name) => ActionBinding::Method {
                name,
                args: vec![Value::Int(delta)],
            },
            None if actions.get(&fallback).is_some_and(ActionBinding::is_supported) => {
                ActionBinding::Derived {
                    via: fallback,
                    repeat: 1,
                }
            }
            None => ActionBinding::Unsupported,
        };
        actions.insert(action, binding);
    }

    actions
}

fn direct_binding(instance: &dyn RendererObject, action: LogicalAction) -> Option<ActionBinding> {
    if let Some((name, arg)) = preferred_call(action) {
        if instance.has_method(name) {
            let args = if arg.is_none() { Vec::new() } else { vec![arg] };
            return Some(ActionBinding::Method {
                name: name.to_string(),
                args,
            });
        }
    }
    first_method(instance, action_candidates(action)).map(|name| ActionBinding::Method {
        name,
        args: Vec::new(),
    })
}

fn resolve_snapshot(instance: &dyn RendererObject) -> Option<StateProbe> {
    first_method(instance, SNAPSHOT_METHODS)
        .map(StateProbe::Method)
        .or_else(|| {
            SNAPSHOT_ATTRIBUTES
                .iter()
                .find(|name| instance.attribute(name).is_some_and(|value| !value.is_none()))
                .map(|name| StateProbe::Attribute(name.to_string()))
        })
}

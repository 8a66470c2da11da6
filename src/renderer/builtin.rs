//! Built-in demo menu renderer.
//!
//! A small in-process renderer with the same shape as the device menu code: a screen
//! stack, a pointer, a value that left/right adjust, hardware buttons registered on the
//! GPIO stub, and an RGB565 framebuffer sized for the selected LCD. It lets the binary
//! and the tests run without an external renderer checkout.

use super::gpio::{Direction, Edge, GpioStub};
use super::{
    ConstructorArgs, FaultResult, ModuleLoader, PixelFormat, RawImage, RendererFault,
    RendererModule, RendererObject, Value,
};
use crate::config::DisplayProfile;
use parking_lot::Mutex;
use std::sync::Arc;

/// Joystick and key pins of the 1.44" LCD HAT, BCM numbering.
pub const PIN_UP: u8 = 6;
pub const PIN_DOWN: u8 = 19;
pub const PIN_LEFT: u8 = 5;
pub const PIN_RIGHT: u8 = 26;
pub const PIN_PRESS: u8 = 13;
pub const PIN_KEY1: u8 = 21;
pub const PIN_KEY3: u8 = 16;

struct Screen {
    name: &'static str,
    items: &'static [(&'static str, Option<&'static str>)],
    background: (u8, u8, u8),
}

const SCREENS: &[Screen] = &[
    Screen {
        name: "Home",
        items: &[
            ("Settings", Some("Settings")),
            ("Songs", Some("Songs")),
            ("About", Some("About")),
        ],
        background: (16, 24, 48),
    },
    Screen {
        name: "Settings",
        items: &[("Brightness", None), ("Color mode", None), ("Back", None)],
        background: (40, 16, 16),
    },
    Screen {
        name: "Songs",
        items: &[("Play", None), ("Record", None)],
        background: (16, 40, 16),
    },
    Screen {
        name: "About",
        items: &[],
        background: (32, 32, 32),
    },
];

const METHODS: &[&str] = &[
    "change_pointer",
    "change_value",
    "enter_menu",
    "go_back",
    "home",
    "render",
    "current_screen",
    "restore_state",
    "cleanup",
];

const ATTRIBUTES: &[&str] = &["image", "current_location", "pointer", "brightness"];

const MAX_BRIGHTNESS: i64 = 10;

fn screen(name: &str) -> Option<&'static Screen> {
    SCREENS.iter().find(|screen| screen.name == name)
}

struct DemoState {
    stack: Vec<&'static str>,
    pointer: usize,
    brightness: i64,
    frame: RawImage,
}

impl DemoState {
    fn new(width: u32, height: u32) -> Self {
        let mut state = Self {
            stack: vec!["Home"],
            pointer: 0,
            brightness: 5,
            frame: RawImage::blank(width, height, PixelFormat::Rgb565),
        };
        state.redraw();
        state
    }

    fn current(&self) -> &'static Screen {
        self.stack
            .last()
            .and_then(|name| screen(name))
            .unwrap_or(&SCREENS[0])
    }

    fn change_pointer(&mut self, delta: i64) {
        let count = self.current().items.len() as i64;
        if count == 0 {
            return;
        }
        self.pointer = (self.pointer as i64 + delta).rem_euclid(count) as usize;
    }

    fn change_value(&mut self, direction: &str) -> FaultResult<()> {
        let step = match direction {
            "LEFT" => -1,
            "RIGHT" => 1,
            other => return Err(RendererFault::new(format!("unknown direction {other}"))),
        };
        let on_brightness = self.current().items.get(self.pointer).map(|item| item.0)
            == Some("Brightness");
        if on_brightness {
            self.brightness = (self.brightness + step).clamp(0, MAX_BRIGHTNESS);
        }
        Ok(())
    }

    fn enter(&mut self) {
        let target = self
            .current()
            .items
            .get(self.pointer)
            .and_then(|item| item.1);
        match target {
            Some(name) => {
                self.stack.push(name);
                self.pointer = 0;
            }
            None if self.current().items.get(self.pointer).map(|item| item.0) == Some("Back") => {
                self.back();
            }
            None => {}
        }
    }

    fn back(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
        self.pointer = 0;
    }

    fn home(&mut self) {
        self.stack.truncate(1);
        self.pointer = 0;
    }

    fn restore(&mut self, name: &str) -> FaultResult<()> {
        let target = screen(name)
            .ok_or_else(|| RendererFault::new(format!("unknown screen {name}")))?;
        self.stack = vec!["Home"];
        if target.name != "Home" {
            self.stack.push(target.name);
        }
        self.pointer = 0;
        Ok(())
    }

    fn redraw(&mut self) {
        let width = self.frame.width;
        let height = self.frame.height;
        let screen = self.current();
        let row = (height / 8).max(1);

        fill(&mut self.frame, 0, 0, width, height, screen.background);
        fill(&mut self.frame, 0, 0, width, row, (200, 200, 200));

        for (index, _) in screen.items.iter().enumerate() {
            let top = row * (index as u32 + 1) + 2;
            let color = if index == self.pointer {
                (240, 180, 0)
            } else {
                (90, 90, 120)
            };
            fill(
                &mut self.frame,
                4,
                top,
                width.saturating_sub(8),
                row.saturating_sub(2),
                color,
            );
        }

        if screen.name == "Settings" {
            let bar = width.saturating_sub(8) * self.brightness as u32 / MAX_BRIGHTNESS as u32;
            fill(
                &mut self.frame,
                4,
                height - row,
                bar,
                row / 2,
                (0, 220, 120),
            );
        }
    }
}

fn fill(image: &mut RawImage, x: u32, y: u32, w: u32, h: u32, (r, g, b): (u8, u8, u8)) {
    let value: u16 = ((u16::from(r) >> 3) << 11) | ((u16::from(g) >> 2) << 5) | (u16::from(b) >> 3);
    let [hi, lo] = value.to_be_bytes();
    let stride = image.format.row_bytes(image.width);
    for row in y..(y + h).min(image.height) {
        for col in x..(x + w).min(image.width) {
            let offset = row as usize * stride + col as usize * 2;
            image.data[offset] = hi;
            image.data[offset + 1] = lo;
        }
    }
}

/// One demo renderer instance.
pub struct DemoMenu {
    state: Arc<Mutex<DemoState>>,
}

impl DemoMenu {
    /// Build an instance and register its buttons on `gpio`.
    pub fn new(profile: DisplayProfile, gpio: &GpioStub) -> Self {
        let (width, height) = profile.dimensions();
        let state = Arc::new(Mutex::new(DemoState::new(width, height)));

        let buttons: [(u8, fn(&mut DemoState)); 7] = [
            (PIN_UP, |s| s.change_pointer(-1)),
            (PIN_DOWN, |s| s.change_pointer(1)),
            (PIN_LEFT, |s| {
                let _ = s.change_value("LEFT");
            }),
            (PIN_RIGHT, |s| {
                let _ = s.change_value("RIGHT");
            }),
            (PIN_PRESS, DemoState::enter),
            (PIN_KEY1, DemoState::back),
            (PIN_KEY3, DemoState::home),
        ];
        for (pin, press) in buttons {
            gpio.setup(pin, Direction::Input, Some(true));
            let state = Arc::clone(&state);
            gpio.add_event_detect(
                pin,
                Edge::Falling,
                Box::new(move |_| {
                    let mut state = state.lock();
                    press(&mut state);
                    state.redraw();
                }),
            );
        }

        Self { state }
    }
}

impl RendererObject for DemoMenu {
    fn has_method(&self, name: &str) -> bool {
        METHODS.contains(&name)
    }

    fn call(&mut self, name: &str, args: &[Value]) -> FaultResult<Value> {
        let mut state = self.state.lock();
        let result = match name {
            "change_pointer" => {
                let delta = args
                    .first()
                    .and_then(Value::as_int)
                    .ok_or_else(|| RendererFault::new("change_pointer expects an int"))?;
                state.change_pointer(delta);
                Value::None
            }
            "change_value" => {
                let direction = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| RendererFault::new("change_value expects a direction"))?;
                state.change_value(direction)?;
                Value::None
            }
            "enter_menu" => {
                state.enter();
                Value::None
            }
            "go_back" => {
                state.back();
                Value::None
            }
            "home" => {
                state.home();
                Value::None
            }
            "render" | "cleanup" => Value::None,
            "current_screen" => return Ok(Value::Str(state.current().name.to_string())),
            "restore_state" => {
                let name = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| RendererFault::new("restore_state expects a screen name"))?;
                state.restore(name)?;
                Value::None
            }
            other => return Err(RendererFault::new(format!("no method {other}"))),
        };
        state.redraw();
        Ok(result)
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        let state = self.state.lock();
        match name {
            "image" => Some(Value::Image(state.frame.clone())),
            "current_location" => Some(Value::Str(state.current().name.to_string())),
            "pointer" => Some(Value::Int(state.pointer as i64)),
            "brightness" => Some(Value::Int(state.brightness)),
            _ => None,
        }
    }

    fn attribute_names(&self) -> Vec<String> {
        ATTRIBUTES.iter().map(|name| name.to_string()).collect()
    }
}

/// Module that only accepts the injected-dependencies signature, like the device code
/// which needs its pin controller at construction.
pub struct DemoModule;

impl RendererModule for DemoModule {
    fn name(&self) -> &str {
        "demo"
    }

    fn construct(&self, args: &ConstructorArgs) -> FaultResult<Box<dyn RendererObject>> {
        match args {
            ConstructorArgs::Dependencies(deps) => {
                let profile = deps.display_profile.unwrap_or_default();
                Ok(Box::new(DemoMenu::new(profile, &deps.gpio)))
            }
            _ => Err(RendererFault::new(
                "demo renderer needs its pin controller injected",
            )),
        }
    }
}

pub struct DemoLoader;

impl ModuleLoader for DemoLoader {
    fn describe(&self) -> String {
        "builtin:demo".to_string()
    }

    fn load(&self) -> FaultResult<Arc<dyn RendererModule>> {
        Ok(Arc::new(DemoModule))
    }
}

//! Resolved capability map of one renderer handle.
//!
//! Every capability slot resolves to one of a closed set of strategies at bind time.
//! The map is built once by the prober and never mutated afterwards.

use crate::bridge::action::LogicalAction;
use crate::renderer::{FaultResult, RendererFault, RendererObject, SignatureKind, Value};
use std::collections::BTreeMap;
use std::fmt;

/// How the current frame is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameAccessor {
    /// Zero-argument method returning an image
    Method(String),
    /// Well-known attribute holding an image
    Attribute(String),
    /// Attribute found by the bounded structural scan
    Scanned(String),
    /// Attribute of a named child object, such as `LCD.frame`
    Child { object: String, attribute: String },
    Unsupported,
}

impl FrameAccessor {
    pub fn is_supported(&self) -> bool {
        !matches!(self, FrameAccessor::Unsupported)
    }
}

impl fmt::Display for FrameAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameAccessor::Method(name) => write!(f, "{name}()"),
            FrameAccessor::Attribute(name) => write!(f, ".{name}"),
            FrameAccessor::Scanned(name) => write!(f, ".{name} (scanned)"),
            FrameAccessor::Child { object, attribute } => write!(f, ".{object}.{attribute}"),
            FrameAccessor::Unsupported => f.write_str("unsupported"),
        }
    }
}

/// Zero-argument method that advances one render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshHook {
    Method(String),
    /// Method on a named child object, e.g. `LCD.LCD_Display`
    Child { object: String, method: String },
}

impl RefreshHook {
    pub fn call(&self, instance: &mut dyn RendererObject) -> FaultResult<Value> {
        match self {
            RefreshHook::Method(name) => instance.call(name, &[]),
            RefreshHook::Child { object, method } => instance
                .child_mut(object)
                .ok_or_else(|| RendererFault::new(format!("{object} is no longer present")))?
                .call(method, &[]),
        }
    }
}

impl fmt::Display for RefreshHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshHook::Method(name) => write!(f, "{name}()"),
            RefreshHook::Child { object, method } => write!(f, "{object}.{method}()"),
        }
    }
}

/// How one logical action reaches the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionBinding {
    /// Dedicated method, called with fixed arguments
    Method { name: String, args: Vec<Value> },
    /// Generic "handle input by symbolic name" method
    Generic { method: String, symbol: String },
    /// Replays another action's binding `repeat` times
    Derived { via: LogicalAction, repeat: u8 },
    Unsupported,
}

impl ActionBinding {
    pub fn is_supported(&self) -> bool {
        !matches!(self, ActionBinding::Unsupported)
    }
}

impl fmt::Display for ActionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionBinding::Method { name, args } => {
                let args: Vec<String> = args.iter().map(Value::to_string).collect();
                write!(f, "{}({})", name, args.join(", "))
            }
            ActionBinding::Generic { method, symbol } => {
                write!(f, "{method}({symbol:?}) [generic]")
            }
            ActionBinding::Derived { via, repeat } if *repeat == 1 => write!(f, "via {via}"),
            ActionBinding::Derived { via, repeat } => write!(f, "via {via} x{repeat}"),
            ActionBinding::Unsupported => f.write_str("unsupported"),
        }
    }
}

/// Where the current screen identity can be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateProbe {
    Method(String),
    Attribute(String),
}

impl fmt::Display for StateProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateProbe::Method(name) => write!(f, "{name}()"),
            StateProbe::Attribute(name) => write!(f, ".{name}"),
        }
    }
}

/// Immutable result of probing one renderer instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityMap {
    pub constructor: SignatureKind,
    pub frame: FrameAccessor,
    pub actions: BTreeMap<LogicalAction, ActionBinding>,
    pub refresh: Option<RefreshHook>,
    pub cleanup: Option<String>,
    pub snapshot: Option<StateProbe>,
    pub restore: Option<String>,
}

impl CapabilityMap {
    pub fn action(&self, action: LogicalAction) -> &ActionBinding {
        self.actions
            .get(&action)
            .unwrap_or(&ActionBinding::Unsupported)
    }

    /// Flattened `(capability, token)` pairs in a stable order.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn optional(name: &Option<String>) -> String {
            name.as_deref()
                .map(|n| format!("{n}()"))
                .unwrap_or_else(|| "unsupported".to_string())
        }

        let mut entries = vec![
            (
                "constructor_signature".to_string(),
                self.constructor.as_str().to_string(),
            ),
            ("frame_accessor".to_string(), self.frame.to_string()),
        ];
        for action in LogicalAction::ALL {
            entries.push((format!("action:{action}"), self.action(action).to_string()));
        }
        entries.push((
            "refresh_hook".to_string(),
            self.refresh
                .as_ref()
                .map(RefreshHook::to_string)
                .unwrap_or_else(|| "unsupported".to_string()),
        ));
        entries.push(("cleanup_hook".to_string(), optional(&self.cleanup)));
        entries.push((
            "state_snapshot".to_string(),
            self.snapshot
                .as_ref()
                .map(StateProbe::to_string)
                .unwrap_or_else(|| "unsupported".to_string()),
        ));
        entries.push(("state_restore".to_string(), optional(&self.restore)));
        entries
    }

    /// Actions that resolved to nothing.
    pub fn unsupported_actions(&self) -> Vec<LogicalAction> {
        LogicalAction::ALL
            .into_iter()
            .filter(|action| !self.action(*action).is_supported())
            .collect()
    }
}

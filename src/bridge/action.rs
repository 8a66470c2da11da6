//! Logical input actions and their dispatch onto a bound renderer.
//!
//! Dispatch only invokes renderer methods; the effect becomes visible on the next frame
//! extraction.

use crate::bridge::binding::RendererHandle;
use crate::bridge::capability::ActionBinding;
use crate::error::{PreviewError, Result};
use std::fmt;
use std::str::FromStr;

/// Input events independent of the physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicalAction {
    Up,
    Down,
    Left,
    Right,
    Select,
    Back,
    Home,
    /// Encoder turned one detent clockwise
    EncoderCw,
    /// Encoder turned one detent counter-clockwise
    EncoderCcw,
}

impl LogicalAction {
    pub const ALL: [LogicalAction; 9] = [
        LogicalAction::Up,
        LogicalAction::Down,
        LogicalAction::Left,
        LogicalAction::Right,
        LogicalAction::Select,
        LogicalAction::Back,
        LogicalAction::Home,
        LogicalAction::EncoderCw,
        LogicalAction::EncoderCcw,
    ];

    /// Symbolic name, also what a generic input handler receives.
    pub fn symbol(self) -> &'static str {
        match self {
            LogicalAction::Up => "up",
            LogicalAction::Down => "down",
            LogicalAction::Left => "left",
            LogicalAction::Right => "right",
            LogicalAction::Select => "select",
            LogicalAction::Back => "back",
            LogicalAction::Home => "home",
            LogicalAction::EncoderCw => "encoder+",
            LogicalAction::EncoderCcw => "encoder-",
        }
    }

    /// Encoder action for a signed detent.
    pub fn encoder(delta: i32) -> Option<Self> {
        match delta.signum() {
            1 => Some(LogicalAction::EncoderCw),
            -1 => Some(LogicalAction::EncoderCcw),
            _ => None,
        }
    }

    pub fn is_encoder(self) -> bool {
        matches!(self, LogicalAction::EncoderCw | LogicalAction::EncoderCcw)
    }
}

impl fmt::Display for LogicalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for LogicalAction {
    type Err = PreviewError;

    fn from_str(s: &str) -> Result<Self> {
        let action = match s.trim().to_ascii_lowercase().as_str() {
            "up" | "k" | "w" => LogicalAction::Up,
            "down" | "j" | "s" => LogicalAction::Down,
            "left" | "h" | "a" => LogicalAction::Left,
            "right" | "l" | "d" => LogicalAction::Right,
            "select" | "enter" | "ok" => LogicalAction::Select,
            "back" | "esc" => LogicalAction::Back,
            "home" => LogicalAction::Home,
            "encoder+" | "enc+" | "cw" => LogicalAction::EncoderCw,
            "encoder-" | "enc-" | "ccw" => LogicalAction::EncoderCcw,
            other => return Err(PreviewError::action(format!("unknown action '{other}'"))),
        };
        Ok(action)
    }
}

/// Invoke the renderer method bound to `action`.
pub fn dispatch(handle: &mut RendererHandle, action: LogicalAction) -> Result<()> {
    if !handle.is_valid() {
        return Err(PreviewError::action(format!(
            "{action}: renderer handle {} is no longer valid",
            handle.id()
        )));
    }

    let capabilities = handle.capabilities();
    match capabilities.action(action).clone() {
        ActionBinding::Derived { via, repeat } => {
            let base = capabilities.action(via).clone();
            log::debug!("{action} -> {via} x{repeat}");
            for _ in 0..repeat {
                invoke(handle, via, &base)?;
            }
            Ok(())
        }
        binding => invoke(handle, action, &binding),
    }
}

fn invoke(
    handle: &mut RendererHandle,
    action: LogicalAction,
    binding: &ActionBinding,
) -> Result<()> {
    let outcome = match binding {
        ActionBinding::Method { name, args } => {
            log::debug!("{action} -> {binding}");
            handle
                .instance_mut()
                .call(name, args)
                .map_err(|fault| (name.as_str(), fault))
        }
        ActionBinding::Generic { method, symbol } => {
            log::debug!("{action} -> {binding}");
            handle
                .instance_mut()
                .call(method, &[symbol.as_str().into()])
                .map_err(|fault| (method.as_str(), fault))
        }
        ActionBinding::Derived { via, .. } => {
            // Derived bindings only point at direct bindings; see the prober.
            return Err(PreviewError::action(format!(
                "{action}: nested derivation through {via}"
            )));
        }
        ActionBinding::Unsupported => {
            return Err(PreviewError::action(format!(
                "{action} is not supported by this renderer"
            )));
        }
    };

    outcome.map(|_| ()).map_err(|(method, fault)| {
        fault.into_error(|message| {
            PreviewError::action(format!("{action}: {method} raised: {message}"))
        })
    })
}

//! Status reporting and reload notifications.

use crate::bridge::binding::{BindingState, HandleId};
use crate::bridge::capability::CapabilityMap;
use crate::config::DisplayProfile;
use crate::error::{ErrorKind, PreviewError};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// Most errors kept for `pop_errors`; older ones are dropped.
pub const MAX_RECORDED_ERRORS: usize = 64;

/// One recorded failure.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: SystemTime,
}

impl StatusError {
    pub fn from_error(error: &PreviewError) -> Self {
        Self {
            kind: error.kind(),
            message: error.message(),
            at: SystemTime::now(),
        }
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// What asked for a reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadTrigger {
    Manual,
    /// File changes, de-duplicated
    Watcher { paths: Vec<PathBuf> },
    ProfileChange,
}

impl fmt::Display for ReloadTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadTrigger::Manual => f.write_str("manual"),
            ReloadTrigger::Watcher { paths } => write!(f, "{} changed path(s)", paths.len()),
            ReloadTrigger::ProfileChange => f.write_str("display profile change"),
        }
    }
}

/// Result of asking the facade to reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Completed { handle: HandleId, restored: bool },
    /// Another reload was in flight; this one runs right after it
    Queued,
}

/// Broadcast to subscribers after every reload attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    Reloaded {
        handle: HandleId,
        trigger: ReloadTrigger,
        restored: bool,
    },
    ReloadFailed {
        trigger: ReloadTrigger,
        error: StatusError,
    },
}

/// Point-in-time view of the bridge.
#[derive(Debug, Clone)]
pub struct BridgeStatus {
    pub state: BindingState,
    pub handle: Option<HandleId>,
    pub renderer: String,
    pub display_profile: Option<DisplayProfile>,
    pub capabilities: Option<Arc<CapabilityMap>>,
    pub watching: bool,
    pub reloads: u64,
    pub last_reload: Option<SystemTime>,
    pub last_error: Option<StatusError>,
    pub pending_errors: usize,
}

impl BridgeStatus {
    pub fn frame_supported(&self) -> bool {
        self.capabilities
            .as_ref()
            .is_some_and(|map| map.frame.is_supported())
    }
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "renderer {} is {}", self.renderer, self.state)?;
        if let Some(handle) = self.handle {
            write!(f, " as {handle}")?;
        }
        writeln!(f)?;
        match self.display_profile {
            Some(profile) => writeln!(f, "  display: {profile}")?,
            None => writeln!(f, "  display: renderer default")?,
        }
        writeln!(
            f,
            "  watcher: {}, reloads: {}",
            if self.watching { "on" } else { "off" },
            self.reloads
        )?;
        if let Some(map) = &self.capabilities {
            for (name, token) in map.entries() {
                writeln!(f, "  {name:<24} {token}")?;
            }
        }
        if let Some(error) = &self.last_error {
            writeln!(f, "  last error: {error}")?;
        }
        if self.pending_errors > 0 {
            writeln!(f, "  {} unread error(s)", self.pending_errors)?;
        }
        Ok(())
    }
}

/// Mutable bookkeeping behind `BridgeStatus`.
#[derive(Debug, Default)]
pub(crate) struct StatusBook {
    pub errors: VecDeque<StatusError>,
    pub last_error: Option<StatusError>,
    pub reloads: u64,
    pub last_reload: Option<SystemTime>,
    pub watching: bool,
}

impl StatusBook {
    pub fn record(&mut self, error: &PreviewError) -> StatusError {
        let entry = StatusError::from_error(error);
        if self.errors.len() == MAX_RECORDED_ERRORS {
            self.errors.pop_front();
        }
        self.errors.push_back(entry.clone());
        self.last_error = Some(entry.clone());
        entry
    }

    pub fn drain(&mut self) -> Vec<StatusError> {
        self.errors.drain(..).collect()
    }

    pub fn reloaded(&mut self) {
        self.reloads += 1;
        self.last_reload = Some(SystemTime::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_queue_is_bounded() {
        let mut book = StatusBook::default();
        for i in 0..(MAX_RECORDED_ERRORS + 5) {
            book.record(&PreviewError::action(format!("press {i}")));
        }
        let errors = book.drain();
        assert_eq!(errors.len(), MAX_RECORDED_ERRORS);
        assert_eq!(errors[0].message, "press 5");
        assert_eq!(book.last_error.as_ref().unwrap().kind, ErrorKind::Action);
        assert!(book.drain().is_empty());
    }

    #[test]
    fn status_lists_capabilities() {
        let status = BridgeStatus {
            state: BindingState::Failed,
            handle: None,
            renderer: "builtin:demo".to_string(),
            display_profile: Some(DisplayProfile::Lcd1in3),
            capabilities: None,
            watching: true,
            reloads: 2,
            last_reload: None,
            last_error: Some(StatusError::from_error(&PreviewError::binding("no signature"))),
            pending_errors: 1,
        };
        let text = status.to_string();
        assert!(text.starts_with("renderer builtin:demo is failed"));
        assert!(text.contains("1in3 (240x240)"));
        assert!(text.contains("BindingError: no signature"));
        assert!(!status.frame_supported());
    }
}

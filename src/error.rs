//! Error types and handling infrastructure for lcdpreview.
//!
//! Every failure the bridge can hit is one `PreviewError` variant. The four bridge
//! kinds (binding, extraction, action, reload) are caught at the facade and turned
//! into status entries; the remaining variants cover configuration, I/O and the
//! renderer host protocol.
//!
//! ## Design Principles
//!
//! - **Non-fatal by default**: callers get errors as values and keep running
//! - **Classified**: [`ErrorKind`] lets the status report name the failing layer
//! - **Consistency**: standardized Result type across all modules

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for lcdpreview operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreviewError {
    /// No constructor signature produced a renderer, or the module failed to load
    #[error("Binding failed: {message}")]
    BindingError { message: String },

    /// No frame accessor resolved, the renderer is unbound, or the accessor
    /// stopped returning an image
    #[error("Frame extraction failed: {message}")]
    ExtractionError { message: String },

    /// Logical action has no resolved binding, or the bound method raised
    #[error("Action failed: {message}")]
    ActionError { message: String },

    /// A watcher-triggered rebind failed
    #[error("Hot reload failed: {message}")]
    ReloadError { message: String },

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Renderer root or a required path is missing
    #[error("Path not found: {path}")]
    PathNotFound { path: PathBuf },

    /// File system failure with context (kept as text so errors stay `Clone`)
    #[error("I/O failed: {message}")]
    IoError { message: String },

    /// Renderer host spoke something other than the expected JSON lines, or
    /// went away mid-request
    #[error("Renderer host protocol error: {message}")]
    ProtocolError { message: String },
}

/// Coarse classification used by status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Binding,
    Extraction,
    Action,
    Reload,
    Config,
    Io,
    Protocol,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Binding => "BindingError",
            ErrorKind::Extraction => "ExtractionError",
            ErrorKind::Action => "ActionError",
            ErrorKind::Reload => "ReloadError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Io => "IoError",
            ErrorKind::Protocol => "ProtocolError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard Result type for lcdpreview operations.
pub type Result<T> = std::result::Result<T, PreviewError>;

impl PreviewError {
    /// Create a BindingError with a descriptive message
    pub fn binding(message: impl Into<String>) -> Self {
        Self::BindingError {
            message: message.into(),
        }
    }

    /// Create an ExtractionError with a descriptive message
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::ExtractionError {
            message: message.into(),
        }
    }

    /// Create an ActionError with a descriptive message
    pub fn action(message: impl Into<String>) -> Self {
        Self::ActionError {
            message: message.into(),
        }
    }

    /// Create a ReloadError with a descriptive message
    pub fn reload(message: impl Into<String>) -> Self {
        Self::ReloadError {
            message: message.into(),
        }
    }

    /// Create a ConfigError with a descriptive message
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a ProtocolError with a descriptive message
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    /// Create an IoError from an io::Error with additional context
    pub fn io(context: impl Into<String>, source: &std::io::Error) -> Self {
        Self::IoError {
            message: format!("{}: {}", context.into(), source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BindingError { .. } => ErrorKind::Binding,
            Self::ExtractionError { .. } => ErrorKind::Extraction,
            Self::ActionError { .. } => ErrorKind::Action,
            Self::ReloadError { .. } => ErrorKind::Reload,
            Self::ConfigError { .. } => ErrorKind::Config,
            Self::PathNotFound { .. } | Self::IoError { .. } => ErrorKind::Io,
            Self::ProtocolError { .. } => ErrorKind::Protocol,
        }
    }

    /// Message without the kind prefix, for compact status lines
    pub fn message(&self) -> String {
        match self {
            Self::BindingError { message }
            | Self::ExtractionError { message }
            | Self::ActionError { message }
            | Self::ReloadError { message }
            | Self::ConfigError { message }
            | Self::IoError { message }
            | Self::ProtocolError { message } => message.clone(),
            Self::PathNotFound { path } => path.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let missing = PreviewError::PathNotFound {
            path: PathBuf::from("/repo/config"),
        };
        assert_eq!(missing.to_string(), "Path not found: /repo/config");

        let binding = PreviewError::binding("no constructor signature accepted");
        assert_eq!(
            binding.to_string(),
            "Binding failed: no constructor signature accepted"
        );
        assert_eq!(binding.message(), "no constructor signature accepted");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(PreviewError::extraction("x").kind(), ErrorKind::Extraction);
        assert_eq!(PreviewError::action("x").kind(), ErrorKind::Action);
        assert_eq!(PreviewError::reload("x").kind(), ErrorKind::Reload);
        assert_eq!(PreviewError::config("x").kind(), ErrorKind::Config);
        assert_eq!(ErrorKind::Reload.to_string(), "ReloadError");
    }

    #[test]
    fn test_io_error_context() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "menu.xml");
        match PreviewError::io("cannot read config.toml", &io_err) {
            PreviewError::IoError { message } => {
                assert_eq!(message, "cannot read config.toml: menu.xml")
            }
            other => panic!("Expected IoError variant, got {other:?}"),
        }
        assert_eq!(PreviewError::protocol("x").kind(), ErrorKind::Protocol);
    }
}

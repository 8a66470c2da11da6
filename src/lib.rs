//! # lcdpreview - LCD Menu Renderer Previewer
//!
//! Drives an embedded device's own LCD menu renderer on a desktop machine and shows
//! its exact pixel output, rebinding the renderer whenever its inputs change.
//!
//! ## Features
//!
//! - **Runtime capability probing**: constructor, frame accessor and input methods are
//!   discovered per renderer version instead of being hard-coded
//! - **Hot reload**: menu/config/font/asset changes rebind the renderer after a debounce
//! - **Normalized frames**: every native pixel layout comes out as RGB8
//!
//! ## Architecture
//!
//! - [`error`] - Centralized error types and handling
//! - [`config`] - Settings file, command-line overrides and font discovery
//! - [`renderer`] - Dynamic renderer object protocol and the shipped loaders
//! - [`bridge`] - Capability prober, binding, frame extraction, action dispatch, facade
//! - [`watch`] - File watcher, debouncer and reload worker
//! - [`app`] - Interactive command driver

// Core modules
pub mod config;
pub mod error;

// Renderer access and the adapter layer on top of it
pub mod bridge;
pub mod renderer;
pub mod watch;

// Application driver
pub mod app;

// Re-export commonly used types for convenience
pub use error::{PreviewError, Result};

// Public API surface for external usage
pub use app::Application;
pub use bridge::{Bridge, BridgeEvent, BridgeStatus, FrameBuffer, LogicalAction};
pub use config::{DisplayProfile, PreviewConfig};
pub use watch::HotReloadWatcher;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

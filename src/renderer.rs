//! Runtime-discoverable surface of an external LCD renderer.
//!
//! The renderer is owned and versioned outside this crate, so nothing here fixes its
//! method names. A renderer is reached through three layers:
//!
//! - [`ModuleLoader`] loads the renderer module fresh (every bind, so edits are picked up)
//! - [`RendererModule`] constructs instances for a given [`ConstructorArgs`] signature
//! - [`RendererObject`] answers "do you have method X", calls it, and reads attributes
//!
//! The capability prober in [`crate::bridge::probe`] is the only code that asks these
//! questions; everything downstream works from the resolved capability map.

pub mod builtin;
pub mod gpio;
pub mod process;
pub mod value;

pub use gpio::GpioStub;
pub use value::{PixelFormat, RawImage, Value};

use crate::config::DisplayProfile;
use crate::error::{PreviewError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Failure raised by renderer code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RendererFault {
    pub message: String,
    /// The renderer host broke the wire protocol rather than raising
    pub protocol: bool,
}

impl RendererFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            protocol: false,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            protocol: true,
        }
    }

    /// Classify at the bridge boundary: protocol breaks stay `ProtocolError`,
    /// everything else is wrapped by `layer`.
    pub fn into_error(self, layer: impl FnOnce(String) -> PreviewError) -> PreviewError {
        if self.protocol {
            PreviewError::protocol(self.message)
        } else {
            layer(self.message)
        }
    }
}

pub type FaultResult<T> = std::result::Result<T, RendererFault>;

/// Constructor signature families tried, in this order, when building an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureKind {
    NoArgs,
    ConfigPath,
    Dependencies,
}

impl SignatureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureKind::NoArgs => "no_args",
            SignatureKind::ConfigPath => "config_path",
            SignatureKind::Dependencies => "dependencies",
        }
    }
}

/// Injected collaborators for the richest constructor signature.
#[derive(Debug, Clone)]
pub struct Dependencies {
    pub config_path: PathBuf,
    pub font_dir: Option<PathBuf>,
    pub display_profile: Option<DisplayProfile>,
    pub gpio: GpioStub,
}

/// Arguments for one constructor attempt.
#[derive(Debug, Clone)]
pub enum ConstructorArgs {
    NoArgs,
    ConfigPath(PathBuf),
    Dependencies(Dependencies),
}

impl ConstructorArgs {
    pub fn kind(&self) -> SignatureKind {
        match self {
            ConstructorArgs::NoArgs => SignatureKind::NoArgs,
            ConstructorArgs::ConfigPath(_) => SignatureKind::ConfigPath,
            ConstructorArgs::Dependencies(_) => SignatureKind::Dependencies,
        }
    }
}

/// One live renderer instance as seen through its dynamic surface.
pub trait RendererObject: Send {
    /// Whether `name` exists and is callable.
    fn has_method(&self, name: &str) -> bool;

    /// Invoke a method. Missing methods and renderer errors both come back as faults.
    fn call(&mut self, name: &str, args: &[Value]) -> FaultResult<Value>;

    /// Read a data attribute; `None` when absent.
    fn attribute(&self, name: &str) -> Option<Value>;

    /// Names of the instance's data attributes, in any order.
    fn attribute_names(&self) -> Vec<String>;

    /// Named child object, such as an `LCD` driver the renderer draws into.
    fn child(&self, _name: &str) -> Option<&dyn RendererObject> {
        None
    }

    fn child_mut(&mut self, _name: &str) -> Option<&mut dyn RendererObject> {
        None
    }
}

/// A loaded renderer module able to construct renderer instances.
pub trait RendererModule: Send + Sync {
    fn name(&self) -> &str;

    /// Build an instance, or fault when this signature is not accepted.
    fn construct(&self, args: &ConstructorArgs) -> FaultResult<Box<dyn RendererObject>>;
}

/// Source of freshly loaded renderer modules.
pub trait ModuleLoader: Send + Sync {
    /// Human readable origin, used in status output
    fn describe(&self) -> String;

    fn load(&self) -> FaultResult<Arc<dyn RendererModule>>;
}

/// Module built from a closure; handy for in-process renderers.
pub struct FnModule<F> {
    name: String,
    construct: F,
}

impl<F> FnModule<F>
where
    F: Fn(&ConstructorArgs) -> FaultResult<Box<dyn RendererObject>> + Send + Sync,
{
    pub fn new(name: impl Into<String>, construct: F) -> Self {
        Self {
            name: name.into(),
            construct,
        }
    }
}

impl<F> RendererModule for FnModule<F>
where
    F: Fn(&ConstructorArgs) -> FaultResult<Box<dyn RendererObject>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn construct(&self, args: &ConstructorArgs) -> FaultResult<Box<dyn RendererObject>> {
        (self.construct)(args)
    }
}

/// Loader built from a closure that produces a new module per load.
pub struct FnLoader<F> {
    label: String,
    load: F,
}

impl<F> FnLoader<F>
where
    F: Fn() -> FaultResult<Arc<dyn RendererModule>> + Send + Sync,
{
    pub fn new(label: impl Into<String>, load: F) -> Self {
        Self {
            label: label.into(),
            load,
        }
    }
}

impl<F> ModuleLoader for FnLoader<F>
where
    F: Fn() -> FaultResult<Arc<dyn RendererModule>> + Send + Sync,
{
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn load(&self) -> FaultResult<Arc<dyn RendererModule>> {
        (self.load)()
    }
}

/// Build a loader from a renderer selector.
///
/// - `builtin:demo` selects the in-process demo menu renderer
/// - `cmd:<command line>` or any other string runs a renderer host process in `root`
pub fn resolve_loader(selector: &str, root: &Path) -> Result<Arc<dyn ModuleLoader>> {
    let selector = selector.trim();
    if let Some(name) = selector.strip_prefix("builtin:") {
        return match name {
            "demo" => Ok(Arc::new(builtin::DemoLoader)),
            other => Err(PreviewError::config(format!(
                "unknown builtin renderer '{other}'"
            ))),
        };
    }

    let command_line = selector.strip_prefix("cmd:").unwrap_or(selector);
    let argv: Vec<String> = command_line.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        return Err(PreviewError::config("renderer command is empty"));
    }
    Ok(Arc::new(process::ProcessLoader::new(argv, root.to_path_buf())))
}

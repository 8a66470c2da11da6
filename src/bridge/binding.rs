//! Ownership of the single live renderer instance.
//!
//! `RendererBinding` walks the `Unbound -> Binding -> Bound -> Unbinding -> Unbound`
//! state machine. It is not internally synchronized; the facade keeps it behind one
//! mutex so binds, unbinds, dispatches and extractions never interleave.

use crate::bridge::action::{self, LogicalAction};
use crate::bridge::capability::{CapabilityMap, StateProbe};
use crate::bridge::frame::{self, FrameBuffer};
use crate::bridge::probe::{ProbeContext, Prober};
use crate::config::DisplayProfile;
use crate::error::{PreviewError, Result};
use crate::renderer::{GpioStub, ModuleLoader, RendererModule, RendererObject, SignatureKind, Value};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of the binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingState {
    Unbound,
    Binding,
    Bound,
    Unbinding,
    /// Last bind attempt failed; no live instance
    Failed,
}

impl BindingState {
    pub fn as_str(self) -> &'static str {
        match self {
            BindingState::Unbound => "unbound",
            BindingState::Binding => "binding",
            BindingState::Bound => "bound",
            BindingState::Unbinding => "unbinding",
            BindingState::Failed => "failed",
        }
    }
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic handle identifier, unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Exclusive owner of one renderer instance.
pub struct RendererHandle {
    id: HandleId,
    // Declared before `module` so the instance drops first.
    instance: Box<dyn RendererObject>,
    module: Arc<dyn RendererModule>,
    capabilities: Arc<CapabilityMap>,
    created_at: Instant,
    valid: bool,
}

impl RendererHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn capabilities(&self) -> Arc<CapabilityMap> {
        Arc::clone(&self.capabilities)
    }

    pub fn signature(&self) -> SignatureKind {
        self.capabilities.constructor
    }

    pub fn module_name(&self) -> &str {
        self.module.name()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn instance(&self) -> &dyn RendererObject {
        self.instance.as_ref()
    }

    pub fn instance_mut(&mut self) -> &mut dyn RendererObject {
        self.instance.as_mut()
    }

    fn invalidate(&mut self) {
        self.valid = false;
    }
}

impl fmt::Debug for RendererHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererHandle")
            .field("id", &self.id)
            .field("module", &self.module.name())
            .field("signature", &self.signature().as_str())
            .field("valid", &self.valid)
            .finish()
    }
}

/// State machine around the single renderer handle.
pub struct RendererBinding {
    loader: Arc<dyn ModuleLoader>,
    prober: Prober,
    state: BindingState,
    handle: Option<RendererHandle>,
    next_id: u64,
}

impl RendererBinding {
    pub fn new(loader: Arc<dyn ModuleLoader>, context: ProbeContext) -> Self {
        Self {
            loader,
            prober: Prober::new(context),
            state: BindingState::Unbound,
            handle: None,
            next_id: 0,
        }
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn handle(&self) -> Option<&RendererHandle> {
        self.handle.as_ref()
    }

    pub fn handle_id(&self) -> Option<HandleId> {
        self.handle.as_ref().map(RendererHandle::id)
    }

    pub fn capabilities(&self) -> Option<Arc<CapabilityMap>> {
        self.handle.as_ref().map(RendererHandle::capabilities)
    }

    pub fn loader(&self) -> &dyn ModuleLoader {
        self.loader.as_ref()
    }

    pub fn gpio(&self) -> &GpioStub {
        &self.prober.context().gpio
    }

    pub fn display_profile(&self) -> Option<DisplayProfile> {
        self.prober.context().display_profile
    }

    /// Takes effect on the next bind.
    pub fn set_display_profile(&mut self, profile: Option<DisplayProfile>) {
        self.prober.set_display_profile(profile);
    }

    /// Load the module fresh, probe it and install a new handle.
    ///
    /// A live handle is torn down first so at most one instance exists.
    pub fn bind(&mut self) -> Result<HandleId> {
        if self.handle.is_some() {
            self.unbind();
        }

        self.state = BindingState::Binding;
        match self.construct_handle() {
            Ok(handle) => {
                let id = handle.id();
                let capabilities = handle.capabilities();
                log::info!(
                    "bound {} as {} via {} signature (frame {})",
                    handle.module_name(),
                    id,
                    handle.signature().as_str(),
                    capabilities.frame
                );
                let unsupported = capabilities.unsupported_actions();
                if !unsupported.is_empty() {
                    log::warn!("unsupported actions for {id}: {unsupported:?}");
                }
                self.handle = Some(handle);
                self.state = BindingState::Bound;
                Ok(id)
            }
            Err(err) => {
                log::error!("bind failed: {err}");
                self.state = BindingState::Failed;
                Err(err)
            }
        }
    }

    fn construct_handle(&mut self) -> Result<RendererHandle> {
        let module = self.loader.load().map_err(|fault| {
            PreviewError::binding(format!(
                "loading {} failed: {}",
                self.loader.describe(),
                fault
            ))
        })?;
        let outcome = self.prober.probe(module.as_ref())?;

        self.next_id += 1;
        Ok(RendererHandle {
            id: HandleId(self.next_id),
            instance: outcome.instance,
            module,
            capabilities: Arc::new(outcome.capabilities),
            created_at: Instant::now(),
            valid: true,
        })
    }

    /// Tear down the live handle. Always ends `Unbound`; cleanup faults are only logged.
    pub fn unbind(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            self.state = BindingState::Unbinding;
            handle.invalidate();
            if let Some(hook) = handle.capabilities.cleanup.clone() {
                if let Err(fault) = handle.instance_mut().call(&hook, &[]) {
                    log::warn!("{hook}() on {} raised during unbind: {fault}", handle.id());
                }
            }
            log::debug!("unbound {} after {:?}", handle.id(), handle.age());
            drop(handle);
        }
        self.gpio().cleanup();
        self.state = BindingState::Unbound;
    }

    /// Unbind, then bind a fresh instance.
    pub fn rebind(&mut self) -> Result<HandleId> {
        self.unbind();
        self.bind()
    }

    pub fn extract(&mut self) -> Result<FrameBuffer> {
        match self.handle.as_mut() {
            Some(handle) => frame::extract(handle),
            None => Err(PreviewError::extraction(format!(
                "renderer is {}",
                self.state
            ))),
        }
    }

    pub fn dispatch(&mut self, action: LogicalAction) -> Result<()> {
        match self.handle.as_mut() {
            Some(handle) => action::dispatch(handle, action),
            None => Err(PreviewError::action(format!(
                "{action}: renderer is {}",
                self.state
            ))),
        }
    }

    /// Run the refresh hook once. Returns false when the renderer has none.
    pub fn step(&mut self) -> Result<bool> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(PreviewError::action(format!("step: renderer is {}", self.state)));
        };
        let Some(hook) = handle.capabilities.refresh.clone() else {
            return Ok(false);
        };
        hook.call(handle.instance_mut()).map(|_| true).map_err(|fault| {
            fault.into_error(|message| PreviewError::action(format!("{hook} raised: {message}")))
        })
    }

    /// Identity of the current screen, when the renderer exposes one.
    pub fn snapshot_state(&mut self) -> Option<Value> {
        let handle = self.handle.as_mut()?;
        let value = match handle.capabilities.snapshot.clone()? {
            StateProbe::Method(name) => match handle.instance_mut().call(&name, &[]) {
                Ok(value) => value,
                Err(fault) => {
                    log::debug!("{name}() failed during snapshot: {fault}");
                    return None;
                }
            },
            StateProbe::Attribute(name) => handle.instance().attribute(&name)?,
        };
        (!value.is_none()).then_some(value)
    }

    /// Replay a snapshot into the current instance. Returns whether it was accepted.
    pub fn restore_state(&mut self, snapshot: &Value) -> bool {
        let Some(handle) = self.handle.as_mut() else {
            return false;
        };
        let Some(hook) = handle.capabilities.restore.clone() else {
            return false;
        };
        match handle.instance_mut().call(&hook, std::slice::from_ref(snapshot)) {
            Ok(_) => true,
            Err(fault) => {
                log::debug!("{hook}({snapshot}) rejected: {fault}");
                false
            }
        }
    }
}

impl Drop for RendererBinding {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.unbind();
        }
    }
}

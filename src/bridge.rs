//! Bridge facade: the one entry point UIs, the watcher and the CLI talk to.
//!
//! All renderer access goes through a single `parking_lot::Mutex` around the
//! [`RendererBinding`]. Errors are recorded in the status book and handed back as
//! values; none of them is fatal.
//!
//! Lock order is binding, then status, then last frame. Every method drops the binding
//! lock before touching the others.

pub mod action;
pub mod binding;
pub mod capability;
pub mod frame;
pub mod probe;
pub mod status;

pub use action::LogicalAction;
pub use binding::{BindingState, HandleId, RendererBinding, RendererHandle};
pub use capability::{ActionBinding, CapabilityMap, FrameAccessor, RefreshHook, StateProbe};
pub use frame::{FrameBuffer, ResolutionProfile};
pub use probe::{ProbeContext, Prober};
pub use status::{BridgeEvent, BridgeStatus, ReloadOutcome, ReloadTrigger, StatusError};

use crate::config::{DisplayProfile, PreviewConfig};
use crate::error::{PreviewError, Result};
use crate::renderer::{self, GpioStub, ModuleLoader};
use parking_lot::Mutex;
use status::StatusBook;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 16;

/// Reload serialization: one in flight, at most one queued, latest request wins.
#[derive(Debug, Default)]
struct ReloadGate {
    in_flight: bool,
    queued: Option<ReloadTrigger>,
}

/// Reopens the gate if a renderer call panics mid-reload.
struct GateGuard<'a> {
    gate: &'a Mutex<ReloadGate>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut gate = self.gate.lock();
            gate.in_flight = false;
            gate.queued = None;
        }
    }
}

pub struct Bridge {
    binding: Mutex<RendererBinding>,
    gate: Mutex<ReloadGate>,
    status: Mutex<StatusBook>,
    last_frame: Mutex<Option<FrameBuffer>>,
    events: broadcast::Sender<BridgeEvent>,
    renderer: String,
}

impl Bridge {
    pub fn new(loader: Arc<dyn ModuleLoader>, context: ProbeContext) -> Self {
        let renderer = loader.describe();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            binding: Mutex::new(RendererBinding::new(loader, context)),
            gate: Mutex::new(ReloadGate::default()),
            status: Mutex::new(StatusBook::default()),
            last_frame: Mutex::new(None),
            events,
            renderer,
        }
    }

    /// Build the loader and probe context from resolved settings.
    pub fn from_config(config: &PreviewConfig) -> Result<Self> {
        let loader = renderer::resolve_loader(&config.renderer, &config.root)?;
        let context = ProbeContext {
            root: config.root.clone(),
            font_env: config.font_env.clone(),
            display_profile: config.display_profile,
            gpio: GpioStub::new(),
        };
        Ok(Self::new(loader, context))
    }

    pub fn renderer(&self) -> &str {
        &self.renderer
    }

    pub fn gpio(&self) -> GpioStub {
        self.binding.lock().gpio().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub fn bind(&self) -> Result<HandleId> {
        let result = self.binding.lock().bind();
        self.note(result)
    }

    pub fn unbind(&self) {
        self.binding.lock().unbind();
    }

    /// Manual force-reload.
    pub fn rebind(&self) -> Result<ReloadOutcome> {
        self.reload(ReloadTrigger::Manual)
    }

    /// Reload requested by the file watcher; failures are reported as `ReloadError`.
    pub fn reload_from_watcher(&self, paths: Vec<PathBuf>) -> Result<ReloadOutcome> {
        self.reload(ReloadTrigger::Watcher { paths })
    }

    /// Switch LCD profile and reload so the renderer is rebuilt at the new size.
    pub fn set_display_profile(&self, profile: Option<DisplayProfile>) -> Result<ReloadOutcome> {
        self.binding.lock().set_display_profile(profile);
        self.reload(ReloadTrigger::ProfileChange)
    }

    pub fn display_profile(&self) -> Option<DisplayProfile> {
        self.binding.lock().display_profile()
    }

    pub fn current_frame(&self) -> Result<FrameBuffer> {
        let result = self.binding.lock().extract();
        if let Ok(frame) = &result {
            *self.last_frame.lock() = Some(frame.clone());
        }
        self.note(result)
    }

    /// Last frame that extracted cleanly, for placeholder display.
    pub fn last_frame(&self) -> Option<FrameBuffer> {
        self.last_frame.lock().clone()
    }

    pub fn dispatch(&self, action: LogicalAction) -> Result<()> {
        let result = self.binding.lock().dispatch(action);
        self.note(result)
    }

    /// Turn the encoder `delta` detents; stops at the first failing step.
    pub fn encoder(&self, delta: i32) -> Result<()> {
        let Some(action) = LogicalAction::encoder(delta) else {
            return Ok(());
        };
        for _ in 0..delta.unsigned_abs() {
            self.dispatch(action)?;
        }
        Ok(())
    }

    /// Run the renderer's refresh hook once.
    pub fn step(&self) -> Result<bool> {
        let result = self.binding.lock().step();
        self.note(result)
    }

    pub fn status(&self) -> BridgeStatus {
        let (state, handle, capabilities, display_profile) = {
            let binding = self.binding.lock();
            (
                binding.state(),
                binding.handle_id(),
                binding.capabilities(),
                binding.display_profile(),
            )
        };
        let book = self.status.lock();
        BridgeStatus {
            state,
            handle,
            renderer: self.renderer.clone(),
            display_profile,
            capabilities,
            watching: book.watching,
            reloads: book.reloads,
            last_reload: book.last_reload,
            last_error: book.last_error.clone(),
            pending_errors: book.errors.len(),
        }
    }

    /// Take every error recorded since the last call.
    pub fn pop_errors(&self) -> Vec<StatusError> {
        self.status.lock().drain()
    }

    pub fn set_watching(&self, watching: bool) {
        self.status.lock().watching = watching;
    }

    fn note<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.status.lock().record(err);
        }
        result
    }

    fn reload(&self, trigger: ReloadTrigger) -> Result<ReloadOutcome> {
        {
            let mut gate = self.gate.lock();
            if gate.in_flight {
                log::debug!("reload ({trigger}) queued behind the one in flight");
                gate.queued = Some(trigger);
                return Ok(ReloadOutcome::Queued);
            }
            gate.in_flight = true;
        }
        let _guard = GateGuard { gate: &self.gate };

        let mut trigger = trigger;
        loop {
            let result = self.reload_once(trigger);
            let mut gate = self.gate.lock();
            match gate.queued.take() {
                Some(next) => trigger = next,
                None => {
                    gate.in_flight = false;
                    return result;
                }
            }
        }
    }

    fn reload_once(&self, trigger: ReloadTrigger) -> Result<ReloadOutcome> {
        log::info!("reloading {} ({trigger})", self.renderer);
        let result = {
            let mut binding = self.binding.lock();
            let snapshot = binding.snapshot_state();
            binding.rebind().map(|handle| {
                let restored = snapshot
                    .map(|state| binding.restore_state(&state))
                    .unwrap_or(false);
                (handle, restored)
            })
        };

        match result {
            Ok((handle, restored)) => {
                self.status.lock().reloaded();
                log::info!("reloaded as {handle} (state restored: {restored})");
                let _ = self.events.send(BridgeEvent::Reloaded {
                    handle,
                    trigger,
                    restored,
                });
                Ok(ReloadOutcome::Completed { handle, restored })
            }
            Err(err) => {
                let err = match trigger {
                    ReloadTrigger::Watcher { .. } => PreviewError::reload(err.message()),
                    _ => err,
                };
                let entry = self.status.lock().record(&err);
                let _ = self.events.send(BridgeEvent::ReloadFailed {
                    trigger,
                    error: entry,
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::renderer::builtin::DemoLoader;

    fn demo_bridge() -> Bridge {
        Bridge::new(Arc::new(DemoLoader), ProbeContext::new("/repo"))
    }

    #[test]
    fn errors_are_recorded_and_drained() {
        let bridge = demo_bridge();
        assert!(bridge.current_frame().is_err());
        assert!(bridge.dispatch(LogicalAction::Up).is_err());

        let errors = bridge.pop_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].kind, ErrorKind::Extraction);
        assert_eq!(errors[1].kind, ErrorKind::Action);
        assert!(bridge.pop_errors().is_empty());
        assert_eq!(bridge.status().last_error.unwrap().kind, ErrorKind::Action);
    }

    #[test]
    fn last_frame_survives_unbind() {
        let bridge = demo_bridge();
        bridge.bind().unwrap();
        let frame = bridge.current_frame().unwrap();
        bridge.unbind();
        assert!(bridge.current_frame().is_err());
        assert_eq!(bridge.last_frame(), Some(frame));
    }

    #[test]
    fn encoder_steps_follow_delta() {
        let bridge = demo_bridge();
        bridge.bind().unwrap();
        bridge.encoder(2).unwrap();
        bridge.encoder(0).unwrap();
        let status = bridge.status();
        assert_eq!(
            status
                .capabilities
                .unwrap()
                .action(LogicalAction::EncoderCw)
                .to_string(),
            "via down"
        );
        bridge.encoder(-2).unwrap();
        bridge.dispatch(LogicalAction::Select).unwrap();
        let frame = bridge.current_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (128, 128));
    }

    #[test]
    fn profile_change_rebuilds_at_new_size() {
        let bridge = demo_bridge();
        bridge.bind().unwrap();
        let mut events = bridge.subscribe();

        let outcome = bridge
            .set_display_profile(Some(DisplayProfile::Lcd1in3))
            .unwrap();
        assert!(matches!(outcome, ReloadOutcome::Completed { .. }));
        let frame = bridge.current_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (240, 240));

        match events.try_recv().unwrap() {
            BridgeEvent::Reloaded { trigger, .. } => {
                assert_eq!(trigger, ReloadTrigger::ProfileChange)
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}

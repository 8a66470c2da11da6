//! Hot reload: watch the renderer's inputs and rebind when they change.

pub mod debounce;
pub mod target;
pub mod worker;

pub use debounce::{Debouncer, PendingReload};
pub use target::{Marker, WatchSet, WatchTarget, WATCHED_PATHS};
pub use worker::ReloadRequest;

use crate::bridge::Bridge;
use crate::config::PreviewConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CHANGE_CHANNEL_CAPACITY: usize = 32;
const REQUEST_CHANNEL_CAPACITY: usize = 4;

/// Running watcher tasks. Must be created inside a tokio runtime.
pub struct HotReloadWatcher {
    bridge: Arc<Bridge>,
    shutdown: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl HotReloadWatcher {
    pub fn spawn(
        bridge: Arc<Bridge>,
        set: WatchSet,
        poll_interval: Duration,
        debounce: Duration,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (change_tx, change_rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);

        let tasks = vec![
            tokio::spawn(worker::poll_loop(
                set,
                poll_interval,
                change_tx,
                Arc::clone(&shutdown),
            )),
            tokio::spawn(worker::debounce_loop(change_rx, request_tx, debounce)),
            tokio::spawn(worker::reload_worker_loop(request_rx, Arc::clone(&bridge))),
        ];
        bridge.set_watching(true);
        log::info!(
            "watching renderer inputs every {poll_interval:?} (debounce {debounce:?})"
        );

        Self {
            bridge,
            shutdown,
            tasks,
        }
    }

    /// Watch the fixed path set under the configured root.
    pub fn from_config(bridge: Arc<Bridge>, config: &PreviewConfig) -> Self {
        Self::spawn(
            bridge,
            WatchSet::for_root(&config.root),
            config.poll_interval,
            config.debounce,
        )
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst) && self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Stop polling and wait for in-flight work to drain.
    pub async fn stop(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for task in self.tasks {
            if let Err(err) = task.await {
                log::warn!("watcher task ended abnormally: {err}");
            }
        }
        self.bridge.set_watching(false);
    }
}

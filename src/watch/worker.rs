//! Watcher tasks: polling, debouncing, and the reload worker.
//!
//! ```text
//! poll_loop --changed paths--> debounce_loop --ReloadRequest--> reload_worker_loop --> Bridge
//! ```
//!
//! Only the reload worker touches the bridge, and it does so on the blocking pool.

use crate::bridge::{Bridge, ReloadOutcome};
use crate::watch::debounce::{Debouncer, PendingReload};
use crate::watch::target::WatchSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::MissedTickBehavior;

/// Debounced request to reload the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    pub paths: Vec<PathBuf>,
    pub first_seen: Instant,
}

impl From<PendingReload> for ReloadRequest {
    fn from(pending: PendingReload) -> Self {
        Self {
            paths: pending.paths,
            first_seen: pending.first_seen,
        }
    }
}

/// Scan the watch set every `interval` and forward changed paths until shut down.
pub async fn poll_loop(
    mut set: WatchSet,
    interval: Duration,
    tx: Sender<Vec<PathBuf>>,
    shutdown: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !shutdown.load(Ordering::SeqCst) {
        ticker.tick().await;
        let changed = set.scan();
        if changed.is_empty() {
            continue;
        }
        log::debug!("change detected: {changed:?}");
        if tx.send(changed).await.is_err() {
            break;
        }
    }
}

/// Collapse change bursts and emit one request per quiet window.
pub async fn debounce_loop(
    mut rx: Receiver<Vec<PathBuf>>,
    tx: Sender<ReloadRequest>,
    window: Duration,
) {
    let mut debouncer = Debouncer::new(window);

    loop {
        let deadline = debouncer.deadline();
        tokio::select! {
            changed = rx.recv() => match changed {
                Some(paths) => debouncer.push(paths, Instant::now()),
                // Poller stopped; a pending burst is dropped with it.
                None => break,
            },
            _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                if let Some(pending) = debouncer.flush_if_quiet(Instant::now()) {
                    if tx.send(pending.into()).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

fn sleep_until_deadline(deadline: Option<Instant>) -> tokio::time::Sleep {
    tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now).into())
}

/// Apply reload requests to the bridge, one at a time.
pub async fn reload_worker_loop(mut rx: Receiver<ReloadRequest>, bridge: Arc<Bridge>) {
    while let Some(request) = rx.recv().await {
        let bridge = Arc::clone(&bridge);
        let paths = request.paths.clone();
        let result =
            tokio::task::spawn_blocking(move || bridge.reload_from_watcher(request.paths)).await;

        match result {
            Ok(Ok(ReloadOutcome::Completed { handle, restored })) => {
                log::info!(
                    "hot reload for {} path(s) bound {handle} (restored: {restored})",
                    paths.len()
                );
            }
            Ok(Ok(ReloadOutcome::Queued)) => log::debug!("hot reload queued"),
            // Already recorded in the bridge status.
            Ok(Err(err)) => log::warn!("{err}"),
            Err(join) => log::error!("reload task did not finish: {join}"),
        }
    }
}

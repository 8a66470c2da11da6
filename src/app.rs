//! Application orchestration layer
//!
//! Wires the bridge, the hot-reload watcher and the stdin command reader together. The
//! bridge owns all renderer state; this layer only routes commands and prints replies.

pub mod messages;
pub mod runtime;

pub use messages::AppCommand;

use crate::bridge::{Bridge, BridgeEvent, FrameBuffer, ReloadOutcome};
use crate::config::PreviewConfig;
use crate::error::Result;
use crate::watch::HotReloadWatcher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Columns of the text preview printed by the `frame` command.
const PREVIEW_COLUMNS: u32 = 64;
/// Dark to light.
const SHADES: &[u8] = b" .:-=+*#%@";

/// Result of running one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Quit,
}

/// Application orchestrator
pub struct Application {
    config: PreviewConfig,
    bridge: Arc<Bridge>,
}

impl Application {
    pub fn new(config: PreviewConfig) -> Result<Self> {
        let bridge = Arc::new(Bridge::from_config(&config)?);
        Ok(Self { config, bridge })
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Bind, start watching, then serve stdin commands until `quit` or end of input.
    pub async fn run(&mut self) -> Result<()> {
        let bridge = Arc::clone(&self.bridge);
        match tokio::task::spawn_blocking(move || bridge.bind()).await {
            Ok(Ok(handle)) => println!("bound {} as {handle}", self.bridge.renderer()),
            Ok(Err(err)) => println!("{err}"),
            Err(join) => log::error!("bind task did not finish: {join}"),
        }

        let watcher = self
            .config
            .watch
            .then(|| HotReloadWatcher::from_config(Arc::clone(&self.bridge), &self.config));
        let mut events = self.bridge.subscribe();

        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::unbounded_channel();
        // Not joined: the thread may sit in a blocking read until the process exits.
        let _reader = runtime::spawn_command_thread(
            std::io::BufReader::new(std::io::stdin()),
            tx,
            Arc::clone(&shutdown),
        );
        println!("type 'help' for commands");

        loop {
            tokio::select! {
                command = rx.recv() => {
                    let Some(command) = command else { break };
                    let bridge = Arc::clone(&self.bridge);
                    match tokio::task::spawn_blocking(move || execute(&bridge, &command)).await {
                        Ok(Reply::Text(text)) => println!("{text}"),
                        Ok(Reply::Quit) => break,
                        Err(join) => log::error!("command did not finish: {join}"),
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => println!("{}", describe_event(&event)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::debug!("missed {skipped} bridge event(s)");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        shutdown.store(true, Ordering::SeqCst);
        if let Some(watcher) = watcher {
            watcher.stop().await;
        }
        let bridge = Arc::clone(&self.bridge);
        if let Err(join) = tokio::task::spawn_blocking(move || bridge.unbind()).await {
            log::error!("unbind task did not finish: {join}");
        }
        Ok(())
    }
}

/// Run one command against the bridge. Blocking.
pub fn execute(bridge: &Bridge, command: &AppCommand) -> Reply {
    let text = match command {
        AppCommand::Quit => return Reply::Quit,
        AppCommand::Help => messages::HELP.to_string(),
        AppCommand::Action(action) => match bridge.dispatch(*action) {
            Ok(()) => match bridge.current_frame() {
                Ok(frame) => format!("{action}: ok, frame {:016x}", frame.fingerprint()),
                Err(_) => format!("{action}: ok"),
            },
            Err(err) => err.to_string(),
        },
        AppCommand::Reload => reload_reply(bridge.rebind()),
        AppCommand::Lcd(profile) => reload_reply(bridge.set_display_profile(*profile)),
        AppCommand::Status => bridge.status().to_string(),
        AppCommand::Frame => match bridge.current_frame() {
            Ok(frame) => render_preview(&frame),
            Err(err) => match bridge.last_frame() {
                Some(last) => format!("{err}\nlast good frame:\n{}", render_preview(&last)),
                None => err.to_string(),
            },
        },
    };
    Reply::Text(text)
}

fn reload_reply(result: Result<ReloadOutcome>) -> String {
    match result {
        Ok(ReloadOutcome::Completed { handle, restored }) => {
            format!("reloaded as {handle} (state restored: {restored})")
        }
        Ok(ReloadOutcome::Queued) => "reload queued".to_string(),
        Err(err) => err.to_string(),
    }
}

fn describe_event(event: &BridgeEvent) -> String {
    match event {
        BridgeEvent::Reloaded {
            handle,
            trigger,
            restored,
        } => format!("[reload] {trigger}: bound {handle} (state restored: {restored})"),
        BridgeEvent::ReloadFailed { trigger, error } => format!("[reload] {trigger}: {error}"),
    }
}

/// Text rendering of a frame, one character per cell of luminance.
pub fn render_preview(frame: &FrameBuffer) -> String {
    let columns = PREVIEW_COLUMNS.min(frame.width()).max(1);
    let cell_w = frame.width().div_ceil(columns).max(1);
    // Terminal cells are about twice as tall as wide.
    let cell_h = cell_w * 2;
    let mut out = format!(
        "{} frame {:016x}\n",
        frame.profile(),
        frame.fingerprint()
    );

    for y in (0..frame.height()).step_by(cell_h as usize) {
        for x in (0..frame.width()).step_by(cell_w as usize) {
            let [r, g, b] = frame.pixel(x, y).unwrap_or([0; 3]);
            let luma = (u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114) / 1000;
            let shade = (luma as usize * (SHADES.len() - 1)) / 255;
            out.push(SHADES[shade] as char);
        }
        out.push('\n');
    }
    out.pop();
    out
}

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};

use lcdpreview::bridge::{Bridge, BridgeEvent, LogicalAction, ProbeContext, ReloadTrigger};
use lcdpreview::error::ErrorKind;
use lcdpreview::renderer::builtin::DemoLoader;
use lcdpreview::renderer::{FaultResult, FnLoader, ModuleLoader, RendererFault, RendererModule};
use std::sync::atomic::{AtomicU32, Ordering};
use lcdpreview::watch::worker::{debounce_loop, ReloadRequest};
use lcdpreview::watch::{HotReloadWatcher, WatchSet};

const WINDOW_MS: u64 = 200;

fn spawn_debouncer() -> (
    mpsc::Sender<Vec<PathBuf>>,
    mpsc::Receiver<ReloadRequest>,
    tokio::task::JoinHandle<()>,
) {
    let (change_tx, change_rx) = mpsc::channel(16);
    let (request_tx, request_rx) = mpsc::channel(16);
    let task = tokio::spawn(debounce_loop(
        change_rx,
        request_tx,
        Duration::from_millis(WINDOW_MS),
    ));
    (change_tx, request_rx, task)
}

fn drain(rx: &mut mpsc::Receiver<ReloadRequest>) -> Vec<ReloadRequest> {
    let mut requests = Vec::new();
    while let Ok(request) = rx.try_recv() {
        requests.push(request);
    }
    requests
}

#[tokio::test]
async fn burst_within_window_gives_one_reload() {
    let (tx, mut rx, task) = spawn_debouncer();

    for i in 0..5 {
        tx.send(vec![PathBuf::from(format!("config/file{}.xml", i % 2))])
            .await
            .unwrap();
        sleep(Duration::from_millis(30)).await;
    }
    sleep(Duration::from_millis(WINDOW_MS * 2)).await;

    let requests = drain(&mut rx);
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].paths,
        vec![
            PathBuf::from("config/file0.xml"),
            PathBuf::from("config/file1.xml")
        ]
    );

    drop(tx);
    task.await.unwrap();
}

#[tokio::test]
async fn spaced_changes_give_two_reloads() {
    let (tx, mut rx, task) = spawn_debouncer();

    tx.send(vec![PathBuf::from("fonts")]).await.unwrap();
    sleep(Duration::from_millis(WINDOW_MS + 100)).await;
    tx.send(vec![PathBuf::from("assets")]).await.unwrap();
    sleep(Duration::from_millis(WINDOW_MS * 2)).await;

    let requests = drain(&mut rx);
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].paths, vec![PathBuf::from("assets")]);

    drop(tx);
    task.await.unwrap();
}

#[tokio::test]
async fn file_change_rebinds_and_notifies() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("config")).unwrap();
    let menu = root.path().join("config").join("menu.xml");
    std::fs::write(&menu, "<menu/>").unwrap();

    let bridge = Arc::new(Bridge::new(
        Arc::new(DemoLoader),
        ProbeContext::new(root.path()),
    ));
    let first = bridge.bind().unwrap();
    bridge.dispatch(LogicalAction::Select).unwrap();
    let mut events = bridge.subscribe();

    let watcher = HotReloadWatcher::spawn(
        Arc::clone(&bridge),
        WatchSet::for_root(root.path()),
        Duration::from_millis(20),
        Duration::from_millis(50),
    );
    assert!(watcher.is_running());
    assert!(bridge.status().watching);

    std::fs::write(&menu, "<menu><item name=\"Songs\"/></menu>").unwrap();

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("reload timed out")
        .expect("event channel closed");
    match event {
        BridgeEvent::Reloaded {
            handle, trigger, ..
        } => {
            assert!(handle > first);
            assert_eq!(
                trigger,
                ReloadTrigger::Watcher {
                    paths: vec![menu.clone()]
                }
            );
        }
        other => panic!("unexpected event {other:?}"),
    }

    let frame = bridge.current_frame().unwrap();
    assert_eq!((frame.width(), frame.height()), (128, 128));
    assert_eq!(bridge.status().reloads, 1);

    watcher.stop().await;
    assert!(!bridge.status().watching);
}

async fn next_event(events: &mut tokio::sync::broadcast::Receiver<BridgeEvent>) -> BridgeEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("reload timed out")
        .expect("event channel closed")
}

#[tokio::test]
async fn watcher_keeps_going_after_a_failed_reload() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("config")).unwrap();
    let menu = root.path().join("config").join("menu.xml");
    std::fs::write(&menu, "<menu/>").unwrap();

    // Load 1 binds, load 2 (first watcher reload) fails, later loads succeed.
    let loads = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&loads);
    let loader = FnLoader::new("flaky", move || -> FaultResult<Arc<dyn RendererModule>> {
        if counter.fetch_add(1, Ordering::SeqCst) == 1 {
            return Err(RendererFault::new("SyntaxError: menu.xml line 1"));
        }
        DemoLoader.load()
    });
    let bridge = Arc::new(Bridge::new(Arc::new(loader), ProbeContext::new(root.path())));
    bridge.bind().unwrap();
    let mut events = bridge.subscribe();

    let watcher = HotReloadWatcher::spawn(
        Arc::clone(&bridge),
        WatchSet::for_root(root.path()),
        Duration::from_millis(20),
        Duration::from_millis(50),
    );

    std::fs::write(&menu, "<menu><broken").unwrap();
    match next_event(&mut events).await {
        BridgeEvent::ReloadFailed { error, .. } => {
            assert_eq!(error.kind, ErrorKind::Reload);
            assert!(error.message.contains("SyntaxError"));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(watcher.is_running());

    std::fs::write(&menu, "<menu><item name=\"Songs\"/></menu>").unwrap();
    match next_event(&mut events).await {
        BridgeEvent::Reloaded { trigger, .. } => {
            assert_eq!(trigger, ReloadTrigger::Watcher { paths: vec![menu.clone()] });
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(bridge.current_frame().is_ok());
    assert_eq!(loads.load(Ordering::SeqCst), 3);

    watcher.stop().await;
}

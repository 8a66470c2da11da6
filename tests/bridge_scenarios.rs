use lcdpreview::bridge::{
    ActionBinding, BindingState, Bridge, BridgeEvent, FrameAccessor, HandleId, LogicalAction,
    ProbeContext, Prober, RefreshHook, ReloadOutcome, ReloadTrigger,
};
use lcdpreview::error::ErrorKind;
use lcdpreview::renderer::builtin::DemoLoader;
use lcdpreview::renderer::{
    ConstructorArgs, FaultResult, FnLoader, FnModule, ModuleLoader, PixelFormat, RawImage,
    RendererFault, RendererModule, RendererObject, Value,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

type CallLog = Arc<Mutex<Vec<String>>>;
type Constructed = FaultResult<Box<dyn RendererObject>>;

/// Renderer stand-in with a declared surface that records every call.
#[derive(Clone, Default)]
struct StandIn {
    methods: BTreeSet<String>,
    attributes: BTreeMap<String, Value>,
    /// Methods whose replies arrive garbled, as from a broken host
    garbled: BTreeSet<String>,
    lcd: Option<Box<StandIn>>,
    calls: CallLog,
}

impl StandIn {
    fn methods(mut self, names: &[&str]) -> Self {
        self.methods.extend(names.iter().map(|n| n.to_string()));
        self
    }

    fn attr(mut self, name: &str, value: Value) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    fn garbles(mut self, name: &str) -> Self {
        self.methods.insert(name.to_string());
        self.garbled.insert(name.to_string());
        self
    }

    fn lcd(mut self, lcd: StandIn) -> Self {
        self.lcd = Some(Box::new(lcd));
        self
    }
}

impl RendererObject for StandIn {
    fn has_method(&self, name: &str) -> bool {
        self.methods.contains(name)
    }

    fn call(&mut self, name: &str, args: &[Value]) -> FaultResult<Value> {
        if !self.methods.contains(name) {
            return Err(RendererFault::new(format!("AttributeError: {name}")));
        }
        if self.garbled.contains(name) {
            return Err(RendererFault::protocol("renderer host sent malformed reply"));
        }
        let args: Vec<String> = args.iter().map(Value::to_string).collect();
        self.calls.lock().push(format!("{}({})", name, args.join(", ")));
        Ok(Value::None)
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.get(name).cloned()
    }

    fn attribute_names(&self) -> Vec<String> {
        self.attributes.keys().cloned().collect()
    }

    fn child(&self, name: &str) -> Option<&dyn RendererObject> {
        match (name, &self.lcd) {
            ("LCD", Some(lcd)) => Some(&**lcd as &dyn RendererObject),
            _ => None,
        }
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut dyn RendererObject> {
        match (name, &mut self.lcd) {
            ("LCD", Some(lcd)) => Some(&mut **lcd as &mut dyn RendererObject),
            _ => None,
        }
    }
}

fn loader_for(stand_in: StandIn) -> Arc<dyn ModuleLoader> {
    Arc::new(FnLoader::new("stand-in", move || -> FaultResult<Arc<dyn RendererModule>> {
        let stand_in = stand_in.clone();
        Ok(Arc::new(FnModule::new(
            "stand-in",
            move |_: &ConstructorArgs| -> Constructed { Ok(Box::new(stand_in.clone())) },
        )))
    }))
}

fn bridge_for(stand_in: StandIn) -> Bridge {
    Bridge::new(loader_for(stand_in), ProbeContext::new("/repo"))
}

#[test]
fn frames_have_the_stand_in_size() {
    for (width, height, format) in [
        (128, 128, PixelFormat::Rgb565),
        (240, 240, PixelFormat::Rgb888),
        (96, 48, PixelFormat::Mono1),
    ] {
        let bridge = bridge_for(
            StandIn::default().attr("image", Value::Image(RawImage::blank(width, height, format))),
        );
        bridge.bind().unwrap();
        let frame = bridge.current_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (width, height));
    }
}

#[test]
fn missing_accessor_fails_extraction_but_stays_bound() {
    let bridge = bridge_for(StandIn::default().methods(&["button_up"]));
    bridge.bind().unwrap();

    let err = bridge.current_frame().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Extraction);

    let status = bridge.status();
    assert_eq!(status.state, BindingState::Bound);
    assert!(!status.frame_supported());
    assert_eq!(bridge.pop_errors()[0].kind, ErrorKind::Extraction);
}

#[test]
fn repeated_rebinds_issue_distinct_handles() {
    let bridge = bridge_for(
        StandIn::default().attr("frame", Value::Image(RawImage::blank(4, 4, PixelFormat::Luma8))),
    );
    let mut ids = vec![bridge.bind().unwrap()];
    for _ in 0..5 {
        match bridge.rebind().unwrap() {
            ReloadOutcome::Completed { handle, .. } => ids.push(handle),
            ReloadOutcome::Queued => panic!("nothing else was reloading"),
        }
        assert_eq!(bridge.status().state, BindingState::Bound);
    }
    let unique: BTreeSet<_> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());
}

#[test]
fn probing_is_deterministic() {
    let stand_in = StandIn::default()
        .methods(&["nav_up", "on_down", "handle_key", "draw", "close"])
        .attr("zeta", Value::Image(RawImage::blank(2, 2, PixelFormat::Luma8)))
        .attr("alpha", Value::Image(RawImage::blank(2, 2, PixelFormat::Luma8)))
        .attr("title", Value::from("Home"));
    let prober = Prober::new(ProbeContext::new("/repo"));
    let module = FnModule::new("stand-in", move |_: &ConstructorArgs| -> Constructed {
        Ok(Box::new(stand_in.clone()))
    });

    let first = prober.probe(&module).map(|outcome| outcome.capabilities).unwrap();
    let second = prober.probe(&module).map(|outcome| outcome.capabilities).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.frame, FrameAccessor::Scanned("alpha".to_string()));
    assert_eq!(first.refresh, Some(RefreshHook::Method("draw".to_string())));
    assert_eq!(first.cleanup.as_deref(), Some("close"));
}

#[test]
fn generic_handler_only_covers_every_action() {
    let stand_in = StandIn::default().methods(&["handle_key"]);
    let calls = Arc::clone(&stand_in.calls);
    let bridge = bridge_for(stand_in);
    bridge.bind().unwrap();

    for action in LogicalAction::ALL {
        bridge.dispatch(action).unwrap();
    }

    let calls = calls.lock().clone();
    assert_eq!(
        calls,
        vec![
            "handle_key(\"up\")",
            "handle_key(\"down\")",
            "handle_key(\"left\")",
            "handle_key(\"right\")",
            "handle_key(\"select\")",
            "handle_key(\"back\")",
            "handle_key(\"home\")",
            // Encoder turns derive from down and up.
            "handle_key(\"down\")",
            "handle_key(\"up\")",
        ]
    );
    let capabilities = bridge.status().capabilities.unwrap();
    assert!(matches!(
        capabilities.action(LogicalAction::EncoderCw),
        ActionBinding::Derived { via: LogicalAction::Down, .. }
    ));
}

#[test]
fn home_replays_back_when_nothing_else_exists() {
    let stand_in = StandIn::default().methods(&["cancel"]);
    let calls = Arc::clone(&stand_in.calls);
    let bridge = bridge_for(stand_in);
    bridge.bind().unwrap();

    bridge.dispatch(LogicalAction::Home).unwrap();
    assert_eq!(calls.lock().len(), 5);

    let err = bridge.dispatch(LogicalAction::Left).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Action);
}

#[test]
fn failing_constructor_leaves_bridge_failed_until_next_success() {
    let attempts = Arc::new(Mutex::new(0u32));
    let counter = Arc::clone(&attempts);
    let loader = FnLoader::new("flaky", move || -> FaultResult<Arc<dyn RendererModule>> {
        let mut attempts = counter.lock();
        *attempts += 1;
        if *attempts == 1 {
            return Err(RendererFault::new("SyntaxError: menu.py line 3"));
        }
        DemoLoader.load()
    });
    let bridge = Bridge::new(Arc::new(loader), ProbeContext::new("/repo"));

    assert_eq!(bridge.bind().unwrap_err().kind(), ErrorKind::Binding);
    assert_eq!(bridge.status().state, BindingState::Failed);
    assert_eq!(bridge.current_frame().unwrap_err().kind(), ErrorKind::Extraction);

    assert!(matches!(bridge.rebind().unwrap(), ReloadOutcome::Completed { .. }));
    assert!(bridge.current_frame().is_ok());
}

#[test]
fn watcher_failures_are_reload_errors() {
    let loader = FnLoader::new("gone", || -> FaultResult<Arc<dyn RendererModule>> {
        Err(RendererFault::new("ModuleNotFoundError"))
    });
    let bridge = Bridge::new(Arc::new(loader), ProbeContext::new("/repo"));
    let err = bridge
        .reload_from_watcher(vec!["config/menu.xml".into()])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Reload);
    assert!(err.message().contains("ModuleNotFoundError"));
}

#[test]
fn select_then_reload_lands_on_home_or_settings() {
    let bridge = Bridge::new(Arc::new(DemoLoader), ProbeContext::new("/repo"));
    bridge.bind().unwrap();
    let home = bridge.current_frame().unwrap();

    bridge.dispatch(LogicalAction::Select).unwrap();
    let settings = bridge.current_frame().unwrap();
    assert_ne!(home.fingerprint(), settings.fingerprint());

    bridge
        .reload_from_watcher(vec!["config/menu.xml".into()])
        .unwrap();
    let after = bridge.current_frame().unwrap();
    assert!(
        after.fingerprint() == home.fingerprint() || after.fingerprint() == settings.fingerprint()
    );
}

#[test]
fn lcd_child_supplies_frame_and_refresh() {
    let lcd = StandIn::default()
        .methods(&["LCD_Display"])
        .attr("newimage", Value::Image(RawImage::blank(128, 64, PixelFormat::Mono1)));
    let lcd_calls = Arc::clone(&lcd.calls);
    let bridge = bridge_for(StandIn::default().methods(&["button_up"]).lcd(lcd));
    bridge.bind().unwrap();

    let capabilities = bridge.status().capabilities.unwrap();
    assert_eq!(
        capabilities.frame,
        FrameAccessor::Child {
            object: "LCD".to_string(),
            attribute: "newimage".to_string(),
        }
    );
    assert_eq!(
        capabilities.refresh,
        Some(RefreshHook::Child {
            object: "LCD".to_string(),
            method: "LCD_Display".to_string(),
        })
    );

    let frame = bridge.current_frame().unwrap();
    assert_eq!((frame.width(), frame.height()), (128, 64));
    assert!(bridge.step().unwrap());
    // One pass during probing, one from the step.
    assert_eq!(lcd_calls.lock().len(), 2);
}

#[test]
fn own_attributes_win_over_lcd_child() {
    let lcd =
        StandIn::default().attr("frame", Value::Image(RawImage::blank(4, 4, PixelFormat::Luma8)));
    let bridge = bridge_for(
        StandIn::default()
            .attr("canvas", Value::Image(RawImage::blank(2, 2, PixelFormat::Luma8)))
            .lcd(lcd),
    );
    bridge.bind().unwrap();
    assert_eq!(
        bridge.status().capabilities.unwrap().frame,
        FrameAccessor::Scanned("canvas".to_string())
    );
}

#[test]
fn garbled_host_replies_are_protocol_errors() {
    let bridge = bridge_for(StandIn::default().methods(&["button_up"]).garbles("button_down"));
    bridge.bind().unwrap();

    bridge.dispatch(LogicalAction::Up).unwrap();
    let err = bridge.dispatch(LogicalAction::Down).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(bridge.pop_errors()[0].kind, ErrorKind::Protocol);
    assert_eq!(bridge.status().state, BindingState::Bound);
}

#[test]
fn fonts_added_after_startup_reach_the_next_rebind() {
    let root = tempfile::tempdir().unwrap();
    let seen: Arc<Mutex<Vec<Option<PathBuf>>>> = Arc::default();
    let record = Arc::clone(&seen);
    let loader = FnLoader::new("font-aware", move || -> FaultResult<Arc<dyn RendererModule>> {
        let record = Arc::clone(&record);
        Ok(Arc::new(FnModule::new(
            "font-aware",
            move |args: &ConstructorArgs| -> Constructed {
                match args {
                    ConstructorArgs::Dependencies(deps) => {
                        record.lock().push(deps.font_dir.clone());
                        Ok(Box::new(StandIn::default().methods(&["button_up"])))
                    }
                    _ => Err(RendererFault::new("TypeError: missing arguments")),
                }
            },
        )))
    });
    let bridge = Bridge::new(Arc::new(loader), ProbeContext::new(root.path()));
    bridge.bind().unwrap();

    let fonts = root.path().join("fonts");
    std::fs::create_dir_all(&fonts).unwrap();
    std::fs::write(fonts.join("FreeSansBold.ttf"), b"ttf").unwrap();
    std::fs::write(fonts.join("FreeMonoBold.ttf"), b"ttf").unwrap();
    bridge.reload_from_watcher(vec![fonts.clone()]).unwrap();

    assert_eq!(*seen.lock(), vec![None, Some(fonts)]);
}

#[test]
fn failed_bind_without_fonts_says_where_they_go() {
    let root = tempfile::tempdir().unwrap();
    let loader = FnLoader::new("fonts-required", || -> FaultResult<Arc<dyn RendererModule>> {
        Ok(Arc::new(FnModule::new("fonts-required", |_: &ConstructorArgs| -> Constructed {
            Err(RendererFault::new("OSError: cannot open resource"))
        })))
    });
    let bridge = Bridge::new(Arc::new(loader), ProbeContext::new(root.path()));

    let err = bridge.bind().unwrap_err();
    assert!(err.message().contains("FreeSansBold.ttf / FreeMonoBold.ttf"));
    assert!(err
        .message()
        .contains(&root.path().join("fonts").display().to_string()));
    assert_eq!(bridge.status().last_error.unwrap().message, err.message());
}

#[test]
fn reloads_during_a_reload_queue_and_latest_wins() {
    let slow = Arc::new(AtomicBool::new(false));
    let (entered_tx, entered_rx) = mpsc::channel();
    let entered_tx = Mutex::new(entered_tx);
    let gate = Arc::clone(&slow);
    let loader = FnLoader::new("slow", move || -> FaultResult<Arc<dyn RendererModule>> {
        if gate.swap(false, Ordering::SeqCst) {
            let _ = entered_tx.lock().send(());
            thread::sleep(Duration::from_millis(300));
        }
        DemoLoader.load()
    });
    let bridge = Arc::new(Bridge::new(Arc::new(loader), ProbeContext::new("/repo")));
    assert_eq!(bridge.bind().unwrap(), HandleId(1));
    let mut events = bridge.subscribe();

    slow.store(true, Ordering::SeqCst);
    let manual = {
        let bridge = Arc::clone(&bridge);
        thread::spawn(move || bridge.rebind())
    };
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let first = bridge.reload_from_watcher(vec!["a".into()]).unwrap();
    let second = bridge.reload_from_watcher(vec!["b".into()]).unwrap();
    assert_eq!(first, ReloadOutcome::Queued);
    assert_eq!(second, ReloadOutcome::Queued);

    match manual.join().unwrap().unwrap() {
        ReloadOutcome::Completed { handle, .. } => assert_eq!(handle, HandleId(3)),
        ReloadOutcome::Queued => panic!("the manual reload was first"),
    }
    assert_eq!(bridge.status().reloads, 2);

    let triggers: Vec<(HandleId, ReloadTrigger)> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|event| match event {
            BridgeEvent::Reloaded { handle, trigger, .. } => (handle, trigger),
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(
        triggers,
        vec![
            (HandleId(2), ReloadTrigger::Manual),
            (
                HandleId(3),
                ReloadTrigger::Watcher {
                    paths: vec![PathBuf::from("b")]
                }
            ),
        ]
    );
}

//! Drives the automation loop end to end with in-memory collaborators.

use image::RgbaImage;
use shiftchef::automation::{AutomationLoop, LoopOutcome};
use shiftchef::capture::{CaptureError, ScreenPublisher};
use shiftchef::planner::{PlanError, Planner};
use shiftchef::typing::{
    DispatchTiming, InputDispatcher, KeystrokeSink, TypingError, Word, WordQueue,
};
use shiftchef::window::{GameWindow, WindowError, WindowGeometry, WindowLocator};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const TITLE: &str = "The Chef's Shift";

struct Window;

impl GameWindow for Window {
    fn title(&self) -> &str {
        TITLE
    }

    fn activate(&self) -> Result<(), WindowError> {
        Ok(())
    }

    fn geometry(&self) -> Result<WindowGeometry, WindowError> {
        Ok(WindowGeometry { x: 0, y: 0, width: 1280, height: 720 })
    }

    fn capture(&self) -> Result<RgbaImage, WindowError> {
        Ok(RgbaImage::new(1, 1))
    }
}

struct Locator {
    present: AtomicBool,
}

impl Locator {
    fn new(present: bool) -> Arc<Self> {
        Arc::new(Self { present: AtomicBool::new(present) })
    }
}

impl WindowLocator for Locator {
    fn find(&self, title: &str) -> Result<Box<dyn GameWindow>, WindowError> {
        if self.present.load(Ordering::SeqCst) {
            Ok(Box::new(Window))
        } else {
            Err(WindowError::NotFound {
                title: title.to_string(),
                available: vec!["Terminal".into()],
            })
        }
    }
}

/// Hands out `shot-1`, `shot-2`, ... and fails on the listed calls
struct Publisher {
    calls: Arc<AtomicUsize>,
    fail_on: Vec<usize>,
}

impl ScreenPublisher for Publisher {
    fn capture_and_publish(&self, window: &dyn GameWindow) -> Result<String, CaptureError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&n) {
            return Err(CaptureError::Window(WindowError::Capture {
                title: window.title().to_string(),
                reason: "black frame".into(),
            }));
        }
        Ok(format!("shot-{n}"))
    }
}

/// Answers each URL from a script; unknown URLs yield a parse error
struct ScriptedPlanner {
    script: Vec<(&'static str, Vec<&'static str>)>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl Planner for ScriptedPlanner {
    fn plan(&self, image_url: &str) -> Result<Vec<Word>, PlanError> {
        self.seen.lock().unwrap().push(image_url.to_string());
        self.script
            .iter()
            .find(|(url, _)| *url == image_url)
            .map(|(_, words)| words.iter().filter_map(|w| Word::new(w)).collect())
            .ok_or(PlanError::NoJson)
    }
}

struct Sink {
    typed: Arc<Mutex<String>>,
}

impl KeystrokeSink for Sink {
    fn send_char(&mut self, ch: char) -> Result<(), TypingError> {
        self.typed.lock().unwrap().push(ch);
        Ok(())
    }
}

struct Harness {
    automation: AutomationLoop,
    typed: Arc<Mutex<String>>,
    captures: Arc<AtomicUsize>,
    planned: Arc<Mutex<Vec<String>>>,
}

fn harness(
    locator: Arc<Locator>,
    fail_captures: Vec<usize>,
    script: Vec<(&'static str, Vec<&'static str>)>,
    char_interval: Duration,
) -> Harness {
    let typed = Arc::new(Mutex::new(String::new()));
    let captures = Arc::new(AtomicUsize::new(0));
    let planned = Arc::new(Mutex::new(Vec::new()));

    let dispatcher = InputDispatcher::new(
        TITLE,
        Arc::new(WordQueue::new()),
        locator.clone(),
        Box::new(Sink { typed: Arc::clone(&typed) }),
        DispatchTiming {
            char_interval,
            poll_timeout: Duration::from_millis(10),
            settle_delay: Duration::ZERO,
        },
    );

    let automation = AutomationLoop::new(
        TITLE,
        dispatcher,
        locator,
        Box::new(Publisher {
            calls: Arc::clone(&captures),
            fail_on: fail_captures,
        }),
        Box::new(ScriptedPlanner {
            script,
            seen: Arc::clone(&planned),
        }),
    )
    .with_cycle_delay(Duration::from_millis(20));

    Harness { automation, typed, captures, planned }
}

#[test]
fn test_cycles_type_planned_words_in_order() {
    let h = harness(
        Locator::new(true),
        vec![],
        vec![("shot-1", vec!["use", "cow"]), ("shot-2", vec!["week"])],
        Duration::from_millis(1),
    );
    let (_tx, rx) = flume::unbounded();

    let mut automation = h.automation.with_max_cycles(Some(2));
    let report = automation.run(&rx).unwrap();

    assert_eq!(report.outcome, LoopOutcome::Completed);
    assert_eq!(report.cycles, 2);
    assert_eq!(report.stats.completed, 3);
    assert_eq!(h.typed.lock().unwrap().as_str(), "usecowweek");
    assert!(automation.queue().is_empty());
    assert_eq!(automation.queue().pending_len(), 0);
}

#[test]
fn test_shutdown_before_first_cycle() {
    let mut h = harness(
        Locator::new(true),
        vec![],
        vec![("shot-1", vec!["use"])],
        Duration::from_millis(1),
    );
    let (tx, rx) = flume::unbounded();
    tx.send(()).unwrap();

    let report = h.automation.run(&rx).unwrap();

    assert_eq!(report.outcome, LoopOutcome::Interrupted);
    assert_eq!(report.cycles, 0);
    assert_eq!(h.captures.load(Ordering::SeqCst), 0);
    assert!(h.typed.lock().unwrap().is_empty());
}

#[test]
fn test_failed_capture_skips_cycle() {
    let h = harness(
        Locator::new(true),
        vec![1],
        vec![("shot-2", vec!["toe"])],
        Duration::from_millis(1),
    );
    let (_tx, rx) = flume::unbounded();

    let report = h.automation.with_max_cycles(Some(2)).run(&rx).unwrap();

    assert_eq!(report.outcome, LoopOutcome::Completed);
    assert_eq!(h.captures.load(Ordering::SeqCst), 2);
    assert_eq!(*h.planned.lock().unwrap(), vec!["shot-2".to_string()]);
    assert_eq!(h.typed.lock().unwrap().as_str(), "toe");
}

#[test]
fn test_failed_or_empty_plan_skips_cycle() {
    let h = harness(
        Locator::new(true),
        vec![],
        vec![("shot-2", vec![]), ("shot-3", vec!["body"])],
        Duration::from_millis(1),
    );
    let (_tx, rx) = flume::unbounded();

    let report = h.automation.with_max_cycles(Some(3)).run(&rx).unwrap();

    assert_eq!(report.cycles, 3);
    assert_eq!(h.planned.lock().unwrap().len(), 3);
    assert_eq!(h.typed.lock().unwrap().as_str(), "body");
    assert_eq!(report.stats.completed, 1);
}

#[test]
fn test_missing_window_skips_capture() {
    let h = harness(
        Locator::new(false),
        vec![],
        vec![("shot-1", vec!["use"])],
        Duration::from_millis(1),
    );
    let (_tx, rx) = flume::unbounded();

    let report = h.automation.with_max_cycles(Some(2)).run(&rx).unwrap();

    assert_eq!(report.outcome, LoopOutcome::Completed);
    assert_eq!(report.cycles, 2);
    assert_eq!(h.captures.load(Ordering::SeqCst), 0);
    assert!(h.planned.lock().unwrap().is_empty());
}

#[test]
fn test_interrupt_during_drain_stops_typing() {
    let alphabet = "abcdefghijklmnopqrstuvwxyz";
    let h = harness(
        Locator::new(true),
        vec![],
        vec![("shot-1", vec![alphabet])],
        Duration::from_millis(30),
    );
    let (tx, rx) = flume::unbounded();

    let interrupter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        tx.send(()).unwrap();
    });

    let started = Instant::now();
    let report = h.automation.with_max_cycles(Some(1)).run(&rx).unwrap();
    interrupter.join().unwrap();

    assert_eq!(report.outcome, LoopOutcome::Interrupted);
    assert_eq!(report.cycles, 1);
    assert!(started.elapsed() < Duration::from_millis(26 * 30));

    let typed_at_return = h.typed.lock().unwrap().clone();
    assert!(typed_at_return.len() < alphabet.len());
    assert!(alphabet.starts_with(typed_at_return.as_str()));

    // Nothing is typed once run has returned
    thread::sleep(Duration::from_millis(100));
    assert_eq!(*h.typed.lock().unwrap(), typed_at_return);
    assert_eq!(report.stats.interrupted, 1);
}

/// First plan is one long word; every later plan blocks like a slow HTTP call
struct SlowPlanner {
    word: &'static str,
    block: Duration,
    calls: AtomicUsize,
}

impl Planner for SlowPlanner {
    fn plan(&self, _image_url: &str) -> Result<Vec<Word>, PlanError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(Word::new(self.word).into_iter().collect());
        }
        thread::sleep(self.block);
        Ok(vec![])
    }
}

struct TimedSink {
    sent: Arc<Mutex<Vec<Instant>>>,
}

impl KeystrokeSink for TimedSink {
    fn send_char(&mut self, _ch: char) -> Result<(), TypingError> {
        self.sent.lock().unwrap().push(Instant::now());
        Ok(())
    }
}

#[test]
fn test_interrupt_during_blocked_plan_halts_keystrokes() {
    let word = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let sent = Arc::new(Mutex::new(Vec::new()));
    let locator = Locator::new(true);

    let dispatcher = InputDispatcher::new(
        TITLE,
        Arc::new(WordQueue::new()),
        locator.clone(),
        Box::new(TimedSink { sent: Arc::clone(&sent) }),
        DispatchTiming {
            char_interval: Duration::from_millis(50),
            poll_timeout: Duration::from_millis(10),
            settle_delay: Duration::ZERO,
        },
    );
    let mut automation = AutomationLoop::new(
        TITLE,
        dispatcher,
        locator,
        Box::new(Publisher {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_on: vec![],
        }),
        Box::new(SlowPlanner {
            word,
            block: Duration::from_secs(1),
            calls: AtomicUsize::new(0),
        }),
    )
    .with_cycle_delay(Duration::from_millis(20));

    let (tx, rx) = flume::unbounded();
    let interrupter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        let signalled_at = Instant::now();
        tx.send(()).unwrap();
        signalled_at
    });

    let report = automation.run(&rx).unwrap();
    let signalled_at = interrupter.join().unwrap();

    assert_eq!(report.outcome, LoopOutcome::Interrupted);
    assert_eq!(report.cycles, 2);

    let sent = sent.lock().unwrap();
    assert!(!sent.is_empty());
    assert!(sent.len() < word.len());
    let late = sent.iter().filter(|t| **t > signalled_at).count();
    assert!(late <= 1, "{late} keystrokes after the interrupt");
}

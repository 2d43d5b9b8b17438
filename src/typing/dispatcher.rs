//! Background worker that types queued words into the game window
//!
//! The worker owns the keystroke sink while it runs. Stopping flips a shared
//! state flag that the worker checks between words and before every
//! character, then joins the thread and takes the sink back.

use super::input::KeystrokeSink;
use super::queue::{Word, WordQueue};
use crate::config::TypingConfig;
use crate::window::WindowLocator;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest uninterrupted sleep inside the worker
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Dispatcher lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatcherState {
    Stopped = 0,
    Running = 1,
}

impl From<u8> for DispatcherState {
    fn from(v: u8) -> Self {
        match v {
            1 => DispatcherState::Running,
            _ => DispatcherState::Stopped,
        }
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherState::Stopped => write!(f, "Stopped"),
            DispatcherState::Running => write!(f, "Running"),
        }
    }
}

/// Halts keystrokes from any thread without waiting for the worker.
///
/// Safe to call from a signal handler; [`InputDispatcher::stop`] still has to
/// run to join the worker and recover the sink.
#[derive(Debug, Clone)]
pub struct StopHandle {
    state: Arc<AtomicU8>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.state
            .store(DispatcherState::Stopped as u8, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        DispatcherState::from(self.state.load(Ordering::SeqCst)) == DispatcherState::Stopped
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("keystroke sink was lost with a previous worker")]
    SinkLost,
    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Pacing of the worker loop
#[derive(Debug, Clone, Copy)]
pub struct DispatchTiming {
    /// Pause after each character
    pub char_interval: Duration,
    /// Longest wait on an empty queue before re-checking the stop flag
    pub poll_timeout: Duration,
    /// Pause between activating the window and the first keystroke
    pub settle_delay: Duration,
}

impl Default for DispatchTiming {
    fn default() -> Self {
        Self::from(&TypingConfig::default())
    }
}

impl From<&TypingConfig> for DispatchTiming {
    fn from(config: &TypingConfig) -> Self {
        Self {
            char_interval: config.char_interval(),
            poll_timeout: config.poll_timeout(),
            settle_delay: config.settle_delay(),
        }
    }
}

/// Running totals, shared with the worker
#[derive(Debug, Default)]
struct DispatchCounters {
    completed: AtomicU64,
    interrupted: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    keystrokes: AtomicU64,
}

/// Point-in-time copy of the dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Words typed in full
    pub completed: u64,
    /// Words cut short by `stop`
    pub interrupted: u64,
    /// Words discarded because the window could not be found
    pub dropped: u64,
    /// Words abandoned after an activation or keystroke error
    pub failed: u64,
    pub keystrokes: u64,
}

impl DispatchStats {
    pub fn summary(&self) -> String {
        format!(
            "{} typed, {} interrupted, {} dropped, {} failed ({} keystrokes)",
            self.completed, self.interrupted, self.dropped, self.failed, self.keystrokes
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WordOutcome {
    Completed,
    Interrupted { typed: usize },
    Dropped,
    Failed,
}

/// Types words from a [`WordQueue`] into one window on a dedicated thread
pub struct InputDispatcher {
    window_title: String,
    queue: Arc<WordQueue>,
    locator: Arc<dyn WindowLocator>,
    timing: DispatchTiming,
    state: Arc<AtomicU8>,
    counters: Arc<DispatchCounters>,
    sink: Option<Box<dyn KeystrokeSink>>,
    worker: Option<JoinHandle<Box<dyn KeystrokeSink>>>,
}

impl InputDispatcher {
    pub fn new(
        window_title: impl Into<String>,
        queue: Arc<WordQueue>,
        locator: Arc<dyn WindowLocator>,
        sink: Box<dyn KeystrokeSink>,
        timing: DispatchTiming,
    ) -> Self {
        Self {
            window_title: window_title.into(),
            queue,
            locator,
            timing,
            state: Arc::new(AtomicU8::new(DispatcherState::Stopped as u8)),
            counters: Arc::new(DispatchCounters::default()),
            sink: Some(sink),
            worker: None,
        }
    }

    pub fn state(&self) -> DispatcherState {
        DispatcherState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == DispatcherState::Running
    }

    pub fn queue(&self) -> &Arc<WordQueue> {
        &self.queue
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        let c = &self.counters;
        DispatchStats {
            completed: c.completed.load(Ordering::Relaxed),
            interrupted: c.interrupted.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            keystrokes: c.keystrokes.load(Ordering::Relaxed),
        }
    }

    /// Spawn the worker. No-op when already running.
    pub fn start(&mut self) -> Result<(), DispatchError> {
        if self.worker.is_some() {
            if self.is_running() {
                return Ok(());
            }
            // Halted through a StopHandle; reap the old worker first
            self.stop();
        }
        let sink = self.sink.take().ok_or(DispatchError::SinkLost)?;

        self.state
            .store(DispatcherState::Running as u8, Ordering::SeqCst);

        let worker = Worker {
            window_title: self.window_title.clone(),
            queue: Arc::clone(&self.queue),
            locator: Arc::clone(&self.locator),
            timing: self.timing,
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
            sink,
        };

        let spawned = thread::Builder::new()
            .name("input-dispatcher".into())
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                tracing::info!(window = %self.window_title, "input dispatcher started");
                Ok(())
            }
            Err(e) => {
                self.state
                    .store(DispatcherState::Stopped as u8, Ordering::SeqCst);
                Err(DispatchError::Spawn(e))
            }
        }
    }

    /// Signal the worker and wait for it to exit. No-op when stopped.
    ///
    /// Once this returns no further keystrokes are sent.
    pub fn stop(&mut self) {
        self.state
            .store(DispatcherState::Stopped as u8, Ordering::SeqCst);

        let Some(handle) = self.worker.take() else {
            return;
        };

        match handle.join() {
            Ok(sink) => self.sink = Some(sink),
            Err(_) => tracing::error!("input dispatcher worker panicked, keystroke sink lost"),
        }

        tracing::info!(
            queued = self.queue.len(),
            "input dispatcher stopped: {}",
            self.stats().summary()
        );
    }
}

impl Drop for InputDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    window_title: String,
    queue: Arc<WordQueue>,
    locator: Arc<dyn WindowLocator>,
    timing: DispatchTiming,
    state: Arc<AtomicU8>,
    counters: Arc<DispatchCounters>,
    sink: Box<dyn KeystrokeSink>,
}

impl Worker {
    fn is_running(&self) -> bool {
        DispatcherState::from(self.state.load(Ordering::SeqCst)) == DispatcherState::Running
    }

    fn run(mut self) -> Box<dyn KeystrokeSink> {
        while self.is_running() {
            let Some(word) = self.queue.dequeue_timeout(self.timing.poll_timeout) else {
                continue;
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(&word)))
                .unwrap_or_else(|_| {
                    tracing::error!(word = %word, "panic while typing word");
                    WordOutcome::Failed
                });
            self.queue.mark_done(&word);
            self.record(&word, outcome);
        }
        self.sink
    }

    fn dispatch(&mut self, word: &Word) -> WordOutcome {
        if !self.is_running() {
            return WordOutcome::Interrupted { typed: 0 };
        }

        let window = match self.locator.find(&self.window_title) {
            Ok(window) => window,
            Err(e) => {
                tracing::warn!(word = %word, error = %e, "game window unavailable, dropping word");
                return WordOutcome::Dropped;
            }
        };

        if let Err(e) = window.activate() {
            tracing::warn!(word = %word, error = %e, "activation failed");
            return WordOutcome::Failed;
        }
        if !self.pause(self.timing.settle_delay) {
            return WordOutcome::Interrupted { typed: 0 };
        }

        let mut typed = 0;
        for ch in word.as_str().chars() {
            if !self.is_running() {
                return WordOutcome::Interrupted { typed };
            }
            if let Err(e) = self.sink.send_char(ch) {
                tracing::warn!(word = %word, typed, error = %e, "keystroke failed");
                return WordOutcome::Failed;
            }
            typed += 1;
            self.counters.keystrokes.fetch_add(1, Ordering::Relaxed);
            if !self.pause(self.timing.char_interval) {
                return if typed == word.char_count() {
                    WordOutcome::Completed
                } else {
                    WordOutcome::Interrupted { typed }
                };
            }
        }

        WordOutcome::Completed
    }

    /// Sleep for `duration` in short slices. Returns false once stopped.
    fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if !self.is_running() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(STOP_CHECK_INTERVAL));
        }
    }

    fn record(&self, word: &Word, outcome: WordOutcome) {
        let c = &self.counters;
        match outcome {
            WordOutcome::Completed => {
                c.completed.fetch_add(1, Ordering::Relaxed);
                tracing::info!(word = %word, "typed");
            }
            WordOutcome::Interrupted { typed } => {
                c.interrupted.fetch_add(1, Ordering::Relaxed);
                tracing::info!(word = %word, typed, total = word.char_count(), "stopped mid-word");
            }
            WordOutcome::Dropped => {
                c.dropped.fetch_add(1, Ordering::Relaxed);
            }
            WordOutcome::Failed => {
                c.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

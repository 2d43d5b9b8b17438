//! The capture → plan → enqueue cycle
//!
//! Owns the dispatcher for the duration of [`AutomationLoop::run`]; the
//! dispatcher is stopped before `run` returns on every path. A shutdown
//! message halts keystrokes at once, even while a capture or plan request is
//! still blocking the cycle.

use crate::capture::ScreenPublisher;
use crate::planner::Planner;
use crate::typing::{DispatchError, DispatchStats, InputDispatcher, StopHandle, WordQueue};
use crate::window::WindowLocator;
use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Shutdown was requested
    Interrupted,
    /// The cycle limit was reached and the queue drained
    Completed,
}

impl fmt::Display for LoopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopOutcome::Interrupted => write!(f, "interrupted"),
            LoopOutcome::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopReport {
    pub outcome: LoopOutcome,
    pub cycles: u32,
    pub stats: DispatchStats,
}

pub struct AutomationLoop {
    window_title: String,
    queue: Arc<WordQueue>,
    dispatcher: InputDispatcher,
    locator: Arc<dyn WindowLocator>,
    publisher: Box<dyn ScreenPublisher>,
    planner: Box<dyn Planner>,
    cycle_delay: Duration,
    drain_poll: Duration,
    max_cycles: Option<u32>,
}

impl AutomationLoop {
    pub fn new(
        window_title: impl Into<String>,
        dispatcher: InputDispatcher,
        locator: Arc<dyn WindowLocator>,
        publisher: Box<dyn ScreenPublisher>,
        planner: Box<dyn Planner>,
    ) -> Self {
        Self {
            window_title: window_title.into(),
            queue: Arc::clone(dispatcher.queue()),
            dispatcher,
            locator,
            publisher,
            planner,
            cycle_delay: Duration::from_millis(2000),
            drain_poll: Duration::from_millis(100),
            max_cycles: None,
        }
    }

    /// Pause between the end of one cycle and the start of the next.
    pub fn with_cycle_delay(mut self, delay: Duration) -> Self {
        self.cycle_delay = delay;
        self
    }

    /// Stop after `max` cycles once every planned word has been handled.
    pub fn with_max_cycles(mut self, max: Option<u32>) -> Self {
        self.max_cycles = max;
        self
    }

    pub fn queue(&self) -> &Arc<WordQueue> {
        &self.queue
    }

    /// Run until `shutdown` receives a message or the cycle limit is reached.
    pub fn run(&mut self, shutdown: &Receiver<()>) -> Result<LoopReport, DispatchError> {
        if shutdown_requested(shutdown) {
            tracing::info!("shutdown requested before the first cycle");
            return Ok(LoopReport {
                outcome: LoopOutcome::Interrupted,
                cycles: 0,
                stats: self.dispatcher.stats(),
            });
        }

        self.dispatcher.start()?;
        tracing::info!(
            window = %self.window_title,
            max_cycles = ?self.max_cycles,
            delay_ms = self.cycle_delay.as_millis() as u64,
            "automation loop started"
        );

        let stop = self.dispatcher.stop_handle();
        let poll = self.drain_poll;
        let finished = AtomicBool::new(false);
        let (interrupt_tx, interrupt_rx) = flume::bounded(1);

        let (outcome, cycles) = thread::scope(|scope| {
            scope.spawn(|| {
                watch_shutdown(shutdown, &stop, interrupt_tx, &finished, poll)
            });
            let result = self.cycles(&interrupt_rx);
            finished.store(true, Ordering::SeqCst);
            result
        });

        self.dispatcher.stop();
        let stats = self.dispatcher.stats();
        tracing::info!(%outcome, cycles, "automation loop finished: {}", stats.summary());

        Ok(LoopReport { outcome, cycles, stats })
    }

    fn cycles(&self, shutdown: &Receiver<()>) -> (LoopOutcome, u32) {
        let mut cycles = 0;

        while self.max_cycles.is_none_or(|max| cycles < max) {
            if shutdown_requested(shutdown) {
                return (LoopOutcome::Interrupted, cycles);
            }

            cycles += 1;
            self.run_cycle(cycles);

            let last = self.max_cycles == Some(cycles);
            if !last && wait_for_shutdown(shutdown, self.cycle_delay) {
                return (LoopOutcome::Interrupted, cycles);
            }
        }

        if self.wait_for_drain(shutdown) {
            (LoopOutcome::Completed, cycles)
        } else {
            (LoopOutcome::Interrupted, cycles)
        }
    }

    /// One capture → plan → enqueue pass. Failures skip the cycle.
    fn run_cycle(&self, cycle: u32) {
        let _span = tracing::info_span!("cycle", n = cycle).entered();

        let window = match self.locator.find(&self.window_title) {
            Ok(window) => window,
            Err(e) => {
                tracing::warn!(error = %e, "game window not found, skipping cycle");
                return;
            }
        };

        let url = match self.publisher.capture_and_publish(window.as_ref()) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "capture failed, skipping cycle");
                return;
            }
        };

        let words = match self.planner.plan(&url) {
            Ok(words) => words,
            Err(e) => {
                tracing::warn!(error = %e, "planning failed, skipping cycle");
                return;
            }
        };

        if words.is_empty() {
            tracing::info!("planner returned no words");
            return;
        }

        let planned = words.len();
        let added = self.queue.enqueue(words);
        tracing::info!(planned, added, queued = self.queue.len(), "words enqueued");
    }

    /// Returns false if shutdown arrived before the dispatcher went idle.
    fn wait_for_drain(&self, shutdown: &Receiver<()>) -> bool {
        if self.queue.pending_len() > 0 {
            tracing::info!(pending = self.queue.pending_len(), "waiting for queue to drain");
        }
        while self.queue.pending_len() > 0 {
            if wait_for_shutdown(shutdown, self.drain_poll) {
                return false;
            }
        }
        true
    }
}

/// Halt the dispatcher as soon as `shutdown` fires, then tell the cycle loop.
fn watch_shutdown(
    shutdown: &Receiver<()>,
    stop: &StopHandle,
    interrupt: Sender<()>,
    finished: &AtomicBool,
    poll: Duration,
) {
    while !finished.load(Ordering::SeqCst) {
        match shutdown.recv_timeout(poll) {
            Ok(()) => {
                stop.stop();
                tracing::info!("shutdown requested, keystrokes halted");
                let _ = interrupt.send(());
                return;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn shutdown_requested(shutdown: &Receiver<()>) -> bool {
    match shutdown.try_recv() {
        Ok(()) => true,
        Err(TryRecvError::Empty | TryRecvError::Disconnected) => false,
    }
}

/// Sleep up to `timeout`, returning early (true) on a shutdown message.
fn wait_for_shutdown(shutdown: &Receiver<()>, timeout: Duration) -> bool {
    match shutdown.recv_timeout(timeout) {
        Ok(()) => true,
        Err(RecvTimeoutError::Timeout) => false,
        // No sender left to interrupt us; keep the pacing anyway
        Err(RecvTimeoutError::Disconnected) => {
            thread::sleep(timeout);
            false
        }
    }
}

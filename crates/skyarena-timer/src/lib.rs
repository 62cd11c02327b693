//! Delayed-task scheduling for SkyArena.
//!
//! The lifecycle core runs every orchestration step on one dispatch loop.
//! Anything that has to happen *later* (a countdown tick, the end of a
//! countdown, a retry after no arena was free) is scheduled here and
//! comes back as an ordinary event on that loop's channel. Nothing in the
//! core ever sleeps or blocks waiting for a timer.
//!
//! # Integration
//!
//! ```ignore
//! let (scheduler, mut timer_rx) = Scheduler::channel();
//! let handle = scheduler.schedule(Duration::from_secs(5), Retry);
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         Some(event) = timer_rx.recv() => { /* handle timer events */ }
//!     }
//! }
//! ```
//!
//! # Cancellation
//!
//! Every scheduled task returns a [`TaskHandle`]. Cancelling is
//! idempotent: it flips a shared flag the task checks before each send
//! and aborts the task. An event already sitting in the channel when
//! `cancel` runs can still be received, so consumers tag their events
//! (the game layer uses a per-instance epoch) and drop stale ones.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time;
use tracing::{debug, trace};

/// Counter for task IDs (log correlation only).
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Smallest step a countdown may use. Prevents a zero step from spinning.
const MIN_COUNTDOWN_STEP: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// TaskHandle
// ---------------------------------------------------------------------------

/// Identifies one scheduled task in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T-{}", self.0)
    }
}

/// Cancellation handle for a scheduled task.
///
/// Dropping the handle does NOT cancel the task; fire-and-forget is the
/// default. Call [`cancel`](Self::cancel) explicitly.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    cancelled: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Cancels the task. Safe to call any number of times.
    ///
    /// Returns `true` only for the call that actually cancelled it.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.abort.abort();
        debug!(task = %self.id, "scheduled task cancelled");
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Posts events, now or later, into a dispatch loop's channel.
///
/// Cheap to clone; every clone feeds the same receiver. Scheduling spawns
/// a Tokio task, so `schedule*` must be called from within a runtime.
pub struct Scheduler<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> Clone for Scheduler<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E: Send + 'static> Scheduler<E> {
    pub fn new(tx: mpsc::UnboundedSender<E>) -> Self {
        Self { tx }
    }

    /// Creates a scheduler together with the receiver the dispatch loop
    /// should poll.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Delivers `event` once `delay` has elapsed, unless cancelled first.
    pub fn schedule(&self, delay: Duration, event: E) -> TaskHandle {
        let id = next_task_id();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            if flag.load(Ordering::SeqCst) {
                return;
            }
            trace!(task = %id, "delayed task fired");
            let _ = tx.send(event);
        });

        debug!(task = %id, delay_ms = delay.as_millis() as u64, "task scheduled");
        TaskHandle {
            id,
            cancelled,
            abort: task.abort_handle(),
        }
    }

    /// Runs a countdown of `total`, emitting `make(remaining)` right away,
    /// then after every `step`, and finally with `Duration::ZERO`.
    ///
    /// A `total` of zero emits a single `make(Duration::ZERO)`. The last
    /// step is shortened so the countdown always ends exactly at `total`.
    pub fn schedule_countdown<F>(&self, total: Duration, step: Duration, make: F) -> TaskHandle
    where
        F: Fn(Duration) -> E + Send + 'static,
    {
        let id = next_task_id();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let tx = self.tx.clone();
        let step = step.max(MIN_COUNTDOWN_STEP);

        let task = tokio::spawn(async move {
            let mut remaining = total;
            loop {
                if flag.load(Ordering::SeqCst) {
                    return;
                }
                trace!(task = %id, remaining_ms = remaining.as_millis() as u64, "countdown step");
                if tx.send(make(remaining)).is_err() || remaining.is_zero() {
                    return;
                }
                let wait = step.min(remaining);
                time::sleep(wait).await;
                remaining = remaining.saturating_sub(wait);
            }
        });

        debug!(
            task = %id,
            total_secs = total.as_secs_f64(),
            step_secs = step.as_secs_f64(),
            "countdown scheduled"
        );
        TaskHandle {
            id,
            cancelled,
            abort: task.abort_handle(),
        }
    }
}

fn next_task_id() -> TaskId {
    TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Exponential backoff with random jitter.
///
/// Each call to [`next_delay`](Self::next_delay) doubles the base delay
/// (capped at `max`) and adds `0..jitter` of random slack so retries from
/// several sources don't line up.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter,
            attempt: 0,
        }
    }

    /// Returns the delay before the next retry and advances the attempt
    /// counter.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let exp = self.base.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);

        let jitter_us = self.jitter.as_micros() as u64;
        let slack = if jitter_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..jitter_us))
        } else {
            Duration::ZERO
        };
        exp + slack
    }

    /// Starts over from `base` (call after a success).
    pub fn reset(&mut self) {
        if self.attempt > 0 {
            trace!(attempts = self.attempt, "backoff reset");
        }
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

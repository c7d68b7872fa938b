//! Cancellable timers on the tokio runtime.
//!
//! Every periodic activity in the crate (engine tick, ramp tick, fade steps,
//! light pulsing, snooze delay) runs on a [`TimerHandle`]. Cancelling is
//! synchronous: once [`TimerHandle::cancel`] returns, the callback will not
//! be invoked again. A callback that is already executing finishes; owners
//! additionally guard their state with a generation number so such a
//! callback observes the cancellation and becomes a no-op.
//!
//! A callback may stop its own timer by returning [`ControlFlow::Break`],
//! or by cancelling a handle it reaches through shared state.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a running timer. Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// A handle that was never scheduled.
    fn inert() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(true)),
            task: None,
        }
    }

    /// Stop the timer. Safe to call repeatedly and from the timer's own callback.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// True once the timer was cancelled or ran to completion.
    pub fn is_finished(&self) -> bool {
        self.is_cancelled() || self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn runtime() -> Option<tokio::runtime::Handle> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle),
        Err(_) => {
            tracing::warn!("no tokio runtime available; timer not scheduled");
            None
        }
    }
}

/// Invoke `callback` every `period`, first after one full period.
///
/// The timer stops when the callback returns `ControlFlow::Break(())` or the
/// handle is cancelled.
pub fn spawn_interval<F>(period: Duration, mut callback: F) -> TimerHandle
where
    F: FnMut() -> ControlFlow<()> + Send + 'static,
{
    let Some(rt) = runtime() else {
        return TimerHandle::inert();
    };
    let period = period.max(MIN_PERIOD);
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);

    let task = rt.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if flag.load(Ordering::Acquire) {
                break;
            }
            if callback().is_break() {
                flag.store(true, Ordering::Release);
                break;
            }
        }
    });

    TimerHandle {
        cancelled,
        task: Some(task),
    }
}

/// Invoke `callback` once after `delay`.
pub fn spawn_once<F>(delay: Duration, callback: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    let Some(rt) = runtime() else {
        return TimerHandle::inert();
    };
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);

    let task = rt.spawn(async move {
        tokio::time::sleep(delay).await;
        if !flag.swap(true, Ordering::AcqRel) {
            callback();
        }
    });

    TimerHandle {
        cancelled,
        task: Some(task),
    }
}

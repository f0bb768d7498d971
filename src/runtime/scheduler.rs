//! One-shot, cancellable timers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::runtime::clock::{Clock, UnixMillis};

/// Work executed when a timer fires.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Default)]
struct TimerState {
    cancelled: AtomicBool,
    fired: AtomicBool,
}

/// Handle to an armed timer.
///
/// Clones share the same timer; cancelling any clone cancels it.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    state: Arc<TimerState>,
}

impl TimerHandle {
    fn new() -> Self {
        Self::default()
    }

    /// Prevent the task from running. No-op once fired.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    /// True while the timer is armed and has neither fired nor been cancelled.
    pub fn is_pending(&self) -> bool {
        !self.state.cancelled.load(Ordering::SeqCst) && !self.state.fired.load(Ordering::SeqCst)
    }

    fn fire(&self, task: Task) {
        if self.state.cancelled.load(Ordering::SeqCst) {
            return;
        }
        // Marked before running so the task may arm a successor.
        self.state.fired.store(true, Ordering::SeqCst);
        task();
    }
}

/// Deferred execution capability.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`.
    fn after(&self, delay: Duration, task: Task) -> TimerHandle;

    /// Future resolving after `delay`. Dropping it early cancels the timer.
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        let timer = CancelOnDrop(self.after(
            delay,
            Box::new(move || {
                let _ = tx.send(());
            }),
        ));
        async move {
            let _timer = timer;
            let _ = rx.await;
        }
        .boxed()
    }
}

struct CancelOnDrop(TimerHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Scheduler running timers as tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let timer = handle.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            timer.fire(task);
        });
        handle
    }

    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(delay).boxed()
    }
}

struct PendingTimer {
    due: UnixMillis,
    seq: u64,
    handle: TimerHandle,
    task: Task,
}

struct VirtualState {
    now: UnixMillis,
    next_seq: u64,
    timers: Vec<PendingTimer>,
}

/// Manually driven clock and scheduler.
///
/// Time only moves on [`VirtualTime::advance`], which fires every timer that
/// comes due, earliest first.
pub struct VirtualTime {
    state: Mutex<VirtualState>,
}

impl VirtualTime {
    pub fn new(start: UnixMillis) -> Self {
        Self {
            state: Mutex::new(VirtualState {
                now: start,
                next_seq: 0,
                timers: Vec::new(),
            }),
        }
    }

    /// Move time forward by `delay`, firing due timers in deadline order.
    pub fn advance(&self, delay: Duration) {
        let target = self.state.lock().now.add(delay);
        while let Some(timer) = self.take_due(target) {
            // Fired outside the lock; tasks may arm new timers.
            timer.handle.fire(timer.task);
        }
        let mut state = self.state.lock();
        if state.now < target {
            state.now = target;
        }
    }

    /// Number of timers still armed.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .timers
            .iter()
            .filter(|t| t.handle.is_pending())
            .count()
    }

    fn take_due(&self, target: UnixMillis) -> Option<PendingTimer> {
        let mut state = self.state.lock();
        let index = state
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= target)
            .min_by_key(|(_, t)| (t.due, t.seq))
            .map(|(i, _)| i)?;
        let timer = state.timers.swap_remove(index);
        if state.now < timer.due {
            state.now = timer.due;
        }
        Some(timer)
    }
}

impl Default for VirtualTime {
    fn default() -> Self {
        Self::new(UnixMillis(0))
    }
}

impl Clock for VirtualTime {
    fn now(&self) -> UnixMillis {
        self.state.lock().now
    }
}

impl Scheduler for VirtualTime {
    fn after(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = self.state.lock();
        state.timers.retain(|t| t.handle.is_pending());
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.now.add(delay);
        state.timers.push(PendingTimer {
            due,
            seq,
            handle: handle.clone(),
            task,
        });
        handle
    }
}

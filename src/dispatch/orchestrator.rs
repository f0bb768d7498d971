//! Dispatcher: drives the queue head through backends.
//!
//! # Attempt Sequence
//! ```text
//! for backend in priority order:
//!     breaker open?          → skip
//!     for attempt in 0..max_attempts:
//!         send (with optional deadline)
//!         ok                 → breaker success, status sent, done
//!         err                → breaker failure, status retrying,
//!                              backoff unless this was the last attempt
//! all backends exhausted     → status failed, record dropped
//! ```
//!
//! # Design Decisions
//! - The tick-level admission reserves the first attempt; later attempts are
//!   recorded against the window without being gated by it. If every breaker
//!   is open nothing is sent and the reserved slot is released
//! - The head is chosen and marked in flight under the queue lock, so removal
//!   either cancels it before the sequence starts or detaches it after
//! - At most one resume timer exists while the limiter is saturated
//! - Settings are swapped atomically; a running sequence keeps the snapshot
//!   it started with

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, Notify};
use tokio::time::MissedTickBehavior;

use crate::backend::{Backend, BackendPool};
use crate::config::{validation, ConfigPatch, RelayConfig};
use crate::dispatch::queue::{DeliveryQueue, QueueEntryView, QueueItem, RemoveOutcome, SubmitReceipt, SubmitStatus};
use crate::dispatch::status::{StatusEvent, StatusRecord};
use crate::dispatch::{DispatchError, Message, MessageId};
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;
use crate::resilience::{BreakerSnapshot, CircuitBreaker, RateLimitConfig, RetryPolicy, SlidingWindowLimiter};
use crate::runtime::{Clock, Scheduler, TimerHandle, UnixMillis};

/// Runtime-adjustable dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchSettings {
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitConfig,
    pub send_timeout_ms: Option<u64>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            send_timeout_ms: None,
        }
    }
}

impl DispatchSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            retry: config.retry.clone(),
            rate_limit: config.rate_limit.clone(),
            send_timeout_ms: config.dispatch.send_timeout_ms,
        }
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }

    /// Copy with the fields present in `patch` replaced.
    pub fn patched(&self, patch: &ConfigPatch) -> Self {
        let mut next = self.clone();
        if let Some(retry) = &patch.retry {
            retry.apply(&mut next.retry);
        }
        if let Some(rate_limit) = &patch.rate_limit {
            rate_limit.apply(&mut next.rate_limit);
        }
        next
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Queue was empty.
    Idle,
    /// Another tick is still running its attempt sequence.
    Busy,
    /// Rate limit saturated; the head stays queued for at least this long.
    Deferred(Duration),
    Delivered { id: MessageId, backend: String },
    /// Every backend failed; `attempts` is the count reported in the final status.
    Failed { id: MessageId, attempts: u32 },
}

enum SequenceResult {
    Delivered(String),
    Exhausted,
}

struct BackendSlot {
    backend: Arc<dyn Backend>,
    breaker: CircuitBreaker,
}

/// Clears the busy flag when a tick ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Dispatcher {
    slots: Vec<BackendSlot>,
    queue: Mutex<DeliveryQueue>,
    limiter: Mutex<SlidingWindowLimiter>,
    settings: ArcSwap<DispatchSettings>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    resume_timer: Mutex<Option<TimerHandle>>,
    wake: Arc<Notify>,
    busy: AtomicBool,
    paused: AtomicBool,
}

impl Dispatcher {
    pub fn new(
        pool: BackendPool,
        settings: DispatchSettings,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let slots = pool
            .into_entries()
            .into_iter()
            .map(|entry| {
                let breaker = CircuitBreaker::new(
                    entry.backend.name(),
                    entry.breaker,
                    clock.clone(),
                    scheduler.clone(),
                );
                BackendSlot {
                    backend: entry.backend,
                    breaker,
                }
            })
            .collect();

        Self {
            slots,
            queue: Mutex::new(DeliveryQueue::new()),
            limiter: Mutex::new(SlidingWindowLimiter::new(settings.rate_limit.clone())),
            settings: ArcSwap::from_pointee(settings),
            clock,
            scheduler,
            resume_timer: Mutex::new(None),
            wake: Arc::new(Notify::new()),
            busy: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        }
    }

    /// Enqueue a message. Duplicates are reported, not errors.
    pub fn submit(&self, message: Message, key: Option<&str>) -> Result<SubmitReceipt, DispatchError> {
        let id = MessageId::resolve(&message, key)?;
        let now = self.clock.now();
        let mut queue = self.queue.lock();
        let receipt = queue.submit(id, message, now);
        let depth = queue.len();
        drop(queue);

        match receipt.status {
            SubmitStatus::Queued => {
                tracing::info!(id = %receipt.id, depth, "Message queued");
                metrics::record_queue_depth(depth);
            }
            SubmitStatus::Duplicate => {
                tracing::info!(id = %receipt.id, "Duplicate message ignored");
                metrics::record_duplicate();
            }
        }
        Ok(receipt)
    }

    pub fn status(&self) -> Vec<StatusRecord> {
        self.queue.lock().status()
    }

    pub fn message_status(&self, id: &MessageId) -> Option<StatusRecord> {
        self.queue.lock().get(id).cloned()
    }

    pub fn queue(&self) -> Vec<QueueEntryView> {
        self.queue.lock().queue_view()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Breaker state per backend, in priority order.
    pub fn backend_status(&self) -> Vec<BreakerSnapshot> {
        self.slots.iter().map(|slot| slot.breaker.snapshot()).collect()
    }

    pub fn settings(&self) -> Arc<DispatchSettings> {
        self.settings.load_full()
    }

    /// Attempts recorded in the current rate-limit window.
    pub fn rate_limit_usage(&self) -> usize {
        let now = self.clock.now();
        self.limiter.lock().in_window(now)
    }

    /// Merge `patch` into the current settings.
    ///
    /// Rejected as a whole if the merged settings are invalid. Takes effect
    /// on the next attempt sequence.
    pub fn set_config(&self, patch: &ConfigPatch) -> Result<Arc<DispatchSettings>, DispatchError> {
        let next = self.settings.load().patched(patch);
        let errors = validation::validate_settings(&next.retry, &next.rate_limit);
        if !errors.is_empty() {
            return Err(DispatchError::InvalidSettings(errors));
        }

        self.limiter.lock().reconfigure(next.rate_limit.clone());
        let next = Arc::new(next);
        self.settings.store(next.clone());
        tracing::info!(
            max_attempts = next.retry.max_attempts,
            base_delay_ms = next.retry.base_delay_ms,
            max_delay_ms = next.retry.max_delay_ms,
            rate_limit_max = next.rate_limit.max,
            rate_limit_window_ms = next.rate_limit.window_ms,
            "Dispatch settings updated"
        );
        Ok(next)
    }

    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            tracing::info!("Queue processing paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            tracing::info!("Queue processing resumed");
            self.wake.notify_one();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn remove_from_queue(&self, id: &MessageId) -> RemoveOutcome {
        let mut queue = self.queue.lock();
        let outcome = queue.remove(id);
        let depth = queue.len();
        drop(queue);

        match outcome {
            RemoveOutcome::Cancelled => tracing::info!(id = %id, "Message removed from queue"),
            RemoveOutcome::Detached => {
                tracing::warn!(id = %id, "Message removed while in flight; delivery outcome will still be recorded")
            }
            RemoveOutcome::NotFound => tracing::debug!(id = %id, "Remove requested for unknown message"),
        }
        metrics::record_queue_depth(depth);
        outcome
    }

    /// Drop every message still waiting in `queued` status.
    pub fn clear_queue(&self) -> usize {
        let mut queue = self.queue.lock();
        let removed = queue.clear();
        let depth = queue.len();
        drop(queue);

        tracing::info!(removed, remaining = depth, "Queue cleared");
        metrics::record_queue_depth(depth);
        removed
    }

    /// Process the queue head once.
    pub async fn tick(&self) -> TickOutcome {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            tracing::debug!("Tick skipped, previous attempt sequence still running");
            return TickOutcome::Busy;
        };

        let now = self.clock.now();
        let admitted = {
            let mut queue = self.queue.lock();
            if queue.is_empty() {
                return TickOutcome::Idle;
            }
            let mut limiter = self.limiter.lock();
            if limiter.try_admit(now) {
                // Selected and marked in flight under the same lock as removals.
                Ok(queue.begin_head())
            } else {
                Err(limiter.retry_after(now))
            }
        };
        let item = match admitted {
            Ok(Some(item)) => item,
            Ok(None) => return TickOutcome::Idle,
            Err(wait) => {
                self.defer(wait);
                return TickOutcome::Deferred(wait);
            }
        };

        let settings = self.settings.load_full();
        let result = self.attempt_sequence(&item, &settings, now).await;

        let now = self.clock.now();
        let mut queue = self.queue.lock();
        let outcome = match result {
            SequenceResult::Delivered(backend) => {
                queue.complete(&item.id, true);
                metrics::record_delivery(&backend);
                TickOutcome::Delivered {
                    id: item.id,
                    backend,
                }
            }
            SequenceResult::Exhausted => {
                let attempts = settings.retry.exhausted_attempts(self.slots.len());
                queue.record(&item.id, &StatusEvent::Exhausted { attempts, at: now });
                queue.complete(&item.id, false);
                tracing::error!(id = %item.id, attempts, "All backends failed, message dropped");
                metrics::record_exhausted();
                TickOutcome::Failed { id: item.id, attempts }
            }
        };
        metrics::record_queue_depth(queue.len());
        outcome
    }

    /// Tick every `interval` until shutdown.
    ///
    /// Ticks run one after another; an attempt sequence that is already in
    /// flight finishes before shutdown is observed.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            backends = self.slots.len(),
            "Dispatcher starting"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {
                    tracing::debug!("Dispatcher woken early");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Dispatcher received shutdown signal, exiting loop");
                    break;
                }
            }

            if self.is_paused() {
                continue;
            }
            self.tick().await;
        }
    }

    /// Arm the resume timer unless one is already pending.
    fn defer(&self, wait: Duration) {
        let mut timer = self.resume_timer.lock();
        if timer.as_ref().is_some_and(TimerHandle::is_pending) {
            tracing::debug!("Rate limit resume already scheduled");
            return;
        }

        tracing::info!(wait_ms = wait.as_millis() as u64, "Rate limit reached, deferring queue");
        metrics::record_deferral();
        let wake = self.wake.clone();
        *timer = Some(self.scheduler.after(wait, Box::new(move || wake.notify_one())));
    }

    /// Try every backend in priority order.
    ///
    /// The first real send uses the rate-limit slot reserved at `admitted_at`;
    /// later sends record their own. The slot is given back if every breaker
    /// was open and nothing was sent.
    async fn attempt_sequence(
        &self,
        item: &QueueItem,
        settings: &DispatchSettings,
        admitted_at: UnixMillis,
    ) -> SequenceResult {
        let retry = &settings.retry;
        let timeout = settings.send_timeout();
        let mut reserved = true;

        for slot in &self.slots {
            let backend = slot.backend.name();
            if !slot.breaker.can_attempt() {
                tracing::warn!(id = %item.id, backend, "Circuit breaker open, skipping backend");
                continue;
            }

            for attempt in 0..retry.max_attempts {
                if !std::mem::take(&mut reserved) {
                    let now = self.clock.now();
                    self.limiter.lock().record(now);
                }
                metrics::record_attempt(backend);
                tracing::debug!(id = %item.id, backend, attempt, "Attempting delivery");

                let sent = with_deadline(
                    self.scheduler.as_ref(),
                    timeout,
                    slot.backend.send(&item.message),
                )
                .await;
                let now = self.clock.now();

                match sent {
                    Ok(()) => {
                        slot.breaker.on_success();
                        self.queue.lock().record(
                            &item.id,
                            &StatusEvent::Delivered {
                                backend: backend.to_string(),
                                attempt,
                                at: now,
                            },
                        );
                        tracing::info!(id = %item.id, backend, attempts = attempt + 1, "Message delivered");
                        return SequenceResult::Delivered(backend.to_string());
                    }
                    Err(error) => {
                        slot.breaker.on_failure();
                        self.queue.lock().record(
                            &item.id,
                            &StatusEvent::AttemptFailed {
                                backend: backend.to_string(),
                                attempt,
                                error: error.to_string(),
                                at: now,
                            },
                        );
                        metrics::record_attempt_failure(backend);
                        tracing::warn!(id = %item.id, backend, attempt, error = %error, "Delivery attempt failed");

                        if retry.has_next(attempt) {
                            let delay = retry.delay(attempt);
                            tracing::debug!(id = %item.id, backend, delay_ms = delay.as_millis() as u64, "Backing off");
                            self.scheduler.sleep(delay).await;
                        }
                    }
                }
            }
        }

        if reserved {
            self.limiter.lock().release(admitted_at);
            tracing::debug!(id = %item.id, "No backend attempted, rate-limit slot released");
        }
        SequenceResult::Exhausted
    }
}

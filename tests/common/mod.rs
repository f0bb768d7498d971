//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;

use resilient_relay::backend::{Backend, BackendPool, DeliveryError};
use resilient_relay::dispatch::{DispatchSettings, Dispatcher, Message};
use resilient_relay::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryPolicy};
use resilient_relay::runtime::{Clock, TokioClock, TokioScheduler, UnixMillis, VirtualTime};

/// Backend answering from a script, then from a fallback outcome.
pub struct ScriptedBackend {
    name: String,
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedBackend {
    pub fn always_ok(name: &str) -> Arc<Self> {
        Arc::new(Self::new(name, Vec::new(), true, None))
    }

    pub fn always_fail(name: &str) -> Arc<Self> {
        Arc::new(Self::new(name, Vec::new(), false, None))
    }

    /// `true` succeeds, `false` fails; after the script runs out, succeed.
    pub fn scripted(name: &str, script: Vec<bool>) -> Arc<Self> {
        Arc::new(Self::new(name, script, true, None))
    }

    /// Every send waits for `gate.notify_one()` before answering with `outcome`.
    pub fn gated(name: &str, outcome: bool, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self::new(name, Vec::new(), outcome, Some(gate)))
    }

    fn new(name: &str, script: Vec<bool>, fallback: bool, gate: Option<Arc<Notify>>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            gate,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Yield until at least `n` sends have started.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, _message: &Message) -> Result<(), DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let outcome = self.script.lock().pop_front().unwrap_or(self.fallback);
        if outcome {
            Ok(())
        } else {
            Err(DeliveryError::Unavailable(format!("{} failed to send message", self.name)))
        }
    }
}

/// Virtual clock that runs a hook on the next time read after arming.
///
/// Lets a test interleave an operation with the exact point where the
/// dispatcher reads the clock.
pub struct HookedClock {
    time: Arc<VirtualTime>,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl HookedClock {
    pub fn new(time: Arc<VirtualTime>) -> Self {
        Self {
            time,
            hook: Mutex::new(None),
        }
    }

    pub fn arm(&self, hook: impl FnOnce() + Send + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }
}

impl Clock for HookedClock {
    fn now(&self) -> UnixMillis {
        let hook = self.hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        self.time.now()
    }
}

pub fn message(n: u32) -> Message {
    Message::new(
        format!("user{n}@example.com"),
        "relay@example.com",
        format!("Message {n}"),
        "Hello from the relay",
    )
}

/// Settings with short backoff and a generous rate limit.
pub fn settings(max_attempts: u32) -> DispatchSettings {
    DispatchSettings {
        retry: RetryPolicy {
            max_attempts,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            backoff_multiplier: 2.0,
        },
        rate_limit: RateLimitConfig {
            max: 1_000,
            window_ms: 60_000,
        },
        send_timeout_ms: None,
    }
}

pub fn breaker(max_failures: u32, reset_timeout_ms: u64) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        max_failures,
        reset_timeout_ms,
    }
}

pub fn pool(backends: &[Arc<ScriptedBackend>], breaker: &CircuitBreakerConfig) -> BackendPool {
    backends.iter().fold(BackendPool::new(), |pool, backend| {
        pool.with(backend.clone() as Arc<dyn Backend>, breaker.clone())
    })
}

/// Dispatcher on manually advanced time. Sends must not back off.
pub fn virtual_dispatcher(
    backends: &[Arc<ScriptedBackend>],
    settings: DispatchSettings,
    breaker: CircuitBreakerConfig,
) -> (Arc<Dispatcher>, Arc<VirtualTime>) {
    let time = Arc::new(VirtualTime::default());
    let dispatcher = Dispatcher::new(pool(backends, &breaker), settings, time.clone(), time.clone());
    (Arc::new(dispatcher), time)
}

/// Dispatcher on virtual time whose clock reads can be hooked.
pub fn hooked_dispatcher(
    backends: &[Arc<ScriptedBackend>],
    settings: DispatchSettings,
    breaker: CircuitBreakerConfig,
) -> (Arc<Dispatcher>, Arc<HookedClock>) {
    let time = Arc::new(VirtualTime::default());
    let clock = Arc::new(HookedClock::new(time.clone()));
    let dispatcher = Dispatcher::new(pool(backends, &breaker), settings, clock.clone(), time);
    (Arc::new(dispatcher), clock)
}

/// Dispatcher on tokio time; use with `start_paused = true`.
pub fn tokio_dispatcher(
    backends: &[Arc<ScriptedBackend>],
    settings: DispatchSettings,
    breaker: CircuitBreakerConfig,
) -> Arc<Dispatcher> {
    let dispatcher = Dispatcher::new(
        pool(backends, &breaker),
        settings,
        Arc::new(TokioClock::new()),
        Arc::new(TokioScheduler::new(Handle::current())),
    );
    Arc::new(dispatcher)
}

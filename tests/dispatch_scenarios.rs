//! End-to-end dispatch scenarios against scripted backends.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Notify};

use resilient_relay::config::{ConfigPatch, RetryPatch};
use resilient_relay::dispatch::{DeliveryStatus, RemoveOutcome, SubmitStatus, TickOutcome};
use resilient_relay::resilience::{CircuitState, RateLimitConfig};

mod common;
use common::{
    breaker, hooked_dispatcher, message, settings, tokio_dispatcher, virtual_dispatcher, ScriptedBackend,
};

#[tokio::test(start_paused = true)]
async fn test_two_failing_backends_exhaust_budget() {
    let b1 = ScriptedBackend::always_fail("backend-1");
    let b2 = ScriptedBackend::always_fail("backend-2");
    let dispatcher = tokio_dispatcher(&[b1.clone(), b2.clone()], settings(2), breaker(10, 60_000));

    let receipt = dispatcher.submit(message(1), None).unwrap();
    let start = tokio::time::Instant::now();
    let outcome = dispatcher.tick().await;

    assert_eq!(
        outcome,
        TickOutcome::Failed {
            id: receipt.id.clone(),
            attempts: 4
        }
    );
    assert_eq!(b1.calls(), 2);
    assert_eq!(b2.calls(), 2);
    // One 100ms backoff per backend; none after a backend's last attempt.
    assert_eq!(start.elapsed(), Duration::from_millis(200));
    assert!(dispatcher.queue().is_empty());
    assert!(dispatcher.message_status(&receipt.id).is_none());
    assert!(dispatcher.status().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failover_to_second_backend() {
    let b1 = ScriptedBackend::always_fail("backend-1");
    let b2 = ScriptedBackend::always_ok("backend-2");
    let dispatcher = tokio_dispatcher(&[b1.clone(), b2.clone()], settings(3), breaker(10, 60_000));

    let receipt = dispatcher.submit(message(1), None).unwrap();
    let outcome = dispatcher.tick().await;

    assert_eq!(
        outcome,
        TickOutcome::Delivered {
            id: receipt.id.clone(),
            backend: "backend-2".into()
        }
    );
    assert_eq!(b1.calls(), 3);
    assert_eq!(b2.calls(), 1);

    let record = dispatcher.message_status(&receipt.id).unwrap();
    assert_eq!(record.status, DeliveryStatus::Sent);
    assert_eq!(record.backend.as_deref(), Some("backend-2"));
    assert_eq!(record.attempts, 1);
    assert_eq!(record.last_error, None);
    assert!(dispatcher.queue().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retry_on_same_backend_recovers() {
    let b1 = ScriptedBackend::scripted("backend-1", vec![false, false]);
    let dispatcher = tokio_dispatcher(&[b1.clone()], settings(3), breaker(10, 60_000));

    let receipt = dispatcher.submit(message(1), None).unwrap();
    let start = tokio::time::Instant::now();
    dispatcher.tick().await;

    // 100ms then 200ms of backoff before the third attempt.
    assert_eq!(start.elapsed(), Duration::from_millis(300));
    let record = dispatcher.message_status(&receipt.id).unwrap();
    assert_eq!(record.status, DeliveryStatus::Sent);
    assert_eq!(record.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_skips_backend_until_reset() {
    let b1 = ScriptedBackend::always_fail("backend-1");
    let b2 = ScriptedBackend::always_ok("backend-2");
    let dispatcher = tokio_dispatcher(&[b1.clone(), b2.clone()], settings(2), breaker(2, 60_000));

    dispatcher.submit(message(1), None).unwrap();
    dispatcher.tick().await;
    assert_eq!(b1.calls(), 2);
    assert_eq!(dispatcher.backend_status()[0].state, CircuitState::Open);

    let second = dispatcher.submit(message(2), None).unwrap();
    dispatcher.tick().await;
    assert_eq!(b1.calls(), 2, "open backend must be skipped");
    let record = dispatcher.message_status(&second.id).unwrap();
    assert_eq!(record.backend.as_deref(), Some("backend-2"));
    assert_eq!(record.attempts, 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    let snapshot = &dispatcher.backend_status()[0];
    assert_eq!(snapshot.name, "backend-1");
    assert_eq!(snapshot.state, CircuitState::HalfOpen);

    dispatcher.submit(message(3), None).unwrap();
    dispatcher.tick().await;
    assert!(b1.calls() > 2, "half-open backend is probed again");
    assert_eq!(dispatcher.backend_status()[0].state, CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_send_timeout_counts_as_failure() {
    let never = ScriptedBackend::gated("backend-1", true, Arc::new(Notify::new()));
    let b2 = ScriptedBackend::always_ok("backend-2");
    let mut config = settings(1);
    config.send_timeout_ms = Some(500);
    let dispatcher = tokio_dispatcher(&[never.clone(), b2.clone()], config, breaker(10, 60_000));

    let receipt = dispatcher.submit(message(1), None).unwrap();
    let start = tokio::time::Instant::now();
    let outcome = dispatcher.tick().await;

    assert!(matches!(outcome, TickOutcome::Delivered { ref backend, .. } if backend == "backend-2"));
    assert_eq!(start.elapsed(), Duration::from_millis(500));
    assert_eq!(dispatcher.backend_status()[0].failures, 1);
    assert_eq!(dispatcher.message_status(&receipt.id).unwrap().status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn test_rate_limit_defers_sixth_admission() {
    let backend = ScriptedBackend::always_ok("backend-1");
    let mut config = settings(1);
    config.rate_limit = RateLimitConfig {
        max: 5,
        window_ms: 60_000,
    };
    let (dispatcher, time) = virtual_dispatcher(&[backend.clone()], config, breaker(3, 60_000));

    for n in 0..6 {
        dispatcher.submit(message(n), None).unwrap();
    }
    for _ in 0..5 {
        assert!(matches!(dispatcher.tick().await, TickOutcome::Delivered { .. }));
    }

    assert_eq!(dispatcher.tick().await, TickOutcome::Deferred(Duration::from_millis(60_000)));
    assert_eq!(dispatcher.queue().len(), 1);
    assert_eq!(time.pending(), 1);

    time.advance(Duration::from_millis(59_999));
    assert_eq!(dispatcher.tick().await, TickOutcome::Deferred(Duration::from_millis(1)));
    // The first resume timer is still pending, so no second one is armed.
    assert_eq!(time.pending(), 1);
    assert_eq!(backend.calls(), 5);

    time.advance(Duration::from_millis(1));
    assert_eq!(time.pending(), 0);
    assert!(matches!(dispatcher.tick().await, TickOutcome::Delivered { .. }));
    assert_eq!(backend.calls(), 6);
    assert!(dispatcher.rate_limit_usage() <= 5);
}

#[tokio::test]
async fn test_duplicate_submissions() {
    let backend = ScriptedBackend::always_ok("backend-1");
    let (dispatcher, _time) = virtual_dispatcher(&[backend.clone()], settings(1), breaker(3, 60_000));

    let first = dispatcher.submit(message(1), Some("order-1")).unwrap();
    let second = dispatcher.submit(message(2), Some("order-1")).unwrap();
    assert_eq!(first.status, SubmitStatus::Queued);
    assert_eq!(second.status, SubmitStatus::Duplicate);
    assert_eq!(first.id, second.id);

    let by_content = dispatcher.submit(message(3), None).unwrap();
    let again = dispatcher.submit(message(3), None).unwrap();
    assert_eq!(by_content.status, SubmitStatus::Queued);
    assert_eq!(again.status, SubmitStatus::Duplicate);
    assert_eq!(by_content.id, again.id);
    assert_eq!(dispatcher.queue().len(), 2);

    dispatcher.tick().await;
    dispatcher.tick().await;
    let after = dispatcher.submit(message(1), Some("order-1")).unwrap();
    assert_eq!(after.status, SubmitStatus::Duplicate);
    assert!(dispatcher.queue().is_empty());
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_remove_queued_item_cancels_it() {
    let backend = ScriptedBackend::always_ok("backend-1");
    let (dispatcher, _time) = virtual_dispatcher(&[backend.clone()], settings(1), breaker(3, 60_000));

    let first = dispatcher.submit(message(1), None).unwrap();
    let second = dispatcher.submit(message(2), None).unwrap();

    assert_eq!(dispatcher.remove_from_queue(&first.id), RemoveOutcome::Cancelled);
    assert!(dispatcher.message_status(&first.id).is_none());
    let queued: Vec<_> = dispatcher.queue().into_iter().map(|e| e.id).collect();
    assert_eq!(queued, vec![second.id.clone()]);

    assert_eq!(
        dispatcher.tick().await,
        TickOutcome::Delivered {
            id: second.id,
            backend: "backend-1".into()
        }
    );
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_remove_racing_tick_start_is_never_sent() {
    let backend = ScriptedBackend::always_ok("backend-1");
    let (dispatcher, clock) = hooked_dispatcher(&[backend.clone()], settings(1), breaker(3, 60_000));

    let first = dispatcher.submit(message(1), None).unwrap();
    let second = dispatcher.submit(message(2), None).unwrap();

    // Remove the head while the tick is reading the clock.
    let outcome = Arc::new(parking_lot::Mutex::new(None));
    let racer = dispatcher.clone();
    let seen = outcome.clone();
    let head = first.id.clone();
    clock.arm(move || {
        *seen.lock() = Some(racer.remove_from_queue(&head));
    });

    let tick = dispatcher.tick().await;
    assert_eq!(*outcome.lock(), Some(RemoveOutcome::Cancelled));
    assert_eq!(
        tick,
        TickOutcome::Delivered {
            id: second.id.clone(),
            backend: "backend-1".into()
        }
    );
    assert_eq!(backend.calls(), 1);
    assert!(dispatcher.message_status(&first.id).is_none());
    assert_eq!(
        dispatcher.message_status(&second.id).unwrap().status,
        DeliveryStatus::Sent
    );

    // A cancelled message is never picked up later either.
    assert_eq!(dispatcher.tick().await, TickOutcome::Idle);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_remove_in_flight_item_still_records_delivery() {
    let gate = Arc::new(Notify::new());
    let backend = ScriptedBackend::gated("backend-1", true, gate.clone());
    let (dispatcher, _time) = virtual_dispatcher(&[backend.clone()], settings(1), breaker(3, 60_000));

    let receipt = dispatcher.submit(message(1), None).unwrap();
    let worker = dispatcher.clone();
    let tick = tokio::spawn(async move { worker.tick().await });
    backend.wait_for_calls(1).await;

    assert_eq!(dispatcher.remove_from_queue(&receipt.id), RemoveOutcome::Detached);
    assert!(dispatcher.queue().is_empty());
    assert!(dispatcher.message_status(&receipt.id).is_some());

    gate.notify_one();
    assert!(matches!(tick.await.unwrap(), TickOutcome::Delivered { .. }));

    let record = dispatcher.message_status(&receipt.id).unwrap();
    assert_eq!(record.status, DeliveryStatus::Sent);
    let again = dispatcher.submit(message(1), None).unwrap();
    assert_eq!(again.status, SubmitStatus::Duplicate);
}

#[tokio::test]
async fn test_remove_in_flight_item_that_fails_drops_record() {
    let gate = Arc::new(Notify::new());
    let backend = ScriptedBackend::gated("backend-1", false, gate.clone());
    let (dispatcher, _time) = virtual_dispatcher(&[backend.clone()], settings(1), breaker(3, 60_000));

    let receipt = dispatcher.submit(message(1), None).unwrap();
    let worker = dispatcher.clone();
    let tick = tokio::spawn(async move { worker.tick().await });
    backend.wait_for_calls(1).await;

    assert_eq!(dispatcher.remove_from_queue(&receipt.id), RemoveOutcome::Detached);
    gate.notify_one();
    assert!(matches!(tick.await.unwrap(), TickOutcome::Failed { attempts: 1, .. }));
    assert!(dispatcher.message_status(&receipt.id).is_none());
}

#[tokio::test]
async fn test_all_breakers_open_consumes_no_rate_limit_slot() {
    let backend = ScriptedBackend::always_fail("backend-1");
    let (dispatcher, _time) = virtual_dispatcher(&[backend.clone()], settings(1), breaker(1, 60_000));

    dispatcher.submit(message(1), None).unwrap();
    assert!(matches!(dispatcher.tick().await, TickOutcome::Failed { attempts: 1, .. }));
    assert_eq!(dispatcher.backend_status()[0].state, CircuitState::Open);
    assert_eq!(dispatcher.rate_limit_usage(), 1);

    let skipped = dispatcher.submit(message(2), None).unwrap();
    assert_eq!(
        dispatcher.tick().await,
        TickOutcome::Failed {
            id: skipped.id,
            attempts: 1
        }
    );
    assert_eq!(backend.calls(), 1);
    assert_eq!(dispatcher.rate_limit_usage(), 1);
}

#[tokio::test]
async fn test_overlapping_tick_is_rejected() {
    let gate = Arc::new(Notify::new());
    let backend = ScriptedBackend::gated("backend-1", true, gate.clone());
    let (dispatcher, _time) = virtual_dispatcher(&[backend.clone()], settings(1), breaker(3, 60_000));

    dispatcher.submit(message(1), None).unwrap();
    dispatcher.submit(message(2), None).unwrap();

    let worker = dispatcher.clone();
    let tick = tokio::spawn(async move { worker.tick().await });
    backend.wait_for_calls(1).await;

    assert_eq!(dispatcher.tick().await, TickOutcome::Busy);
    assert_eq!(backend.calls(), 1);

    gate.notify_one();
    assert!(matches!(tick.await.unwrap(), TickOutcome::Delivered { .. }));
    assert_eq!(dispatcher.queue().len(), 1);
}

#[tokio::test]
async fn test_clear_leaves_in_flight_item() {
    let gate = Arc::new(Notify::new());
    let backend = ScriptedBackend::gated("backend-1", true, gate.clone());
    let (dispatcher, _time) = virtual_dispatcher(&[backend.clone()], settings(1), breaker(3, 60_000));

    let head = dispatcher.submit(message(1), None).unwrap();
    dispatcher.submit(message(2), None).unwrap();
    dispatcher.submit(message(3), None).unwrap();

    let worker = dispatcher.clone();
    let tick = tokio::spawn(async move { worker.tick().await });
    backend.wait_for_calls(1).await;

    assert_eq!(dispatcher.clear_queue(), 2);
    let queued: Vec<_> = dispatcher.queue().into_iter().map(|e| e.id).collect();
    assert_eq!(queued, vec![head.id.clone()]);

    gate.notify_one();
    tick.await.unwrap();
    assert!(dispatcher.queue().is_empty());
    assert_eq!(dispatcher.status().len(), 1);
    assert_eq!(dispatcher.status()[0].id, head.id);
}

#[tokio::test(start_paused = true)]
async fn test_settings_change_applies_to_next_sequence() {
    let b1 = ScriptedBackend::always_fail("backend-1");
    let b2 = ScriptedBackend::always_fail("backend-2");
    let dispatcher = tokio_dispatcher(&[b1.clone(), b2.clone()], settings(3), breaker(10, 60_000));

    let patch = ConfigPatch {
        retry: Some(RetryPatch {
            max_attempts: Some(1),
            ..RetryPatch::default()
        }),
        rate_limit: None,
    };
    let updated = dispatcher.set_config(&patch).unwrap();
    assert_eq!(updated.retry.max_attempts, 1);
    assert_eq!(updated.retry.base_delay_ms, 100);

    dispatcher.submit(message(1), None).unwrap();
    assert!(matches!(dispatcher.tick().await, TickOutcome::Failed { attempts: 2, .. }));
    assert_eq!(b1.calls(), 1);
    assert_eq!(b2.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_stops_run_loop() {
    let backend = ScriptedBackend::always_ok("backend-1");
    let dispatcher = tokio_dispatcher(&[backend.clone()], settings(1), breaker(3, 60_000));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    dispatcher.pause();
    let runner = tokio::spawn(dispatcher.clone().run(Duration::from_secs(1), shutdown_rx));

    let receipt = dispatcher.submit(message(1), None).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.calls(), 0);
    assert_eq!(dispatcher.queue().len(), 1);

    dispatcher.resume();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(backend.calls(), 1);
    assert_eq!(
        dispatcher.message_status(&receipt.id).unwrap().status,
        DeliveryStatus::Sent
    );

    shutdown_tx.send(()).unwrap();
    runner.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_resumes_after_rate_limit_window() {
    let backend = ScriptedBackend::always_ok("backend-1");
    let mut config = settings(1);
    config.rate_limit = RateLimitConfig {
        max: 1,
        window_ms: 10_000,
    };
    let dispatcher = tokio_dispatcher(&[backend.clone()], config, breaker(3, 60_000));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    dispatcher.submit(message(1), None).unwrap();
    dispatcher.submit(message(2), None).unwrap();
    let runner = tokio::spawn(dispatcher.clone().run(Duration::from_secs(1), shutdown_rx));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.calls(), 1);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(backend.calls(), 2);
    assert!(dispatcher.queue().is_empty());

    shutdown_tx.send(()).unwrap();
    runner.await.unwrap();
}

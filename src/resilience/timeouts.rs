//! Deadline enforcement around backend sends.
//!
//! # Design Decisions
//! - The deadline races the send against `Scheduler::sleep`, so it follows injected time
//! - A missed deadline is an ordinary attempt failure (`DeliveryError::Timeout`)

use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use futures_util::future::{self, Either};

use crate::backend::DeliveryError;
use crate::runtime::Scheduler;

/// Await `send`, failing with [`DeliveryError::Timeout`] if `limit` elapses first.
pub async fn with_deadline<F>(
    scheduler: &dyn Scheduler,
    limit: Option<Duration>,
    send: F,
) -> Result<(), DeliveryError>
where
    F: Future<Output = Result<(), DeliveryError>>,
{
    let Some(limit) = limit else {
        return send.await;
    };

    match future::select(pin!(send), scheduler.sleep(limit)).await {
        Either::Left((outcome, _)) => outcome,
        Either::Right(((), _)) => Err(DeliveryError::Timeout(limit)),
    }
}

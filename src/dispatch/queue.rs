//! FIFO delivery queue and status table.
//!
//! Duplicate detection covers every id that is delivered, waiting, or in
//! flight. Ids of failed or cancelled messages may be submitted again.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::dispatch::status::{DeliveryStatus, StatusEvent, StatusRecord};
use crate::dispatch::{Message, MessageId};
use crate::runtime::UnixMillis;

/// Message awaiting delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub id: MessageId,
    pub message: Message,
    pub attempts: u32,
    pub enqueued_at: UnixMillis,
}

/// Queue entry joined with its status record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntryView {
    pub id: MessageId,
    #[serde(flatten)]
    pub message: Message,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: UnixMillis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitStatus {
    Queued,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub status: SubmitStatus,
    pub id: MessageId,
}

/// Result of removing a message from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveOutcome {
    /// Entry and status record deleted; the message will never be attempted.
    Cancelled,
    /// Message is in flight. Its entry is gone but the running sequence
    /// still completes and writes the final status.
    Detached,
    NotFound,
}

#[derive(Debug, Default)]
pub struct DeliveryQueue {
    pending: VecDeque<QueueItem>,
    records: HashMap<MessageId, (u64, StatusRecord)>,
    delivered: HashSet<MessageId>,
    in_flight: Option<MessageId>,
    next_seq: u64,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unless the id is already delivered, waiting, or in flight.
    pub fn submit(&mut self, id: MessageId, message: Message, now: UnixMillis) -> SubmitReceipt {
        if self.is_known(&id) {
            return SubmitReceipt {
                status: SubmitStatus::Duplicate,
                id,
            };
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.records.insert(
            id.clone(),
            (seq, StatusRecord::queued(id.clone(), message.clone(), now)),
        );
        self.pending.push_back(QueueItem {
            id: id.clone(),
            message,
            attempts: 0,
            enqueued_at: now,
        });
        SubmitReceipt {
            status: SubmitStatus::Queued,
            id,
        }
    }

    pub fn is_known(&self, id: &MessageId) -> bool {
        self.delivered.contains(id)
            || self.in_flight.as_ref() == Some(id)
            || self.pending.iter().any(|item| &item.id == id)
    }

    /// Mark the head as the message being attempted and return it.
    ///
    /// From here on `remove` detaches the head instead of cancelling it.
    pub fn begin_head(&mut self) -> Option<QueueItem> {
        let item = self.pending.front().cloned()?;
        self.in_flight = Some(item.id.clone());
        Some(item)
    }

    /// Apply `event` to the status record of `id`, if one exists.
    pub fn record(&mut self, id: &MessageId, event: &StatusEvent) -> Option<&StatusRecord> {
        let (_, record) = self.records.get_mut(id)?;
        *record = record.clone().apply(event);
        if let Some(item) = self.pending.iter_mut().find(|item| &item.id == id) {
            item.attempts = record.attempts;
        }
        Some(record)
    }

    /// Finish the in-flight sequence for `id`.
    ///
    /// Pops the entry if still queued. Delivered ids are remembered forever;
    /// failed ids lose their status record.
    pub fn complete(&mut self, id: &MessageId, delivered: bool) {
        if let Some(pos) = self.pending.iter().position(|item| &item.id == id) {
            self.pending.remove(pos);
        }
        if self.in_flight.as_ref() == Some(id) {
            self.in_flight = None;
        }
        if delivered {
            self.delivered.insert(id.clone());
        } else {
            self.records.remove(id);
        }
    }

    /// Cancel a waiting message, or detach the in-flight one.
    pub fn remove(&mut self, id: &MessageId) -> RemoveOutcome {
        let Some(pos) = self.pending.iter().position(|item| &item.id == id) else {
            return RemoveOutcome::NotFound;
        };
        self.pending.remove(pos);

        if self.in_flight.as_ref() == Some(id) {
            return RemoveOutcome::Detached;
        }
        let queued = self
            .records
            .get(id)
            .is_some_and(|(_, record)| record.status == DeliveryStatus::Queued);
        if queued {
            self.records.remove(id);
        }
        RemoveOutcome::Cancelled
    }

    /// Drop every waiting message still in `queued` status.
    ///
    /// The in-flight message and anything `retrying` stay. Returns the number
    /// of messages removed.
    pub fn clear(&mut self) -> usize {
        let before = self.pending.len();
        let records = &mut self.records;
        let in_flight = self.in_flight.as_ref();
        self.pending.retain(|item| {
            if in_flight == Some(&item.id) {
                return true;
            }
            let queued = records
                .get(&item.id)
                .map_or(true, |(_, record)| record.status == DeliveryStatus::Queued);
            if queued {
                records.remove(&item.id);
            }
            !queued
        });
        before - self.pending.len()
    }

    pub fn get(&self, id: &MessageId) -> Option<&StatusRecord> {
        self.records.get(id).map(|(_, record)| record)
    }

    /// Every status record, oldest submission first.
    pub fn status(&self) -> Vec<StatusRecord> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by_key(|(seq, _)| *seq);
        records.into_iter().map(|(_, record)| record.clone()).collect()
    }

    /// Waiting messages in queue order, joined with their status.
    pub fn queue_view(&self) -> Vec<QueueEntryView> {
        self.pending
            .iter()
            .map(|item| {
                let record = self.get(&item.id);
                QueueEntryView {
                    id: item.id.clone(),
                    message: item.message.clone(),
                    status: record.map_or(DeliveryStatus::Queued, |r| r.status),
                    attempts: item.attempts,
                    last_error: record.and_then(|r| r.last_error.clone()),
                    enqueued_at: item.enqueued_at,
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

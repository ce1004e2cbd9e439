//! Stream entry and state types
//!
//! This module defines the per-stream state stored in the registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;

use super::mailbox::{MailboxId, MailboxSender, PushOutcome};

/// Lifecycle state of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No deletion pending
    Active,
    /// Last subscriber left, deletion scheduled unless someone re-subscribes
    GracePeriod,
    /// Pre-created stream waiting for its first subscriber
    Temporary,
}

/// Entry for a single stream in the registry
pub struct StreamEntry {
    /// Current subscribers
    members: HashMap<MailboxId, MailboxSender>,

    /// Payloads handed to `publish` while this stream existed
    published: AtomicU64,

    /// Per-subscriber deliveries rejected because a mailbox was full
    dropped: AtomicU64,

    /// When the stream was created
    pub created_at: Instant,
}

impl StreamEntry {
    pub(super) fn new() -> Self {
        Self {
            members: HashMap::new(),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    /// Get the number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.members.len()
    }

    /// Whether the stream has no subscribers
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(super) fn add(&mut self, sender: MailboxSender) {
        self.members.insert(sender.id(), sender);
    }

    pub(super) fn remove(&mut self, id: MailboxId) -> Option<MailboxSender> {
        self.members.remove(&id)
    }

    /// Close and drop every member mailbox
    ///
    /// Returns the number of mailboxes that were open.
    pub(super) fn close_all(&mut self) -> usize {
        self.members
            .drain()
            .filter(|(_, sender)| sender.close())
            .count()
    }

    /// Offer a payload to every member without blocking
    ///
    /// Only needs shared access: mailboxes synchronize internally and
    /// membership is not touched. Returns how many mailboxes accepted it.
    pub(super) fn fan_out(&self, payload: &Bytes) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut accepted = 0;
        for (id, sender) in &self.members {
            match sender.try_push(payload.clone()) {
                PushOutcome::Accepted => accepted += 1,
                PushOutcome::Full => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(mailbox = %id, "Mailbox full, payload dropped");
                }
                PushOutcome::Closed => {
                    tracing::trace!(mailbox = %id, "Mailbox closed, payload dropped");
                }
            }
        }
        accepted
    }

    pub(super) fn stats(&self, state: StreamState) -> StreamStats {
        StreamStats {
            subscriber_count: self.subscriber_count(),
            state,
            age: self.created_at.elapsed(),
            messages_published: self.published.load(Ordering::Relaxed),
            messages_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for a stream
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Number of active subscribers
    pub subscriber_count: usize,
    /// Lifecycle state
    pub state: StreamState,
    /// Time since the stream was created
    pub age: Duration,
    /// Payloads published to the stream
    pub messages_published: u64,
    /// Deliveries dropped because a subscriber's mailbox was full
    pub messages_dropped: u64,
}

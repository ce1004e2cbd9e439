//! Stream registry implementation
//!
//! The central registry that maps stream names to their subscribers, routes
//! published payloads, and schedules deletion of streams nobody listens to.
//!
//! # Lifecycle
//!
//! ```text
//!  {absent} ──subscribe──────────────► {active}
//!     │                                 │   ▲
//!     └─create_temporary_stream─┐       │   │ subscribe (timer cancelled)
//!                               ▼       ▼   │
//!                          {timer armed} ◄──┘ last unsubscribe
//!                               │
//!                               └──timer fires, still empty──► {absent}
//! ```
//!
//! Both maps (streams and pending timers) sit behind one `RwLock`, so a timer
//! that fires always sees current membership before it deletes anything.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::config::RegistryConfig;
use super::entry::{StreamEntry, StreamState, StreamStats};
use super::error::RegistryError;
use super::mailbox::{mailbox, Mailbox, MailboxId};

/// Central registry for all streams
///
/// Cheap to clone; all clones share the same state. Create one at startup and
/// hand clones to every producer and consumer that needs it.
#[derive(Clone)]
pub struct StreamRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    state: RwLock<RegistryState>,
    config: RegistryConfig,
    next_mailbox_id: AtomicU64,
    next_generation: AtomicU64,
}

#[derive(Default)]
struct RegistryState {
    streams: HashMap<String, StreamEntry>,
    timers: HashMap<String, PendingDeletion>,
}

/// A scheduled deletion for one stream
struct PendingDeletion {
    /// `GracePeriod` or `Temporary`
    kind: StreamState,
    /// Distinguishes this timer from earlier ones armed for the same name
    generation: u64,
    handle: JoinHandle<()>,
}

impl RegistryState {
    fn state_of(&self, name: &str) -> StreamState {
        self.timers
            .get(name)
            .map_or(StreamState::Active, |pending| pending.kind)
    }

    fn cancel_timer(&mut self, name: &str) -> Option<StreamState> {
        let pending = self.timers.remove(name)?;
        pending.handle.abort();
        Some(pending.kind)
    }
}

impl StreamRegistry {
    /// Create a new stream registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(RegistryState::default()),
                config,
                next_mailbox_id: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Subscribe to a stream
    ///
    /// Creates the stream if it does not exist and cancels any pending
    /// deletion for it. Fails only when the mailbox cannot be allocated or the
    /// stream is at its subscriber limit.
    pub async fn subscribe(&self, name: &str) -> Result<Mailbox, RegistryError> {
        let id = MailboxId::new(self.inner.next_mailbox_id.fetch_add(1, Ordering::Relaxed));
        let (sender, mailbox) = mailbox(id, self.inner.config.mailbox_capacity).map_err(|_| {
            RegistryError::Allocation {
                stream: name.to_owned(),
            }
        })?;

        let mut state = self.inner.state.write().await;

        let limit = self.inner.config.max_subscribers_per_stream;
        if limit > 0 {
            if let Some(entry) = state.streams.get(name) {
                if entry.subscriber_count() >= limit {
                    tracing::warn!(
                        stream = %name,
                        limit = limit,
                        "Subscriber rejected: limit reached"
                    );
                    return Err(RegistryError::SubscriberLimit {
                        stream: name.to_owned(),
                        limit,
                    });
                }
            }
        }

        if let Some(kind) = state.cancel_timer(name) {
            tracing::debug!(stream = %name, cancelled = ?kind, "Pending deletion cancelled");
        }

        let entry = state
            .streams
            .entry(name.to_owned())
            .or_insert_with(StreamEntry::new);
        entry.add(sender);

        tracing::info!(
            stream = %name,
            mailbox = %id,
            subscribers = entry.subscriber_count(),
            "Subscriber added"
        );

        Ok(mailbox)
    }

    /// Unsubscribe a mailbox from a stream
    ///
    /// Closes the mailbox. Unknown streams or mailboxes are ignored, so calling
    /// this twice is harmless. When the last subscriber leaves, the stream is
    /// kept for the configured grace period. Returns whether the mailbox was a
    /// member.
    pub async fn unsubscribe(&self, name: &str, mailbox: &Mailbox) -> bool {
        self.unsubscribe_id(name, mailbox.id()).await
    }

    /// Unsubscribe by mailbox id
    ///
    /// Same as [`unsubscribe`](Self::unsubscribe), for callers that only kept
    /// the id (e.g. a drop guard that cannot borrow the mailbox).
    pub async fn unsubscribe_id(&self, name: &str, id: MailboxId) -> bool {
        let mut state = self.inner.state.write().await;

        let Some(entry) = state.streams.get_mut(name) else {
            return false;
        };
        let Some(sender) = entry.remove(id) else {
            return false;
        };
        sender.close();

        let remaining = entry.subscriber_count();
        tracing::debug!(
            stream = %name,
            mailbox = %id,
            subscribers = remaining,
            "Subscriber removed"
        );

        if remaining == 0 {
            let grace = self.inner.config.grace_period;
            self.arm_timer(&mut state, name, grace, StreamState::GracePeriod);
            tracing::info!(
                stream = %name,
                grace_period_secs = grace.as_secs(),
                "Last subscriber left, entering grace period"
            );
        }

        true
    }

    /// Publish a payload to every subscriber of a stream
    ///
    /// Never blocks. The payload is copied once, so the caller may reuse its
    /// buffer. Subscribers whose mailbox is full miss this payload. Returns
    /// `true` if at least one subscriber accepted it, `false` if the stream does
    /// not exist or nobody took it.
    pub async fn publish(&self, name: &str, payload: &[u8]) -> bool {
        self.publish_bytes(name, Bytes::copy_from_slice(payload)).await
    }

    /// Publish an already owned payload
    ///
    /// `Bytes` is immutable, so no copy is made; subscribers share the buffer.
    pub async fn publish_bytes(&self, name: &str, payload: Bytes) -> bool {
        let state = self.inner.state.read().await;

        match state.streams.get(name) {
            Some(entry) => entry.fan_out(&payload) > 0,
            None => false,
        }
    }

    /// Create a stream that expires after `ttl` unless someone subscribes first
    ///
    /// Lets a producer start publishing before its consumer connects. Does
    /// nothing if the stream already exists. Returns whether it was created.
    pub async fn create_temporary_stream(&self, name: &str, ttl: Duration) -> bool {
        let mut state = self.inner.state.write().await;

        if state.streams.contains_key(name) {
            tracing::debug!(stream = %name, "Stream already exists, skipping creation");
            return false;
        }

        state.streams.insert(name.to_owned(), StreamEntry::new());
        self.arm_timer(&mut state, name, ttl, StreamState::Temporary);

        tracing::info!(
            stream = %name,
            ttl_secs = ttl.as_secs(),
            "Temporary stream created"
        );

        true
    }

    /// Close every subscriber of a stream and remove it immediately
    ///
    /// Bypasses the grace period. Returns whether the stream existed.
    pub async fn close_stream(&self, name: &str) -> bool {
        let mut state = self.inner.state.write().await;

        state.cancel_timer(name);
        let Some(mut entry) = state.streams.remove(name) else {
            return false;
        };
        let closed = entry.close_all();

        tracing::info!(stream = %name, closed = closed, "Stream closed");
        true
    }

    /// Check if a stream exists (including streams in grace period)
    pub async fn exists(&self, name: &str) -> bool {
        self.inner.state.read().await.streams.contains_key(name)
    }

    /// Names of all current streams, in no particular order
    pub async fn list_streams(&self) -> Vec<String> {
        self.inner.state.read().await.streams.keys().cloned().collect()
    }

    /// Number of subscribers of a stream (0 if it does not exist)
    pub async fn subscriber_count(&self, name: &str) -> usize {
        self.inner
            .state
            .read()
            .await
            .streams
            .get(name)
            .map_or(0, StreamEntry::subscriber_count)
    }

    /// Get stream statistics
    pub async fn stream_stats(&self, name: &str) -> Option<StreamStats> {
        let state = self.inner.state.read().await;
        let entry = state.streams.get(name)?;
        Some(entry.stats(state.state_of(name)))
    }

    /// Get total number of streams
    pub async fn stream_count(&self) -> usize {
        self.inner.state.read().await.streams.len()
    }

    /// Close every stream and cancel every pending deletion
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.write().await;

        for (_, pending) in state.timers.drain() {
            pending.handle.abort();
        }
        let streams = state.streams.len();
        for (_, mut entry) in state.streams.drain() {
            entry.close_all();
        }

        tracing::info!(streams = streams, "Registry shut down");
    }

    /// Schedule deletion of an empty stream
    ///
    /// Must be called with the write lock held. Replaces any timer already
    /// armed for the name.
    fn arm_timer(&self, state: &mut RegistryState, name: &str, delay: Duration, kind: StreamState) {
        state.cancel_timer(name);

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let registry: Weak<Inner> = Arc::downgrade(&self.inner);
        let stream = name.to_owned();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = registry.upgrade() {
                StreamRegistry { inner }.expire(&stream, generation).await;
            }
        });

        state.timers.insert(
            name.to_owned(),
            PendingDeletion {
                kind,
                generation,
                handle,
            },
        );
    }

    /// Timer callback: delete the stream if the timer is still current and
    /// nobody subscribed in the meantime
    async fn expire(&self, name: &str, generation: u64) {
        let mut state = self.inner.state.write().await;

        let kind = match state.timers.get(name) {
            Some(pending) if pending.generation == generation => pending.kind,
            // Cancelled or superseded while we waited for the lock
            _ => return,
        };
        state.timers.remove(name);

        if !state.streams.get(name).is_some_and(StreamEntry::is_empty) {
            return;
        }
        state.streams.remove(name);

        match kind {
            StreamState::Temporary => {
                tracing::info!(stream = %name, "Temporary stream expired without subscribers")
            }
            _ => tracing::info!(stream = %name, "Inactive stream deleted"),
        }
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

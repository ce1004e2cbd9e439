//! Bounded per-subscriber mailbox
//!
//! A mailbox is a fixed-capacity FIFO of payloads with a non-blocking
//! `try_push` on the registry side and an async `recv` on the consumer side.
//! When the queue is full new payloads are rejected; queued payloads are never
//! evicted to make room.
//!
//! ```text
//!   StreamRegistry::publish()
//!          │ try_push (never blocks)
//!          ▼
//!   ┌──────────────────────────┐
//!   │ VecDeque<Bytes> (cap N)  │──► Notify ──► Mailbox::recv().await
//!   └──────────────────────────┘
//! ```

use std::collections::{TryReserveError, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::Notify;

/// Opaque handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MailboxId(u64);

impl MailboxId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw numeric value of the id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mb-{}", self.0)
    }
}

/// Outcome of a non-blocking enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Payload was queued
    Accepted,
    /// Queue was at capacity, payload dropped
    Full,
    /// Mailbox was closed, payload dropped
    Closed,
}

struct Slots {
    queue: VecDeque<Bytes>,
    capacity: usize,
    closed: bool,
}

struct Shared {
    slots: Mutex<Slots>,
    notify: Notify,
}

impl Shared {
    // A panic while holding the lock cannot leave `Slots` half-updated,
    // so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Allocate a mailbox pair with room for `capacity` payloads
///
/// The queue storage is reserved up front so that later pushes never
/// allocate.
pub(crate) fn mailbox(
    id: MailboxId,
    capacity: usize,
) -> Result<(MailboxSender, Mailbox), TryReserveError> {
    let mut queue = VecDeque::new();
    queue.try_reserve_exact(capacity)?;

    let shared = Arc::new(Shared {
        slots: Mutex::new(Slots {
            queue,
            capacity,
            closed: false,
        }),
        notify: Notify::new(),
    });

    Ok((
        MailboxSender {
            id,
            shared: Arc::clone(&shared),
        },
        Mailbox { id, shared },
    ))
}

/// Registry-side handle used for fan-out and closing
pub(crate) struct MailboxSender {
    id: MailboxId,
    shared: Arc<Shared>,
}

impl MailboxSender {
    pub(crate) fn id(&self) -> MailboxId {
        self.id
    }

    /// Enqueue without blocking
    pub(crate) fn try_push(&self, payload: Bytes) -> PushOutcome {
        {
            let mut slots = self.shared.lock();
            if slots.closed {
                return PushOutcome::Closed;
            }
            if slots.queue.len() >= slots.capacity {
                return PushOutcome::Full;
            }
            slots.queue.push_back(payload);
        }
        self.shared.notify.notify_one();
        PushOutcome::Accepted
    }

    /// Close the mailbox
    ///
    /// Returns `false` if it was already closed.
    pub(crate) fn close(&self) -> bool {
        {
            let mut slots = self.shared.lock();
            if slots.closed {
                return false;
            }
            slots.closed = true;
        }
        // Wake every pending `recv`, and leave a permit for one that has not
        // registered yet
        self.shared.notify.notify_waiters();
        self.shared.notify.notify_one();
        true
    }
}

/// Consumer-side end of a subscription
///
/// Payloads still queued when the mailbox is closed are delivered before
/// `recv` reports closure.
pub struct Mailbox {
    id: MailboxId,
    shared: Arc<Shared>,
}

impl Mailbox {
    /// Subscription handle
    pub fn id(&self) -> MailboxId {
        self.id
    }

    /// Receive the next payload
    ///
    /// Returns `None` once the mailbox is closed and drained. Cancel safe: a
    /// payload is only removed from the queue when it is returned.
    pub async fn recv(&self) -> Option<Bytes> {
        loop {
            {
                let mut slots = self.shared.lock();
                if let Some(payload) = slots.queue.pop_front() {
                    return Some(payload);
                }
                if slots.closed {
                    return None;
                }
            }
            self.shared.notify.notified().await;
        }
    }

    /// Receive a payload if one is queued
    pub fn try_recv(&self) -> Option<Bytes> {
        self.shared.lock().queue.pop_front()
    }

    /// Number of payloads waiting
    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Whether no payloads are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of payloads the mailbox holds
    pub fn capacity(&self) -> usize {
        self.shared.lock().capacity
    }

    /// Whether the registry closed this mailbox
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("id", &self.id)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

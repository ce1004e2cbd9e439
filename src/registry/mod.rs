//! Stream registry for pub/sub routing
//!
//! The registry manages named streams and routes payloads from a producer to
//! every subscriber of that stream. Each subscriber owns a bounded mailbox;
//! publishing never waits for a slow subscriber, it skips it.
//!
//! # Architecture
//!
//! ```text
//!                          StreamRegistry (Clone)
//!                     ┌──────────────────────────────┐
//!                     │ RwLock<{                     │
//!                     │   streams: name → StreamEntry│
//!                     │   timers:  name → deletion   │
//!                     │ }>                           │
//!                     └──────────────┬───────────────┘
//!                                    │
//!         ┌──────────────────────────┼──────────────────────────┐
//!         │                          │                          │
//!         ▼                          ▼                          ▼
//!     [Producer]               [Subscriber]               [Subscriber]
//!     publish()                mailbox.recv()             mailbox.recv()
//!         │                          │                          │
//!         └──► try_push per mailbox ─┴──► SSE frame ──► writer ─┘
//! ```
//!
//! # Zero-Copy Fan-out
//!
//! `publish` copies the caller's slice into a `bytes::Bytes` once. Every
//! mailbox then holds a reference-counted handle to that same allocation.

pub mod config;
pub mod entry;
pub mod error;
pub mod mailbox;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{StreamState, StreamStats};
pub use error::RegistryError;
pub use mailbox::{Mailbox, MailboxId};
pub use store::StreamRegistry;

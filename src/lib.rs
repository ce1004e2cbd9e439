//! In-process event-stream broker for Server-Sent Events
//!
//! A background job publishes progress events to a named stream; any number
//! of SSE connections subscribe to that stream and receive the events live.
//!
//! ```text
//!   job ──► ProgressPublisher ──► StreamRegistry ──► Mailbox ──► SseConsumer ──► client
//! ```
//!
//! - Publishing never blocks: each subscriber has a bounded mailbox and a full
//!   mailbox simply misses the event.
//! - A stream whose last subscriber leaves is kept for a grace period so a
//!   reconnecting client finds it again.
//! - Temporary streams can be created before any subscriber exists; they
//!   expire if nobody claims them.
//!
//! There is no global registry. Create a [`StreamRegistry`] at startup and
//! clone it into whatever needs it.
//!
//! # Example
//!
//! ```no_run
//! use sse_relay::registry::StreamRegistry;
//! use sse_relay::sse::{EventKind, EventMessage, ProgressPublisher};
//!
//! # async fn demo() -> sse_relay::Result<()> {
//! let registry = StreamRegistry::new();
//! let mailbox = registry.subscribe("job-42").await?;
//!
//! let publisher = ProgressPublisher::new(registry.clone(), "job-42");
//! publisher
//!     .send(&EventMessage::progress(EventKind::AnalyzingFace, "Analyzing face", 50))
//!     .await?;
//!
//! let frame = mailbox.recv().await;
//! registry.unsubscribe("job-42", &mailbox).await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod registry;
pub mod sse;

pub use error::{Error, Result};
pub use registry::{Mailbox, RegistryConfig, RegistryError, StreamRegistry};
pub use sse::{EventKind, EventMessage, SseConfig};

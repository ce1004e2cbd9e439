//! Registry error types
//!
//! Absence of a stream is never an error; only resource exhaustion during
//! `subscribe` is surfaced to the caller.

use thiserror::Error;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The mailbox queue could not be allocated
    #[error("failed to allocate mailbox for stream {stream}")]
    Allocation { stream: String },

    /// The stream already has the configured maximum of subscribers
    #[error("stream {stream} reached its subscriber limit of {limit}")]
    SubscriberLimit { stream: String, limit: usize },
}

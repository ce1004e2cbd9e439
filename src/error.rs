//! Crate error type

use thiserror::Error;

use crate::registry::RegistryError;

/// Errors surfaced by the SSE adapters
#[derive(Debug, Error)]
pub enum Error {
    /// Subscribing failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Writing to the client failed
    #[error("write to client failed: {0}")]
    Io(#[from] std::io::Error),

    /// An event could not be serialized
    #[error("failed to encode event: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

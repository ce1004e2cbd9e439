//! SSE adapters around the stream registry
//!
//! - `frame`: wire framing, handshake and heartbeat frames
//! - `message`: the JSON progress event envelope
//! - `consumer`: forwards one stream to one client writer
//! - `producer`: publishes job progress, optionally mirrored onto a pipe

pub mod config;
pub mod consumer;
pub mod frame;
pub mod message;
pub mod producer;

pub use config::SseConfig;
pub use consumer::{ConsumerExit, SseConsumer};
pub use message::{EventKind, EventMessage};
pub use producer::{spawn_piped_job, PipedJob, ProgressPublisher};

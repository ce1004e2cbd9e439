//! Adapter configuration

use std::time::Duration;

/// Configuration for the producer and consumer adapters
#[derive(Debug, Clone)]
pub struct SseConfig {
    /// Heartbeat interval on a subscribed SSE connection
    pub heartbeat_interval: Duration,

    /// Heartbeat interval on a piped job response
    pub pipe_heartbeat_interval: Duration,

    /// Lifetime of the temporary stream created for a piped job
    pub temporary_stream_ttl: Duration,

    /// Buffer size of the in-memory pipe between a piped job and its response
    pub pipe_buffer_size: usize,

    /// Frames queued for the response pipe before new ones are dropped
    pub mirror_capacity: usize,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            pipe_heartbeat_interval: Duration::from_secs(5),
            temporary_stream_ttl: Duration::from_secs(120),
            pipe_buffer_size: 64 * 1024, // 64KB
            mirror_capacity: 64,
        }
    }
}

impl SseConfig {
    /// Set the subscriber heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the piped response heartbeat interval
    pub fn pipe_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.pipe_heartbeat_interval = interval;
        self
    }

    /// Set the temporary stream lifetime
    pub fn temporary_stream_ttl(mut self, ttl: Duration) -> Self {
        self.temporary_stream_ttl = ttl;
        self
    }

    /// Set the pipe buffer size
    pub fn pipe_buffer_size(mut self, size: usize) -> Self {
        self.pipe_buffer_size = size.max(1);
        self
    }

    /// Set the mirror queue capacity (minimum 1)
    pub fn mirror_capacity(mut self, capacity: usize) -> Self {
        self.mirror_capacity = capacity.max(1);
        self
    }
}

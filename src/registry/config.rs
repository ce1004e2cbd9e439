//! Registry configuration

use std::time::Duration;

/// Default number of pending payloads a mailbox can hold
pub const DEFAULT_MAILBOX_CAPACITY: usize = 10;

/// Default delay between a stream losing its last subscriber and its deletion
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(120);

/// Configuration for the stream registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of each subscriber mailbox (minimum 1)
    pub mailbox_capacity: usize,

    /// How long an empty stream is kept around for reconnecting subscribers
    pub grace_period: Duration,

    /// Maximum subscribers per stream (0 = unlimited)
    pub max_subscribers_per_stream: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            grace_period: DEFAULT_GRACE_PERIOD,
            max_subscribers_per_stream: 0, // Unlimited
        }
    }
}

impl RegistryConfig {
    /// Set the mailbox capacity
    ///
    /// A zero capacity is clamped to 1.
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }

    /// Set the grace period applied after the last unsubscribe
    pub fn grace_period(mut self, period: Duration) -> Self {
        self.grace_period = period;
        self
    }

    /// Set the per-stream subscriber limit
    pub fn max_subscribers_per_stream(mut self, max: usize) -> Self {
        self.max_subscribers_per_stream = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.mailbox_capacity, 10);
        assert_eq!(config.grace_period, Duration::from_secs(120));
        assert_eq!(config.max_subscribers_per_stream, 0);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let config = RegistryConfig::default().mailbox_capacity(0);
        assert_eq!(config.mailbox_capacity, 1);
    }
}

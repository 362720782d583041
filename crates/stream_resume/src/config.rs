use std::time::Duration;

use chat_core::Config;

/// Configuration for the resumable stream client.
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// Fixed delay between two resume calls of one session.
    pub poll_interval: Duration,
    /// Capacity of the update broadcast channel.
    pub update_capacity: usize,
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            update_capacity: 256,
        }
    }
}

impl From<&Config> for StreamClientConfig {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            ..Self::default()
        }
    }
}

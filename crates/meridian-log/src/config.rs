//! Consumer and broker configuration.

use std::time::Duration;

/// Default number of handler attempts before a record is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Configuration for one consumer role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Consumer group; each role uses its own.
    pub group_id: String,
    /// Topics the role subscribes to.
    pub topics: Vec<String>,
    /// Topic that receives records which cannot be processed.
    pub dead_letter_topic: String,
    /// Handler attempts per record before it is dead-lettered.
    pub max_attempts: u32,
    /// How long one poll waits for a record.
    pub poll_timeout: Duration,
    /// Pause after a poll failure, and the first pause after a handler
    /// failure. Later handler failures double it.
    pub error_backoff: Duration,
    /// Upper bound on the pause after a handler failure.
    pub max_backoff: Duration,
}

impl ConsumerConfig {
    /// Creates a configuration with default limits.
    #[must_use]
    pub fn new(
        group_id: impl Into<String>,
        topics: Vec<String>,
        dead_letter_topic: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            topics,
            dead_letter_topic: dead_letter_topic.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_timeout: Duration::from_millis(500),
            error_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }

    /// Sets the attempt limit; values below one are raised to one.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    #[must_use]
    pub fn with_error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = error_backoff;
        self
    }

    #[must_use]
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Pause before redelivery after the `attempt`-th handler failure:
    /// `error_backoff * 2^(attempt - 1)`, capped at `max_backoff`.
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.error_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Broker connection settings for the Kafka adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    /// Comma-separated `host:port` list.
    pub bootstrap_servers: String,
    /// Client id reported to the brokers.
    pub client_id: String,
    /// Upper bound on how long a send waits in the producer queue.
    pub send_timeout: Duration,
}

impl KafkaConfig {
    #[must_use]
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            client_id: "meridian-worker".to_owned(),
            send_timeout: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_config_defaults() {
        let config = ConsumerConfig::new("indexing", vec!["a".into()], "dlq");

        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.poll_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_max_attempts_is_at_least_one() {
        let config = ConsumerConfig::new("indexing", vec![], "dlq").with_max_attempts(0);

        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn test_retry_delay_doubles_up_to_cap() {
        let config = ConsumerConfig::new("indexing", vec![], "dlq")
            .with_error_backoff(Duration::from_millis(100))
            .with_max_backoff(Duration::from_millis(500));

        let delays: Vec<u128> = (1..=5).map(|n| config.retry_delay(n).as_millis()).collect();

        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
        assert_eq!(config.retry_delay(0).as_millis(), 100);
        assert_eq!(config.retry_delay(u32::MAX), Duration::from_millis(500));
    }
}

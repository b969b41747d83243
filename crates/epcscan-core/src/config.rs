//! Session configuration.

use std::time::Duration;

use epcscan_types::SingulationSession;

use crate::error::Result;
use crate::retry::RetryConfig;

/// Configuration for a reader session.
///
/// Use the builder for convenient construction:
///
/// ```
/// use std::time::Duration;
/// use epcscan_core::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .dedup_window(Duration::from_secs(3))
///     .poll_interval(Duration::from_millis(200))
///     .build();
/// assert_eq!(config.drain_batch, 100);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Suppression window for repeat observations of one tag id.
    /// Default: 2 seconds.
    pub dedup_window: Duration,
    /// Fixed interval of the buffer poller. Default: 300 ms.
    pub poll_interval: Duration,
    /// Maximum tags pulled from the reader buffer per drain.
    /// Default: 100.
    pub drain_batch: usize,
    /// Cap on the reader's internal tag-storage buffer, bounding memory
    /// on the device side. Default: 1000.
    pub tag_storage_limit: u32,
    /// Transmit power index applied when the capability query fails.
    /// The right value is hardware-dependent; 30 suits common handheld
    /// readers. Default: 30.
    pub fallback_power_index: u16,
    /// Singulation session applied to every antenna. Default: S0.
    pub singulation_session: SingulationSession,
    /// Connection retry policy.
    pub retry: RetryConfig,
    /// Capacity of the control-command queue.
    pub command_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(300),
            drain_batch: 100,
            tag_storage_limit: 1000,
            fallback_power_index: 30,
            singulation_session: SingulationSession::S0,
            retry: RetryConfig::for_connect(),
            command_queue_capacity: 16,
        }
    }
}

impl SessionConfig {
    /// Create a builder with defaults.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        use crate::error::Error;

        if self.dedup_window.is_zero() {
            return Err(Error::invalid_config("dedup_window must be > 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::invalid_config("poll_interval must be > 0"));
        }
        if self.drain_batch == 0 {
            return Err(Error::invalid_config("drain_batch must be > 0"));
        }
        if self.tag_storage_limit == 0 {
            return Err(Error::invalid_config("tag_storage_limit must be > 0"));
        }
        if self.command_queue_capacity == 0 {
            return Err(Error::invalid_config("command_queue_capacity must be > 0"));
        }
        Ok(())
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set the dedup window.
    #[must_use]
    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.config.dedup_window = window;
        self
    }

    /// Set the poller interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the per-drain batch size.
    #[must_use]
    pub fn drain_batch(mut self, batch: usize) -> Self {
        self.config.drain_batch = batch;
        self
    }

    /// Set the reader-side tag storage cap.
    #[must_use]
    pub fn tag_storage_limit(mut self, limit: u32) -> Self {
        self.config.tag_storage_limit = limit;
        self
    }

    /// Set the fallback transmit power index.
    #[must_use]
    pub fn fallback_power_index(mut self, index: u16) -> Self {
        self.config.fallback_power_index = index;
        self
    }

    /// Set the singulation session.
    #[must_use]
    pub fn singulation_session(mut self, session: SingulationSession) -> Self {
        self.config.singulation_session = session;
        self
    }

    /// Set the connection retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.dedup_window, Duration::from_millis(2000));
        assert_eq!(config.poll_interval, Duration::from_millis(300));
        assert_eq!(config.drain_batch, 100);
        assert_eq!(config.tag_storage_limit, 1000);
        assert_eq!(config.fallback_power_index, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_partial() {
        let config = SessionConfig::builder()
            .drain_batch(50)
            .fallback_power_index(20)
            .build();
        assert_eq!(config.drain_batch, 50);
        assert_eq!(config.fallback_power_index, 20);
        assert_eq!(config.poll_interval, Duration::from_millis(300)); // default
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = SessionConfig::builder()
            .poll_interval(Duration::ZERO)
            .build();
        assert!(config.validate().is_err());

        let config = SessionConfig::builder().drain_batch(0).build();
        assert!(config.validate().is_err());

        let config = SessionConfig::builder()
            .dedup_window(Duration::ZERO)
            .build();
        assert!(config.validate().is_err());
    }
}

//! Connection retry with exponential backoff.
//!
//! A reader that was just docked or is waking from low power routinely
//! rejects the first connect. Retry is an explicit counted loop over a
//! result type, not control flow via errors: each failed attempt sleeps,
//! doubles the delay, and the final failure is returned as
//! [`Error::ConnectionFailed`] carrying the attempt count and the last
//! reason. Cancellation during a backoff sleep surfaces the in-flight
//! connection error rather than silently retrying or succeeding.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use epcscan_types::ReaderDevice;

use crate::driver::ReaderHandle;
use crate::error::{ConnectFailureReason, Error, Result};

/// Configuration for connection retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of connection attempts (including the first).
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound for the backoff delay.
    pub max_delay: Duration,
    /// Backoff multiplier (2.0 = double after each failure).
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::for_connect()
    }
}

impl RetryConfig {
    /// Retry settings for reader connection: 3 attempts with delays of
    /// 500 ms and 1000 ms between them.
    pub fn for_connect() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::for_connect()
        }
    }

    /// Set the total number of attempts.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the initial delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay to sleep after the given failed attempt (1-based).
    fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            capped * (1.0 + rand::rng().random::<f64>() * 0.25)
        } else {
            capped
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Connect a reader handle, retrying per `config`.
///
/// Returns `Ok(())` on the first successful attempt. After the final
/// failed attempt the error is returned immediately, with no trailing
/// sleep. If `cancel` fires during a backoff sleep, the error from the
/// attempt already in flight is returned.
pub async fn connect_with_retry(
    reader: &Arc<dyn ReaderHandle>,
    device: &ReaderDevice,
    config: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let max_attempts = config.max_attempts.max(1);
    let mut last_reason = ConnectFailureReason::Other("no attempt made".to_string());

    for attempt in 1..=max_attempts {
        debug!(
            "connection attempt {}/{} to {}",
            attempt, max_attempts, device.name
        );

        match reader.connect().await {
            Ok(()) => {
                if attempt > 1 {
                    debug!("connected to {} after {} attempts", device.name, attempt);
                }
                return Ok(());
            }
            Err(e) => {
                warn!("connection attempt {} to {} failed: {}", attempt, device.name, e);
                last_reason = failure_reason(e);

                if attempt < max_attempts {
                    let delay = config.delay_after_attempt(attempt);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            debug!("backoff interrupted, surfacing in-flight connect error");
                            return Err(Error::connection_failed(
                                Some(device.name.clone()),
                                attempt,
                                last_reason,
                            ));
                        }
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
    }

    Err(Error::connection_failed(
        Some(device.name.clone()),
        max_attempts,
        last_reason,
    ))
}

/// Extract a structured reason from a driver connect error.
fn failure_reason(error: Error) -> ConnectFailureReason {
    match error {
        Error::ConnectionFailed { reason, .. } => reason,
        other => ConnectFailureReason::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use epcscan_types::{
        AntennaConfig, EventSubscriptions, ReaderOptions, TagRead, Transport, TriggerType,
    };

    use crate::driver::ReaderEvent;

    /// Minimal handle that fails a scripted number of connects.
    struct FlakyReader {
        attempts: AtomicU32,
        failures_before_success: u32,
    }

    impl FlakyReader {
        fn failing(n: u32) -> Arc<dyn ReaderHandle> {
            Arc::new(Self {
                attempts: AtomicU32::new(0),
                failures_before_success: n,
            })
        }
    }

    #[async_trait]
    impl ReaderHandle for FlakyReader {
        async fn connect(&self) -> Result<()> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err(Error::connection_failed(
                    None,
                    1,
                    ConnectFailureReason::Busy,
                ))
            } else {
                Ok(())
            }
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }

        async fn is_connected(&self) -> bool {
            false
        }

        async fn host_name(&self) -> Result<String> {
            Err(Error::NotConnected)
        }

        async fn subscribe(
            &self,
            _subs: EventSubscriptions,
        ) -> Result<mpsc::Receiver<ReaderEvent>> {
            Err(Error::NotConnected)
        }

        async fn set_options(&self, _options: ReaderOptions) -> Result<()> {
            Ok(())
        }

        async fn clear_prefilters(&self) -> Result<()> {
            Ok(())
        }

        async fn set_triggers(&self, _start: TriggerType, _stop: TriggerType) -> Result<()> {
            Ok(())
        }

        async fn set_tag_storage_limit(&self, _max_tags: u32) -> Result<()> {
            Ok(())
        }

        async fn available_antennas(&self) -> Result<Vec<u16>> {
            Ok(vec![])
        }

        async fn transmit_power_levels(&self) -> Result<Vec<u16>> {
            Ok(vec![])
        }

        async fn set_antenna_config(&self, _antenna: u16, _config: AntennaConfig) -> Result<()> {
            Ok(())
        }

        async fn start_inventory(&self) -> Result<()> {
            Ok(())
        }

        async fn stop_inventory(&self) -> Result<()> {
            Ok(())
        }

        async fn purge_tags(&self) -> Result<()> {
            Ok(())
        }

        async fn read_buffered(&self, _max_tags: usize) -> Result<Vec<TagRead>> {
            Ok(vec![])
        }

        async fn read_buffered_extended(&self, _max_tags: usize) -> Result<Vec<TagRead>> {
            Ok(vec![])
        }
    }

    fn device() -> ReaderDevice {
        ReaderDevice::new("RFD40", Transport::Usb)
    }

    #[test]
    fn test_backoff_schedule() {
        let config = RetryConfig::for_connect();
        assert_eq!(config.delay_after_attempt(1), Duration::from_millis(500));
        assert_eq!(config.delay_after_attempt(2), Duration::from_millis(1000));
        assert_eq!(config.delay_after_attempt(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_capped_at_max_delay() {
        let config = RetryConfig::for_connect().max_delay(Duration::from_millis(600));
        assert_eq!(config.delay_after_attempt(2), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_sleeps_never() {
        let reader = FlakyReader::failing(0);
        let before = tokio::time::Instant::now();
        connect_with_retry(&reader, &device(), &RetryConfig::for_connect(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_waits_500_then_1000_and_no_trailing_sleep() {
        let reader = FlakyReader::failing(u32::MAX);
        let before = tokio::time::Instant::now();

        let err = connect_with_retry(
            &reader,
            &device(),
            &RetryConfig::for_connect(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        // 500ms + 1000ms between the three attempts, nothing after the last.
        assert_eq!(before.elapsed(), Duration::from_millis(1500));
        match err {
            Error::ConnectionFailed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_eventual_success_after_two_failures() {
        let reader = FlakyReader::failing(2);
        connect_with_retry(
            &reader,
            &device(),
            &RetryConfig::for_connect(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_surfaces_connect_error() {
        let reader = FlakyReader::failing(u32::MAX);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = connect_with_retry(&reader, &device(), &RetryConfig::for_connect(), &cancel)
            .await
            .unwrap_err();

        match err {
            Error::ConnectionFailed {
                attempts, reason, ..
            } => {
                assert_eq!(attempts, 1);
                assert_eq!(reason, ConnectFailureReason::Busy);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

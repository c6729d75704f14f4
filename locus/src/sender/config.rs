//! Sender configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default number of delivery attempts before a key is marked unreachable.
pub const DEFAULT_RETRY_BUDGET: u32 = 20;
/// Default delay between delivery attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Default period of the idle sweep.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(10);
/// Default idle time after which an entry is evicted.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Retry and eviction settings for a [`LocationSender`](crate::LocationSender).
///
/// Fixed delay between attempts, no backoff or jitter.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use locus::SenderConfig;
///
/// let config = SenderConfig::builder()
///     .retry_budget(5)
///     .retry_delay(Duration::from_millis(100))
///     .build()
///     .unwrap();
/// assert_eq!(config.retry_budget(), 5);
///
/// let from_file: SenderConfig =
///     serde_json::from_str(r#"{ "retry_budget": 3, "idle_timeout_ms": 60000 }"#).unwrap();
/// assert_eq!(from_file.idle_timeout(), Duration::from_secs(60));
/// assert_eq!(from_file.retry_delay(), Duration::from_millis(500));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "SenderConfigFile")]
pub struct SenderConfig {
    retry_budget: u32,
    retry_delay: Duration,
    reap_interval: Duration,
    idle_timeout: Duration,
}

impl SenderConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> SenderConfigBuilder {
        SenderConfigBuilder::default()
    }

    /// Delivery attempts per call before giving up with `TargetNotFound`.
    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    /// Delay between two delivery attempts.
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Period of the idle sweep.
    pub fn reap_interval(&self) -> Duration {
        self.reap_interval
    }

    /// Idle time after which an entry is evicted.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
            retry_delay: DEFAULT_RETRY_DELAY,
            reap_interval: DEFAULT_REAP_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Builder for [`SenderConfig`].
#[derive(Debug, Clone)]
pub struct SenderConfigBuilder {
    config: SenderConfig,
}

impl Default for SenderConfigBuilder {
    fn default() -> Self {
        Self {
            config: SenderConfig::default(),
        }
    }
}

impl SenderConfigBuilder {
    /// Set the number of delivery attempts per call.
    pub fn retry_budget(mut self, attempts: u32) -> Self {
        self.config.retry_budget = attempts;
        self
    }

    /// Set the delay between delivery attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Set the idle sweep period.
    pub fn reap_interval(mut self, interval: Duration) -> Self {
        self.config.reap_interval = interval;
        self
    }

    /// Set the idle eviction threshold.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero retry budget, reap interval or
    /// idle timeout. A zero retry delay is allowed.
    pub fn build(self) -> Result<SenderConfig, ConfigError> {
        let config = self.config;
        if config.retry_budget == 0 {
            return Err(ConfigError::ZeroRetryBudget);
        }
        if config.reap_interval.is_zero() {
            return Err(ConfigError::ZeroReapInterval);
        }
        if config.idle_timeout.is_zero() {
            return Err(ConfigError::ZeroIdleTimeout);
        }
        Ok(config)
    }
}

/// On-disk shape of [`SenderConfig`]: durations in milliseconds, every
/// field optional.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SenderConfigFile {
    retry_budget: u32,
    retry_delay_ms: u64,
    reap_interval_ms: u64,
    idle_timeout_ms: u64,
}

impl Default for SenderConfigFile {
    fn default() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
            retry_delay_ms: millis(DEFAULT_RETRY_DELAY),
            reap_interval_ms: millis(DEFAULT_REAP_INTERVAL),
            idle_timeout_ms: millis(DEFAULT_IDLE_TIMEOUT),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl TryFrom<SenderConfigFile> for SenderConfig {
    type Error = ConfigError;

    fn try_from(file: SenderConfigFile) -> Result<Self, Self::Error> {
        SenderConfig::builder()
            .retry_budget(file.retry_budget)
            .retry_delay(Duration::from_millis(file.retry_delay_ms))
            .reap_interval(Duration::from_millis(file.reap_interval_ms))
            .idle_timeout(Duration::from_millis(file.idle_timeout_ms))
            .build()
    }
}

//! Conflict detector and name-equivalence configuration.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

// =========================================================================
// ClassifierConfig
// =========================================================================

/// Which names count as "the same name".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierPolicy {
    /// Names are equal after full Unicode case folding.
    #[default]
    CaseInsensitive,
    /// Names are equal only if byte-identical.
    CaseSensitive,
}

/// Name-equivalence policy.
///
/// # Example
///
/// ```no_run
/// # use inferadb_issues_types::config::{ClassifierConfig, ClassifierPolicy};
/// let config = ClassifierConfig::builder()
///     .policy(ClassifierPolicy::CaseInsensitive)
///     .collapse_whitespace(true)
///     .build();
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClassifierConfig {
    /// Case handling.
    #[serde(default)]
    pub policy: ClassifierPolicy,
    /// Trim leading/trailing whitespace and collapse interior runs to a single
    /// space before comparing.
    ///
    /// Default: false (whitespace is significant).
    #[serde(default)]
    pub collapse_whitespace: bool,
}

#[bon::bon]
impl ClassifierConfig {
    /// Creates a classifier configuration.
    #[builder]
    pub fn new(
        #[builder(default)] policy: ClassifierPolicy,
        #[builder(default)] collapse_whitespace: bool,
    ) -> Self {
        Self { policy, collapse_whitespace }
    }
}

// =========================================================================
// DetectorConfig
// =========================================================================

/// Maximum number of apply workers.
const MAX_WORKERS: usize = 64;

/// Maximum number of resolved issues kept in history.
const MAX_RESOLVED_HISTORY: usize = 100_000;

/// Default number of apply workers.
const fn default_workers() -> usize {
    4
}

/// Default capacity of the inbound feed channel (and of each worker queue).
const fn default_feed_capacity() -> usize {
    1024
}

/// Default capacity of the view change broadcast channel.
const fn default_subscriber_capacity() -> usize {
    256
}

/// Default number of resolved issues retained.
const fn default_resolved_history() -> usize {
    128
}

/// Default `Retry-After` hint for not-ready responses (1s).
const fn default_not_ready_retry_after() -> Duration {
    Duration::from_secs(1)
}

/// Name-conflict detector configuration.
///
/// # Validation Rules
///
/// - `workers` must be in `1..=64`
/// - `feed_capacity` must be > 0
/// - `subscriber_capacity` must be > 0
/// - `resolved_history` must be <= 100 000 (0 disables the history)
/// - `not_ready_retry_after` must be > 0
///
/// # Example
///
/// ```no_run
/// # use inferadb_issues_types::config::DetectorConfig;
/// let config = DetectorConfig::builder()
///     .workers(8)
///     .resolved_history(0)
///     .build()
///     .expect("valid detector config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DetectorConfig {
    /// Name-equivalence policy.
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Number of apply workers.
    ///
    /// Events are routed to workers by entity, so one entity's events are
    /// applied in order while different entities proceed concurrently.
    /// Default: 4.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Capacity of the inbound feed channel and of each worker queue.
    ///
    /// A full queue applies backpressure to the feed. Default: 1024.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
    /// Capacity of the metadata view change broadcast.
    ///
    /// Subscribers that fall further behind lose the oldest changes.
    /// Default: 256.
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
    /// Number of resolved issues retained for inspection. Default: 128.
    #[serde(default = "default_resolved_history")]
    pub resolved_history: usize,
    /// `Retry-After` hint returned with not-ready responses. Default: 1s.
    #[serde(default = "default_not_ready_retry_after")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub not_ready_retry_after: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            workers: default_workers(),
            feed_capacity: default_feed_capacity(),
            subscriber_capacity: default_subscriber_capacity(),
            resolved_history: default_resolved_history(),
            not_ready_retry_after: default_not_ready_retry_after(),
        }
    }
}

#[bon::bon]
impl DetectorConfig {
    /// Creates a new detector configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    #[builder]
    pub fn new(
        #[builder(default)] classifier: ClassifierConfig,
        #[builder(default = default_workers())] workers: usize,
        #[builder(default = default_feed_capacity())] feed_capacity: usize,
        #[builder(default = default_subscriber_capacity())] subscriber_capacity: usize,
        #[builder(default = default_resolved_history())] resolved_history: usize,
        #[builder(default = default_not_ready_retry_after())] not_ready_retry_after: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            classifier,
            workers,
            feed_capacity,
            subscriber_capacity,
            resolved_history,
            not_ready_retry_after,
        };
        config.validate()?;
        Ok(config)
    }
}

impl DetectorConfig {
    /// Validates the configuration values.
    ///
    /// Call after deserialization to ensure values are within valid ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ConfigError::Validation {
                message: format!("workers must be in 1..={}, got {}", MAX_WORKERS, self.workers),
            });
        }
        if self.feed_capacity == 0 {
            return Err(ConfigError::Validation {
                message: "feed_capacity must be > 0".to_string(),
            });
        }
        if self.subscriber_capacity == 0 {
            return Err(ConfigError::Validation {
                message: "subscriber_capacity must be > 0".to_string(),
            });
        }
        if self.resolved_history > MAX_RESOLVED_HISTORY {
            return Err(ConfigError::Validation {
                message: format!(
                    "resolved_history must be <= {}, got {}",
                    MAX_RESOLVED_HISTORY, self.resolved_history
                ),
            });
        }
        if self.not_ready_retry_after.is_zero() {
            return Err(ConfigError::Validation {
                message: "not_ready_retry_after must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

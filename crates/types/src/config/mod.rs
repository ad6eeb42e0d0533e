//! Configuration types for the issue detector.
//!
//! Configuration is loaded from TOML files and environment variables.
//! All config structs validate their values at construction time via
//! fallible builders. Post-deserialization validation is available via
//! the `validate()` method on each struct.

mod detector;

pub use detector::*;
use snafu::Snafu;

/// Configuration validation error.
///
/// Returned when a configuration value is outside its valid range or
/// violates a cross-field constraint.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}

/// Duration serialization using humantime format.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    // =========================================================================
    // DetectorConfig validation tests
    // =========================================================================

    #[test]
    fn test_detector_config_defaults_are_valid() {
        let config = DetectorConfig::builder().build().expect("defaults should be valid");
        assert_eq!(config, DetectorConfig::default());
        assert_eq!(config.workers, 4);
        assert_eq!(config.feed_capacity, 1024);
        assert_eq!(config.resolved_history, 128);
        assert_eq!(config.not_ready_retry_after, Duration::from_secs(1));
        assert_eq!(config.classifier.policy, ClassifierPolicy::CaseInsensitive);
        assert!(!config.classifier.collapse_whitespace);
    }

    #[test]
    fn test_detector_config_builder_with_custom_values() {
        let config = DetectorConfig::builder()
            .workers(16)
            .feed_capacity(8)
            .subscriber_capacity(4)
            .resolved_history(0)
            .classifier(ClassifierConfig::builder().policy(ClassifierPolicy::CaseSensitive).build())
            .build()
            .expect("valid custom config");
        assert_eq!(config.workers, 16);
        assert_eq!(config.feed_capacity, 8);
        assert_eq!(config.resolved_history, 0);
        assert_eq!(config.classifier.policy, ClassifierPolicy::CaseSensitive);
    }

    #[test]
    fn test_detector_config_workers_bounds() {
        assert!(DetectorConfig::builder().workers(1).build().is_ok());
        assert!(DetectorConfig::builder().workers(64).build().is_ok());

        let err = DetectorConfig::builder().workers(0).build().unwrap_err();
        assert!(err.to_string().contains("workers"));
        assert!(DetectorConfig::builder().workers(65).build().is_err());
    }

    #[test]
    fn test_detector_config_zero_capacities_rejected() {
        let err = DetectorConfig::builder().feed_capacity(0).build().unwrap_err();
        assert!(err.to_string().contains("feed_capacity"));
        let err = DetectorConfig::builder().subscriber_capacity(0).build().unwrap_err();
        assert!(err.to_string().contains("subscriber_capacity"));
    }

    #[test]
    fn test_detector_config_history_upper_bound() {
        assert!(DetectorConfig::builder().resolved_history(100_000).build().is_ok());
        assert!(DetectorConfig::builder().resolved_history(100_001).build().is_err());
    }

    #[test]
    fn test_detector_config_zero_retry_after_rejected() {
        let result = DetectorConfig::builder().not_ready_retry_after(Duration::ZERO).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_detector_config_from_toml_uses_defaults() {
        let config: DetectorConfig = toml::from_str(
            r#"
            workers = 2
            not_ready_retry_after = "250ms"

            [classifier]
            collapse_whitespace = true
            "#,
        )
        .expect("parse toml");
        config.validate().expect("valid");
        assert_eq!(config.workers, 2);
        assert_eq!(config.not_ready_retry_after, Duration::from_millis(250));
        assert_eq!(config.feed_capacity, 1024);
        assert!(config.classifier.collapse_whitespace);
        assert_eq!(config.classifier.policy, ClassifierPolicy::CaseInsensitive);
    }

    #[test]
    fn test_detector_config_validate_after_deserialize() {
        let config: DetectorConfig = toml::from_str("workers = 0").expect("parse toml");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_classifier_policy_wire_names() {
        let config: ClassifierConfig =
            toml::from_str(r#"policy = "case_sensitive""#).expect("parse toml");
        assert_eq!(config.policy, ClassifierPolicy::CaseSensitive);
    }

    #[test]
    fn test_detector_config_serializes_duration_as_humantime() {
        let json = serde_json::to_value(DetectorConfig::default()).expect("serialize");
        assert_eq!(json["not_ready_retry_after"], "1s");
    }
}

//! Error types for the issue detector using snafu.
//!
//! Each [`DetectorError`] variant maps to an [`ErrorCode`] with a unique numeric
//! identifier, retryability classification, and suggested recovery action.
//! The admin server uses the code to choose an HTTP status.

use std::time::Duration;

use snafu::Snafu;

use crate::config::ConfigError;

/// Unified result type for detector operations.
pub type Result<T, E = DetectorError> = std::result::Result<T, E>;

/// Machine-readable error codes for programmatic error handling.
///
/// | Range     | Domain    | Examples                                 |
/// |-----------|-----------|------------------------------------------|
/// | 1000–1099 | Lifecycle | Not ready, shutting down, feed closed    |
/// | 2000–2099 | Request   | Invalid argument, unknown issue          |
/// | 3000–3099 | Config    | Validation failures                      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // --- Lifecycle errors (1000–1099) ---
    /// Initial metadata sync has not completed.
    NotReady = 1000,
    /// Detector is shutting down.
    ShuttingDown = 1001,
    /// The inbound feed has been closed.
    FeedClosed = 1002,
    /// Applied watermark did not reach the requested index in time.
    WatermarkTimeout = 1003,

    // --- Request errors (2000–2099) ---
    /// Requested issue does not exist (or is no longer active).
    IssueNotFound = 2000,
    /// Invalid request argument.
    InvalidArgument = 2001,

    // --- Configuration errors (3000–3099) ---
    /// Configuration failed validation.
    Config = 3000,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for unknown values.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::NotReady),
            1001 => Some(Self::ShuttingDown),
            1002 => Some(Self::FeedClosed),
            1003 => Some(Self::WatermarkTimeout),
            2000 => Some(Self::IssueNotFound),
            2001 => Some(Self::InvalidArgument),
            3000 => Some(Self::Config),
            _ => None,
        }
    }

    /// Whether this error is retryable.
    ///
    /// A retryable error may succeed later without any corrective action.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::NotReady | Self::WatermarkTimeout)
    }

    /// Suggested recovery action for this error code.
    #[must_use]
    pub const fn suggested_action(self) -> &'static str {
        match self {
            Self::NotReady => {
                "Retry after the detector finishes its initial metadata sync. An empty result would be misleading, so none is returned."
            },
            Self::ShuttingDown => "Send the request to another node; this one is draining.",
            Self::FeedClosed => "Restart the detector; its feed consumer has stopped.",
            Self::WatermarkTimeout => {
                "Retry with a longer timeout or check that the metadata feed is still delivering events."
            },
            Self::IssueNotFound => "The issue was resolved or never existed. List issues again.",
            Self::InvalidArgument => "Fix the request parameters and retry.",
            Self::Config => "Fix the configuration value named in the message and restart.",
        }
    }
}

/// Errors returned by the detector's public surface.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DetectorError {
    /// The detector has not finished its initial sync with the metadata layer.
    #[snafu(display("issue view is not ready: initial metadata sync has not completed"))]
    NotReady,

    /// The detector is shutting down and no longer serves requests.
    #[snafu(display("issue detector is shutting down"))]
    ShuttingDown,

    /// The feed consumer is gone; no more events can be submitted.
    #[snafu(display("metadata feed is closed"))]
    FeedClosed,

    /// Waiting for the applied watermark timed out.
    #[snafu(display(
        "applied watermark did not reach log index {log_index} within {waited:?} (at {applied})"
    ))]
    WatermarkTimeout {
        /// Index that was waited for.
        log_index: u64,
        /// Watermark at the time of the timeout.
        applied: u64,
        /// How long the caller waited.
        waited: Duration,
    },

    /// No active issue has the requested identifier.
    #[snafu(display("issue not found: {id}"))]
    IssueNotFound {
        /// The identifier that was requested.
        id: String,
    },

    /// A request argument was malformed.
    #[snafu(display("invalid argument: {message}"))]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// Configuration failed validation.
    #[snafu(display("configuration error: {source}"))]
    Config {
        /// The underlying validation error.
        source: ConfigError,
    },
}

impl DetectorError {
    /// Returns the machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotReady => ErrorCode::NotReady,
            Self::ShuttingDown => ErrorCode::ShuttingDown,
            Self::FeedClosed => ErrorCode::FeedClosed,
            Self::WatermarkTimeout { .. } => ErrorCode::WatermarkTimeout,
            Self::IssueNotFound { .. } => ErrorCode::IssueNotFound,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Config { .. } => ErrorCode::Config,
        }
    }

    /// Whether the operation may succeed if retried unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

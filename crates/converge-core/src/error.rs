//! Error types for reconciliation operations.
//!
//! Every failure carries the operation name and resource identifier so it
//! can be diagnosed without re-running. The core never logs failures; it
//! returns them for the caller to report.

use std::time::Duration;
use thiserror::Error;

use crate::outcome::ClassifiedOutcome;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ConvergeError>;

/// Errors surfaced by the reconciliation core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConvergeError {
    /// A single classified attempt failed transiently (no retry at this call site).
    #[error("{operation} '{resource}': transient failure: {cause}")]
    Transient {
        /// The operation that failed (e.g. "read", "update").
        operation: String,
        /// The resource identifier or natural key.
        resource: String,
        /// Failure description.
        cause: String,
    },

    /// The retry budget was exhausted on transient failures.
    #[error("{operation} '{resource}': retries exhausted after {attempts} attempts: {cause}")]
    RetriesExhausted {
        /// The operation that failed.
        operation: String,
        /// The resource identifier or natural key.
        resource: String,
        /// Total attempts made.
        attempts: u32,
        /// Cause of the last transient failure.
        cause: String,
    },

    /// The call will not succeed without a different input.
    #[error("{operation} '{resource}': permanent failure: {cause}")]
    Permanent {
        /// The operation that failed.
        operation: String,
        /// The resource identifier or natural key.
        resource: String,
        /// Last observed status code, if any.
        status: Option<u16>,
        /// Failure description.
        cause: String,
    },

    /// The resource does not exist remotely.
    #[error("{operation} '{resource}': resource not found")]
    NotFound {
        /// The operation that failed.
        operation: String,
        /// The resource identifier or natural key.
        resource: String,
    },

    /// The remote state conflicts with the requested change.
    #[error("{operation} '{resource}': conflict: {cause}")]
    Conflict {
        /// The operation that failed.
        operation: String,
        /// The resource identifier or natural key.
        resource: String,
        /// Conflict description.
        cause: String,
    },

    /// The overall deadline or poll timeout elapsed.
    #[error("{operation} '{resource}': timed out after {elapsed:?}")]
    TimedOut {
        /// The operation that timed out.
        operation: String,
        /// The resource identifier or natural key.
        resource: String,
        /// Wall-clock time spent before giving up.
        elapsed: Duration,
    },

    /// A poll returned a status label outside both pending and target sets.
    #[error("{operation} '{resource}': status label '{label}' outside pending and target sets")]
    AnomalousLabel {
        /// The operation being polled.
        operation: String,
        /// The resource identifier.
        resource: String,
        /// The unexpected label.
        label: String,
    },

    /// The operation was cancelled by the caller.
    #[error("{operation} '{resource}': cancelled")]
    Cancelled {
        /// The operation that was cancelled.
        operation: String,
        /// The resource identifier or natural key.
        resource: String,
    },

    /// Snapshot encoding, decoding, or diffing failed.
    #[error("{operation} '{resource}': snapshot error: {message}")]
    Snapshot {
        /// The operation that failed.
        operation: String,
        /// The resource identifier or natural key.
        resource: String,
        /// Error message.
        message: String,
    },
}

impl ConvergeError {
    /// Creates a permanent error.
    pub fn permanent(
        operation: impl Into<String>,
        resource: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self::Permanent {
            operation: operation.into(),
            resource: resource.into(),
            status: None,
            cause: cause.into(),
        }
    }

    /// Creates a snapshot error.
    pub fn snapshot(
        operation: impl Into<String>,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Snapshot {
            operation: operation.into(),
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(operation: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
            resource: resource.into(),
        }
    }

    /// Maps a terminal classified outcome to an error.
    ///
    /// `Success` is not a valid input here; callers destructure it before
    /// reaching for an error.
    pub(crate) fn from_terminal(
        outcome: ClassifiedOutcome,
        operation: &str,
        resource: &str,
    ) -> Self {
        match outcome {
            ClassifiedOutcome::Success(_) => Self::permanent(
                operation,
                resource,
                "internal: success treated as terminal failure",
            ),
            ClassifiedOutcome::Transient(cause) => Self::Transient {
                operation: operation.to_string(),
                resource: resource.to_string(),
                cause,
            },
            ClassifiedOutcome::Permanent { cause, status } => Self::Permanent {
                operation: operation.to_string(),
                resource: resource.to_string(),
                status,
                cause,
            },
            ClassifiedOutcome::NotFound => Self::NotFound {
                operation: operation.to_string(),
                resource: resource.to_string(),
            },
            ClassifiedOutcome::Conflict(cause) => Self::Conflict {
                operation: operation.to_string(),
                resource: resource.to_string(),
                cause,
            },
        }
    }

    /// Returns true if this failure might succeed on a later reconciliation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConvergeError::Transient { .. }
                | ConvergeError::RetriesExhausted { .. }
                | ConvergeError::TimedOut { .. }
        )
    }

    /// Returns true if this is a not-found absence signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConvergeError::NotFound { .. })
    }

    /// Returns true if this is a conflict the caller may resolve by adopting.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConvergeError::Conflict { .. })
    }

    /// Returns true if this failure hit a deadline or poll timeout.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, ConvergeError::TimedOut { .. })
    }
}

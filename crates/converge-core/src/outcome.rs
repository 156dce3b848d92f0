//! Remote call results and outcome classification.
//!
//! Every remote call attempt produces exactly one [`RemoteCallResult`],
//! which the [`Classifier`] maps to exactly one [`ClassifiedOutcome`].
//! Classification is a pure function of the result and the classifier
//! configuration, so the same inputs always produce the same outcome.

use serde::{Deserialize, Serialize};

/// Raw result of a single remote call attempt.
///
/// `status` is present whenever a response was received; `error` is set
/// only when the transport itself failed. `location` carries the follow-up
/// URL of an accepted asynchronous operation, when the remote returned one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCallResult {
    /// HTTP-level status code, if a response was received.
    pub status: Option<u16>,
    /// Transport-level error message, if the call itself failed.
    pub error: Option<String>,
    /// Raw response body.
    pub body: Option<Vec<u8>>,
    /// Follow-up location for accepted asynchronous operations.
    pub location: Option<String>,
}

impl RemoteCallResult {
    /// Creates a result carrying only a status code.
    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Creates a result with a status code and body.
    pub fn with_body(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(status),
            body: Some(body.into()),
            ..Self::default()
        }
    }

    /// Creates a result for a failed transport call (no response received).
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Attaches a follow-up location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Returns the body as text, if present and valid UTF-8.
    pub fn body_text(&self) -> Option<&str> {
        self.body.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }
}

/// Classified outcome of one call attempt.
///
/// Drives all control decisions in the retry executor, poller, and
/// reconciler. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedOutcome {
    /// The call succeeded; carries the response payload.
    Success(Vec<u8>),
    /// The call may succeed if retried unchanged.
    Transient(String),
    /// The call will not succeed without a different input.
    Permanent {
        /// Failure description.
        cause: String,
        /// Last observed status code, if any.
        status: Option<u16>,
    },
    /// The resource does not exist remotely.
    NotFound,
    /// The remote state conflicts with the requested change.
    Conflict(String),
}

impl ClassifiedOutcome {
    /// Returns true if this outcome is eligible for retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClassifiedOutcome::Transient(_))
    }

    /// Returns true if this outcome is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, ClassifiedOutcome::Success(_))
    }
}

/// Maps raw call results to classified outcomes.
///
/// The transient signature list marks 400 responses caused by upstream
/// races (the remote occasionally emits a malformed body mid-update) as
/// retryable. `retry_transport_errors` is reserved for idempotent call
/// sites such as onboarding, where a lost response is safe to replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classifier {
    /// Substrings of a 400 response that mark it as an upstream race.
    pub transient_signatures: Vec<String>,
    /// Treat transport-level failures as transient (idempotent calls only).
    pub retry_transport_errors: bool,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            transient_signatures: vec!["invalid character".to_string()],
            retry_transport_errors: false,
        }
    }
}

impl Classifier {
    /// Creates a classifier with the default transient signatures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables retry of transport-level failures.
    pub fn with_transport_retry(mut self) -> Self {
        self.retry_transport_errors = true;
        self
    }

    /// Adds a transient signature substring.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.transient_signatures.push(signature.into());
        self
    }

    /// Classifies a single call attempt.
    pub fn classify(&self, result: &RemoteCallResult) -> ClassifiedOutcome {
        let Some(status) = result.status else {
            // No response at all. Only idempotent call sites may replay.
            let cause = result
                .error
                .clone()
                .unwrap_or_else(|| "no response received".to_string());
            if result.error.is_some() && self.retry_transport_errors {
                return ClassifiedOutcome::Transient(cause);
            }
            return ClassifiedOutcome::Permanent {
                cause,
                status: None,
            };
        };

        match status {
            404 => ClassifiedOutcome::NotFound,
            s if s >= 500 => {
                ClassifiedOutcome::Transient(format!("server error (status {s})"))
            }
            400 if self.matches_signature(result) => ClassifiedOutcome::Transient(
                format!("upstream race (status 400): {}", self.message_of(result)),
            ),
            409 => ClassifiedOutcome::Conflict(self.message_of(result)),
            s if (400..500).contains(&s) => ClassifiedOutcome::Permanent {
                cause: self.message_of(result),
                status: Some(s),
            },
            s if (200..300).contains(&s) => {
                ClassifiedOutcome::Success(result.body.clone().unwrap_or_default())
            }
            s => ClassifiedOutcome::Permanent {
                cause: format!("unexpected status {s}"),
                status: Some(s),
            },
        }
    }

    /// Returns true if the error message or body matches a transient signature.
    fn matches_signature(&self, result: &RemoteCallResult) -> bool {
        let matches = |text: &str| self.transient_signatures.iter().any(|s| text.contains(s));
        result.error.as_deref().is_some_and(matches)
            || result.body_text().is_some_and(matches)
    }

    /// Best-available failure message for a result.
    fn message_of(&self, result: &RemoteCallResult) -> String {
        if let Some(error) = &result.error {
            return error.clone();
        }
        if let Some(text) = result.body_text() {
            if !text.is_empty() {
                return text.to_string();
            }
        }
        match result.status {
            Some(s) => format!("status {s}"),
            None => "no response received".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_not_found_is_never_permanent_or_transient() {
        let outcome = Classifier::new().classify(&RemoteCallResult::status(404));
        assert_eq!(outcome, ClassifiedOutcome::NotFound);
    }

    #[test]
    fn test_server_errors_are_transient() {
        let classifier = Classifier::new();
        for status in [500, 502, 503, 504, 599] {
            let outcome = classifier.classify(&RemoteCallResult::status(status));
            assert!(outcome.is_retryable(), "status {status} must be transient");
        }
    }

    #[test]
    fn test_bad_request_with_signature_is_transient() {
        let classifier = Classifier::new();
        let result = RemoteCallResult::with_body(400, "invalid character 'x' in body");
        assert!(classifier.classify(&result).is_retryable());
    }

    #[test]
    fn test_bad_request_without_signature_is_permanent() {
        let classifier = Classifier::new();
        let result = RemoteCallResult::with_body(400, "missing required field 'name'");
        let outcome = classifier.classify(&result);
        assert_eq!(
            outcome,
            ClassifiedOutcome::Permanent {
                cause: "missing required field 'name'".to_string(),
                status: Some(400),
            }
        );
    }

    #[test]
    fn test_conflict_is_distinguished() {
        let outcome = Classifier::new().classify(&RemoteCallResult::with_body(409, "duplicate"));
        assert_eq!(outcome, ClassifiedOutcome::Conflict("duplicate".to_string()));
    }

    #[test]
    fn test_success_carries_payload() {
        let outcome = Classifier::new().classify(&RemoteCallResult::with_body(200, r#"{"id":"a"}"#));
        assert_eq!(
            outcome,
            ClassifiedOutcome::Success(br#"{"id":"a"}"#.to_vec())
        );
    }

    #[test]
    fn test_success_without_body_is_empty_payload() {
        let outcome = Classifier::new().classify(&RemoteCallResult::status(204));
        assert_eq!(outcome, ClassifiedOutcome::Success(Vec::new()));
    }

    #[test]
    fn test_transport_error_is_permanent_by_default() {
        let classifier = Classifier::new();
        let outcome = classifier.classify(&RemoteCallResult::transport_error("connection reset"));
        assert_eq!(
            outcome,
            ClassifiedOutcome::Permanent {
                cause: "connection reset".to_string(),
                status: None,
            }
        );
    }

    #[test]
    fn test_transport_error_retryable_when_enabled() {
        let classifier = Classifier::new().with_transport_retry();
        let outcome = classifier.classify(&RemoteCallResult::transport_error("connection reset"));
        assert_eq!(
            outcome,
            ClassifiedOutcome::Transient("connection reset".to_string())
        );
    }

    #[test]
    fn test_classification_is_reproducible() {
        let classifier = Classifier::new();
        let result = RemoteCallResult::with_body(503, "busy");
        assert_eq!(classifier.classify(&result), classifier.classify(&result));
    }

    #[test]
    fn test_custom_signature() {
        let classifier = Classifier::new().with_signature("temporarily unavailable");
        let result = RemoteCallResult::with_body(400, "temporarily unavailable");
        assert!(classifier.classify(&result).is_retryable());
    }

    #[test]
    fn test_redirect_is_permanent() {
        let outcome = Classifier::new().classify(&RemoteCallResult::status(302));
        assert!(matches!(outcome, ClassifiedOutcome::Permanent { .. }));
    }
}

//! Error classification
//!
//! Maps raw failures to an [`AttemptOutcome`]. Rules are applied in order,
//! first match wins:
//!
//! 1. request-rate limit            → `RateLimited`
//! 2. no host capacity for shape    → `CapacityExhausted`
//! 3. missing field / bad credential → `AuthOrConfigError`
//! 4. any other provider error code → `TransientProviderError`
//! 5. everything else               → `UnknownError`

use crate::outcome::AttemptOutcome;
use instaflow_cloud::{CredentialError, ProviderError, SpecError};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// Cool-down applied when the provider rate-limits without a hint
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(15 * 60);

const RATE_LIMIT_CODES: &[&str] = &["TooManyRequests"];
const RATE_LIMIT_HINTS: &[&str] = &["too many requests", "rate limit", "request limit exceeded"];

const CAPACITY_CODES: &[&str] = &["OutOfHostCapacity", "OutOfCapacity"];
const CAPACITY_HINTS: &[&str] = &["out of host capacity", "out of capacity"];

const CONFIG_CODES: &[&str] = &["NotAuthenticated", "InvalidParameter", "MissingParameter"];
const CREDENTIAL_HINTS: &[&str] = &[
    "private key",
    "key_file",
    "invalid fingerprint",
    "not authenticated",
    "config file",
];

static MISSING_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)missing\s+(?:required\s+)?(?:field|parameter|property|option\(s\)|option|value)s?\s*[:=]?\s*['"`]?(?:--)?([A-Za-z_][A-Za-z0-9_.\-]*)"#,
    )
    .expect("valid regex")
});

static REQUIRED_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)['"`](?:--)?([A-Za-z_][A-Za-z0-9_.\-]*)['"`]\s+(?:is|are)\s+(?:required|missing)"#)
        .expect("valid regex")
});

/// Classifies raw failures into the attempt outcome taxonomy
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rate_limit_cooldown: Duration,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            rate_limit_cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn code_in(code: Option<&str>, codes: &[&str]) -> bool {
    code.is_some_and(|c| codes.iter().any(|known| known.eq_ignore_ascii_case(c)))
}

/// Offending field name, when the message names one
fn extract_field(message: &str) -> Option<String> {
    MISSING_FIELD
        .captures(message)
        .or_else(|| REQUIRED_FIELD.captures(message))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', '-']).to_string())
        .filter(|field| !field.is_empty())
}

impl ErrorClassifier {
    pub fn new(rate_limit_cooldown: Duration) -> Self {
        Self {
            rate_limit_cooldown,
        }
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        self.rate_limit_cooldown
    }

    /// Classify a raw provider failure (never returns `Success`)
    pub fn classify(&self, err: &ProviderError) -> AttemptOutcome {
        let detail = err.to_string();

        let (status, code, message, retry_after) = match err {
            ProviderError::Service {
                status,
                code,
                message,
                retry_after,
            } => (*status, code.as_deref(), message.clone(), *retry_after),
            ProviderError::MissingField(field) => {
                return AttemptOutcome::AuthOrConfigError {
                    field: Some(field.clone()),
                    detail,
                };
            }
            ProviderError::InvalidConfig(_) => {
                return AttemptOutcome::AuthOrConfigError {
                    field: None,
                    detail,
                };
            }
            ProviderError::Timeout(_) => {
                return AttemptOutcome::TransientProviderError { detail };
            }
            ProviderError::CommandFailed(msg) => (None, None, msg.clone(), None),
            ProviderError::ResourceNotFound(_) | ProviderError::Io(_) | ProviderError::Json(_) => {
                (None, None, detail.clone(), None)
            }
        };
        let lowered = message.to_lowercase();

        // 1. rate limiting
        if status == Some(429)
            || code_in(code, RATE_LIMIT_CODES)
            || contains_any(&lowered, RATE_LIMIT_HINTS)
        {
            return AttemptOutcome::RateLimited {
                retry_after: retry_after.unwrap_or(self.rate_limit_cooldown),
                detail,
            };
        }

        // 2. capacity
        if code_in(code, CAPACITY_CODES) || contains_any(&lowered, CAPACITY_HINTS) {
            return AttemptOutcome::CapacityExhausted { detail };
        }

        // 3. missing field / malformed credential
        let field = extract_field(&message);
        if field.is_some()
            || status == Some(401)
            || code_in(code, CONFIG_CODES)
            || contains_any(&lowered, CREDENTIAL_HINTS)
        {
            return AttemptOutcome::AuthOrConfigError { field, detail };
        }

        // 4. recognizable provider error
        if code.is_some() || status.is_some() {
            return AttemptOutcome::TransientProviderError { detail };
        }

        // 5.
        AttemptOutcome::UnknownError { detail }
    }

    /// Credential problems never reach the provider
    pub fn classify_credential(&self, err: &CredentialError) -> AttemptOutcome {
        AttemptOutcome::AuthOrConfigError {
            field: Some(err.field().to_string()),
            detail: err.to_string(),
        }
    }

    pub fn classify_spec(&self, err: &SpecError) -> AttemptOutcome {
        AttemptOutcome::AuthOrConfigError {
            field: Some(err.field().to_string()),
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::OutcomeKind;

    fn service(status: u16, code: &str, message: &str) -> ProviderError {
        ProviderError::service(Some(status), Some(code), message)
    }

    #[test]
    fn test_classification_table() {
        let classifier = ErrorClassifier::default();
        let cases: Vec<(ProviderError, OutcomeKind)> = vec![
            (
                service(500, "InternalError", "Out of host capacity."),
                OutcomeKind::CapacityExhausted,
            ),
            (
                ProviderError::CommandFailed("ServiceError: Out of host capacity.".to_string()),
                OutcomeKind::CapacityExhausted,
            ),
            (
                service(429, "TooManyRequests", "Too many requests for the user"),
                OutcomeKind::RateLimited,
            ),
            (
                ProviderError::service(None, Some("TooManyRequests"), ""),
                OutcomeKind::RateLimited,
            ),
            (
                service(400, "MissingParameter", "Missing required field: subnetId"),
                OutcomeKind::ConfigurationError,
            ),
            (
                ProviderError::MissingField("compartment_id".to_string()),
                OutcomeKind::ConfigurationError,
            ),
            (
                service(401, "NotAuthenticated", "The required information to complete authentication was not provided or was incorrect."),
                OutcomeKind::ConfigurationError,
            ),
            (
                ProviderError::InvalidConfig("oci CLI not found".to_string()),
                OutcomeKind::ConfigurationError,
            ),
            (
                service(500, "InternalError", "Internal error occurred"),
                OutcomeKind::TransientProviderError,
            ),
            (
                service(409, "Conflict", "Resource is in a conflicting state"),
                OutcomeKind::TransientProviderError,
            ),
            (
                ProviderError::Timeout(Duration::from_secs(300)),
                OutcomeKind::TransientProviderError,
            ),
            (
                ProviderError::CommandFailed("segmentation fault".to_string()),
                OutcomeKind::UnknownError,
            ),
            (
                ProviderError::Io(std::io::Error::other("broken pipe")),
                OutcomeKind::UnknownError,
            ),
        ];

        for (err, expected) in cases {
            let description = err.to_string();
            assert_eq!(
                classifier.classify(&err).kind(),
                expected,
                "classifying {}",
                description
            );
        }
    }

    #[test]
    fn test_rate_limit_takes_precedence_over_capacity() {
        let err = service(429, "TooManyRequests", "Out of host capacity");
        assert_eq!(
            ErrorClassifier::default().classify(&err).kind(),
            OutcomeKind::RateLimited
        );
    }

    #[test]
    fn test_rate_limit_default_and_hint() {
        let classifier = ErrorClassifier::default();
        let outcome = classifier.classify(&service(429, "TooManyRequests", "slow down"));
        assert!(matches!(
            outcome,
            AttemptOutcome::RateLimited { retry_after, .. } if retry_after == DEFAULT_RATE_LIMIT_COOLDOWN
        ));

        let hinted = ProviderError::Service {
            status: Some(429),
            code: None,
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(60)),
        };
        assert!(matches!(
            classifier.classify(&hinted),
            AttemptOutcome::RateLimited { retry_after, .. } if retry_after == Duration::from_secs(60)
        ));
    }

    #[test]
    fn test_missing_field_name_extracted() {
        let classifier = ErrorClassifier::default();
        let outcome = classifier.classify(&ProviderError::CommandFailed(
            "Usage: oci compute instance launch [OPTIONS]\n\nError: Missing option(s) --subnet-id."
                .to_string(),
        ));
        assert_eq!(
            outcome,
            AttemptOutcome::AuthOrConfigError {
                field: Some("subnet-id".to_string()),
                detail: "Command execution failed: Usage: oci compute instance launch [OPTIONS]\n\nError: Missing option(s) --subnet-id.".to_string(),
            }
        );

        let outcome = classifier.classify(&service(
            400,
            "InvalidParameter",
            "'availabilityDomain' is required",
        ));
        assert!(matches!(
            outcome,
            AttemptOutcome::AuthOrConfigError { field: Some(ref f), .. } if f == "availabilityDomain"
        ));
    }

    #[test]
    fn test_malformed_credential_message() {
        let outcome = ErrorClassifier::default().classify(&ProviderError::CommandFailed(
            "ERROR: Could not find private key file".to_string(),
        ));
        assert_eq!(outcome.kind(), OutcomeKind::ConfigurationError);
    }

    #[test]
    fn test_credential_error_carries_field() {
        let outcome =
            ErrorClassifier::default().classify_credential(&CredentialError::MissingField("tenancy"));
        assert!(matches!(
            outcome,
            AttemptOutcome::AuthOrConfigError { field: Some(ref f), .. } if f == "tenancy"
        ));
    }
}

//! Attempt outcome taxonomy

use instaflow_cloud::LifecycleState;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of one provisioning attempt
///
/// Every raw provider failure is mapped into exactly one of the failure
/// variants by [`crate::ErrorClassifier`] before any retry decision is made.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success {
        resource_id: String,
        lifecycle_state: LifecycleState,
    },
    CapacityExhausted {
        detail: String,
    },
    RateLimited {
        retry_after: Duration,
        detail: String,
    },
    AuthOrConfigError {
        field: Option<String>,
        detail: String,
    },
    TransientProviderError {
        detail: String,
    },
    UnknownError {
        detail: String,
    },
}

impl AttemptOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            AttemptOutcome::Success { .. } => OutcomeKind::Success,
            AttemptOutcome::CapacityExhausted { .. } => OutcomeKind::CapacityExhausted,
            AttemptOutcome::RateLimited { .. } => OutcomeKind::RateLimited,
            AttemptOutcome::AuthOrConfigError { .. } => OutcomeKind::ConfigurationError,
            AttemptOutcome::TransientProviderError { .. } => OutcomeKind::TransientProviderError,
            AttemptOutcome::UnknownError { .. } => OutcomeKind::UnknownError,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success { .. })
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptOutcome::Success {
                resource_id,
                lifecycle_state,
            } => write!(f, "Instance created: {} ({})", resource_id, lifecycle_state),
            AttemptOutcome::CapacityExhausted { detail } => {
                write!(f, "Out of host capacity: {}", detail)
            }
            AttemptOutcome::RateLimited {
                retry_after,
                detail,
            } => write!(
                f,
                "Rate limited, cooling down for {}s: {}",
                retry_after.as_secs(),
                detail
            ),
            AttemptOutcome::AuthOrConfigError {
                field: Some(field),
                detail,
            } => write!(f, "Configuration error ({}): {}", field, detail),
            AttemptOutcome::AuthOrConfigError { field: None, detail } => {
                write!(f, "Configuration error: {}", detail)
            }
            AttemptOutcome::TransientProviderError { detail } => {
                write!(f, "Transient provider error: {}", detail)
            }
            AttemptOutcome::UnknownError { detail } => write!(f, "Unknown error: {}", detail),
        }
    }
}

/// Discriminant of [`AttemptOutcome`], as reported in status records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    CapacityExhausted,
    RateLimited,
    ConfigurationError,
    TransientProviderError,
    UnknownError,
}

impl OutcomeKind {
    /// Whether the scheduler may retry this kind without operator action
    pub fn is_auto_retryable(&self) -> bool {
        matches!(
            self,
            OutcomeKind::CapacityExhausted
                | OutcomeKind::RateLimited
                | OutcomeKind::TransientProviderError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::CapacityExhausted => "capacity_exhausted",
            OutcomeKind::RateLimited => "rate_limited",
            OutcomeKind::ConfigurationError => "configuration_error",
            OutcomeKind::TransientProviderError => "transient_provider_error",
            OutcomeKind::UnknownError => "unknown_error",
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serialization_matches_as_str() {
        for kind in [
            OutcomeKind::Success,
            OutcomeKind::CapacityExhausted,
            OutcomeKind::RateLimited,
            OutcomeKind::ConfigurationError,
            OutcomeKind::TransientProviderError,
            OutcomeKind::UnknownError,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::json!(kind.as_str()));
        }
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(OutcomeKind::CapacityExhausted.is_auto_retryable());
        assert!(OutcomeKind::RateLimited.is_auto_retryable());
        assert!(OutcomeKind::TransientProviderError.is_auto_retryable());
        assert!(!OutcomeKind::ConfigurationError.is_auto_retryable());
        assert!(!OutcomeKind::UnknownError.is_auto_retryable());
        assert!(!OutcomeKind::Success.is_auto_retryable());
    }

    #[test]
    fn test_display_includes_resource_id() {
        let outcome = AttemptOutcome::Success {
            resource_id: "ocid1.instance.oc1..abc".to_string(),
            lifecycle_state: LifecycleState::Provisioning,
        };
        assert_eq!(
            outcome.to_string(),
            "Instance created: ocid1.instance.oc1..abc (PROVISIONING)"
        );
    }
}

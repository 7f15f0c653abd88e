//! Provider error types

use std::time::Duration;
use thiserror::Error;

/// Raw failure reported by a provisioning client.
///
/// These are not interpreted here; `instaflow-core` classifies them into
/// an attempt outcome.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Service error{}: {message}", code_suffix(.code))]
    Service {
        /// HTTP status reported by the provider
        status: Option<u16>,
        /// Provider error code (e.g. "TooManyRequests")
        code: Option<String>,
        message: String,
        /// Explicit cool-down hint from the provider, if any
        retry_after: Option<Duration>,
    },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn service(status: Option<u16>, code: Option<&str>, message: impl Into<String>) -> Self {
        ProviderError::Service {
            status,
            code: code.map(str::to_string),
            message: message.into(),
            retry_after: None,
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" [{}]", c))
        .unwrap_or_default()
}

/// Resource specification errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {field}: {value} (must be a positive number)")]
    InvalidSizing { field: &'static str, value: f32 },
}

impl SpecError {
    pub fn field(&self) -> &'static str {
        match self {
            SpecError::MissingField(field) => field,
            SpecError::InvalidSizing { field, .. } => field,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

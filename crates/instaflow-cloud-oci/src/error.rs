//! OCI provider error types

use instaflow_cloud::ProviderError;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OciError {
    #[error("oci CLI not found. Please install: https://docs.oracle.com/iaas/Content/API/SDKDocs/cliinstall.htm")]
    CliNotFound,

    #[error("oci service error: {}", .0.message.as_deref().unwrap_or("(no message)"))]
    Service(ServiceErrorBody),

    #[error("oci command failed: {0}")]
    CommandFailed(String),

    #[error("No availability domain found in compartment {0}")]
    NoAvailabilityDomain(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Body of a `ServiceError:` block printed by the CLI
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServiceErrorBody {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl From<OciError> for ProviderError {
    fn from(err: OciError) -> Self {
        match err {
            OciError::Service(body) => ProviderError::Service {
                status: body.status,
                code: body.code,
                message: body.message.unwrap_or_default(),
                retry_after: None,
            },
            e @ (OciError::CliNotFound | OciError::NoAvailabilityDomain(_)) => {
                ProviderError::InvalidConfig(e.to_string())
            }
            OciError::CommandFailed(msg) => ProviderError::CommandFailed(msg),
            OciError::JsonError(e) => ProviderError::Json(e),
            OciError::IoError(e) => ProviderError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, OciError>;

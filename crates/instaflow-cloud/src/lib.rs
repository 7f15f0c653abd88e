//! instaflow Cloud Provisioning
//!
//! This crate provides the provider abstraction used by instaflow to
//! create exactly one compute instance on a cloud provider.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 instaflow-core                   │
//! │           (Orchestrator::attempt)                │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                instaflow-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Provider Abstraction             │   │
//! │  │  trait ProvisioningClient { ... }         │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────────────┐    │
//! │  │ ResourceSpec │  │ CredentialMaterializer│    │
//! │  └──────────────┘  └──────────────────────┘    │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │  oracle-cloud │
//! │   (oci CLI)   │
//! └───────────────┘
//! ```

pub mod action;
pub mod credential;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod provider;

// Re-exports
pub use action::InstanceAction;
pub use credential::{
    CredentialError, CredentialMaterial, CredentialMaterializer, KeySecret, RawCredentials,
    SigningIdentity,
};
pub use error::{ProviderError, Result, SpecError};
#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockProvisioningClient;
pub use provider::{InstanceInfo, LifecycleState, ProvisioningClient, ResourceSpec, ShapeConfig};

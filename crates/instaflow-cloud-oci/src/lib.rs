//! Oracle Cloud provider for instaflow
//!
//! This crate implements the ProvisioningClient trait for Oracle Cloud
//! Infrastructure (OCI) by driving the `oci` CLI.
//!
//! # Features
//!
//! - Instance launch with flexible shape sizing
//! - Instance get/list
//! - Instance actions (start, stop, terminate)
//!
//! # Requirements
//!
//! - `oci` CLI must be installed
//! - No `~/.oci/config` is needed: identity and the key file path are passed
//!   to every invocation through `OCI_CLI_*` environment variables
//!
//! # Example
//!
//! ```ignore
//! use instaflow_cloud::{CredentialMaterializer, ProvisioningClient};
//! use instaflow_cloud_oci::OracleCloudProvider;
//!
//! let provider = OracleCloudProvider::new();
//! let credentials = CredentialMaterializer::new().materialize(&raw)?;
//! let instance = provider.create_instance(&credentials, &spec).await?;
//! credentials.close()?;
//! ```

pub mod error;
pub mod oci_cli;
pub mod provider;

pub use error::{OciError, Result};
pub use oci_cli::{AvailabilityDomain, LaunchConfig, OciCli, OciInstance};
pub use provider::OracleCloudProvider;

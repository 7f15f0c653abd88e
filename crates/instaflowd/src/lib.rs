//! instaflow daemon
//!
//! Wires settings, the Oracle Cloud provider and the orchestrator together and
//! exposes them over HTTP.

pub mod server;

use instaflow_cloud::ProvisioningClient;
use instaflow_cloud_oci::OracleCloudProvider;
use instaflow_config::Settings;
use instaflow_core::Orchestrator;
use std::sync::Arc;

/// Orchestrator configured from `settings` around `client`
pub fn build_orchestrator(
    settings: &Settings,
    client: Arc<dyn ProvisioningClient>,
) -> instaflow_config::Result<Orchestrator> {
    Ok(Orchestrator::new(client, settings.raw_credentials())
        .with_retry_policy(settings.retry_policy()?)
        .with_attempt_timeout(settings.attempt_timeout()?)
        .with_adopt_existing(settings.adopt_existing()?)
        .with_failure_notifications(settings.notify_failures()?)
        .with_notifier(settings.notification_sink()))
}

/// Orchestrator backed by the `oci` CLI
pub fn oracle_orchestrator(settings: &Settings) -> instaflow_config::Result<Orchestrator> {
    build_orchestrator(settings, Arc::new(OracleCloudProvider::new()))
}

//! Oracle Cloud provider implementation

use crate::error::OciError;
use crate::oci_cli::{LaunchConfig, OciCli, OciInstance};
use async_trait::async_trait;
use instaflow_cloud::{
    CredentialMaterial, InstanceAction, InstanceInfo, LifecycleState, ProvisioningClient,
    ResourceSpec,
};

/// Oracle Cloud provider
#[derive(Debug, Clone, Default)]
pub struct OracleCloudProvider {
    cli: OciCli,
}

impl From<OciInstance> for InstanceInfo {
    fn from(instance: OciInstance) -> Self {
        let lifecycle_state = serde_json::from_value(serde_json::Value::String(
            instance.lifecycle_state.clone(),
        ))
        .unwrap_or(LifecycleState::Unknown);

        Self {
            id: instance.id,
            display_name: instance.display_name,
            lifecycle_state,
            availability_domain: instance.availability_domain,
            shape: instance.shape,
            time_created: instance.time_created,
        }
    }
}

impl OracleCloudProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli(cli: OciCli) -> Self {
        Self { cli }
    }

    /// Use the configured availability domain, or the first one in the tenancy
    async fn resolve_availability_domain(
        &self,
        credentials: &CredentialMaterial,
        spec: &ResourceSpec,
    ) -> crate::Result<String> {
        if let Some(ad) = spec.availability_domain() {
            return Ok(ad.to_string());
        }

        let tenancy = &credentials.identity().tenancy;
        let domains = self.cli.list_availability_domains(credentials, tenancy).await?;
        let first = domains
            .into_iter()
            .next()
            .ok_or_else(|| OciError::NoAvailabilityDomain(tenancy.clone()))?;
        tracing::info!("No availability domain configured, using {}", first.name);
        Ok(first.name)
    }
}

#[async_trait]
impl ProvisioningClient for OracleCloudProvider {
    fn name(&self) -> &str {
        "oracle-cloud"
    }

    async fn create_instance(
        &self,
        credentials: &CredentialMaterial,
        spec: &ResourceSpec,
    ) -> instaflow_cloud::Result<InstanceInfo> {
        let availability_domain = self.resolve_availability_domain(credentials, spec).await?;

        let config = LaunchConfig {
            compartment_id: spec.compartment_id().to_string(),
            availability_domain,
            display_name: spec.display_name().to_string(),
            shape: spec.shape().to_string(),
            shape_config: spec.shape_config(),
            image_id: spec.image_id().to_string(),
            subnet_id: spec.subnet_id().to_string(),
            ssh_authorized_keys: spec.ssh_public_key().map(str::to_string),
            boot_volume_size_gbs: spec.boot_volume_size_gbs(),
            assign_public_ip: spec.assign_public_ip(),
        };

        tracing::info!(
            shape = %config.shape,
            availability_domain = %config.availability_domain,
            "Launching instance: {}",
            config.display_name
        );

        let instance = self.cli.launch_instance(credentials, &config).await?;
        Ok(instance.into())
    }

    async fn get_instance(
        &self,
        credentials: &CredentialMaterial,
        id: &str,
    ) -> instaflow_cloud::Result<InstanceInfo> {
        let instance = self.cli.get_instance(credentials, id).await?;
        Ok(instance.into())
    }

    async fn list_instances(
        &self,
        credentials: &CredentialMaterial,
        compartment_id: &str,
    ) -> instaflow_cloud::Result<Vec<InstanceInfo>> {
        let instances = self.cli.list_instances(credentials, compartment_id).await?;
        Ok(instances.into_iter().map(InstanceInfo::from).collect())
    }

    async fn perform_action(
        &self,
        credentials: &CredentialMaterial,
        id: &str,
        action: InstanceAction,
    ) -> instaflow_cloud::Result<InstanceInfo> {
        tracing::info!("Performing {} on instance {}", action, id);

        let instance = match action {
            InstanceAction::Start | InstanceAction::Stop => {
                self.cli.instance_action(credentials, id, action).await?
            }
            InstanceAction::Terminate => {
                self.cli.terminate_instance(credentials, id).await?;
                self.cli.get_instance(credentials, id).await?
            }
        };
        Ok(instance.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oci_instance(state: &str) -> OciInstance {
        OciInstance {
            id: "ocid1.instance.oc1..x".to_string(),
            display_name: "auto-instance".to_string(),
            lifecycle_state: state.to_string(),
            availability_domain: Some("kIdk:ME-ABUDHABI-1-AD-1".to_string()),
            shape: Some("VM.Standard.A1.Flex".to_string()),
            time_created: None,
        }
    }

    #[test]
    fn test_instance_conversion() {
        let info: InstanceInfo = oci_instance("RUNNING").into();
        assert_eq!(info.lifecycle_state, LifecycleState::Running);
        assert_eq!(info.display_name, "auto-instance");

        let info: InstanceInfo = oci_instance("CREATING_IMAGE").into();
        assert_eq!(info.lifecycle_state, LifecycleState::CreatingImage);

        let info: InstanceInfo = oci_instance("SOMETHING_NEW").into();
        assert_eq!(info.lifecycle_state, LifecycleState::Unknown);
    }

    #[test]
    fn test_service_error_conversion() {
        let err: instaflow_cloud::ProviderError =
            crate::oci_cli::parse_cli_error(r#"ServiceError: {"status": 429, "code": "TooManyRequests", "message": "Too many requests for the user"}"#).into();
        match err {
            instaflow_cloud::ProviderError::Service { status, code, .. } => {
                assert_eq!(status, Some(429));
                assert_eq!(code.as_deref(), Some("TooManyRequests"));
            }
            other => panic!("Expected Service error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_cli_is_configuration_error() {
        let err: instaflow_cloud::ProviderError = OciError::CliNotFound.into();
        assert!(matches!(err, instaflow_cloud::ProviderError::InvalidConfig(_)));
    }
}

//! oci CLI wrapper
//!
//! Wraps the `oci` CLI commands for compute instance operations.

use crate::error::{OciError, Result, ServiceErrorBody};
use chrono::{DateTime, Utc};
use instaflow_cloud::{CredentialMaterial, InstanceAction, ShapeConfig};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

const DEFAULT_BINARY: &str = "oci";

/// oci CLI wrapper
#[derive(Debug, Clone)]
pub struct OciCli {
    binary: String,
}

impl Default for OciCli {
    fn default() -> Self {
        Self::new()
    }
}

impl OciCli {
    pub fn new() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run an oci command and return stdout
    ///
    /// Credentials go through `OCI_CLI_*` variables so that no config file
    /// is needed next to the transient key file.
    async fn run_command(&self, credentials: &CredentialMaterial, args: &[String]) -> Result<String> {
        let identity = credentials.identity();

        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd.env("OCI_CLI_USER", &identity.user)
            .env("OCI_CLI_TENANCY", &identity.tenancy)
            .env("OCI_CLI_FINGERPRINT", &identity.fingerprint)
            .env("OCI_CLI_REGION", &identity.region)
            .env("OCI_CLI_KEY_FILE", credentials.key_path())
            .env("OCI_CLI_SUPPRESS_FILE_PERMISSIONS_WARNING", "True");
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // A cancelled or timed-out attempt must not leave the CLI running
        cmd.kill_on_drop(true);

        tracing::debug!("Running: {} {}", self.binary, redact_args(args).join(" "));

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OciError::CliNotFound);
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(parse_cli_error(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Launch an instance
    pub async fn launch_instance(
        &self,
        credentials: &CredentialMaterial,
        config: &LaunchConfig,
    ) -> Result<OciInstance> {
        let output = self.run_command(credentials, &config.to_args()?).await?;
        let response: DataEnvelope<OciInstance> = serde_json::from_str(&output)?;
        Ok(response.data)
    }

    /// Get an instance by OCID
    pub async fn get_instance(&self, credentials: &CredentialMaterial, id: &str) -> Result<OciInstance> {
        let args = strings(&["compute", "instance", "get", "--instance-id", id]);
        let output = self.run_command(credentials, &args).await?;
        let response: DataEnvelope<OciInstance> = serde_json::from_str(&output)?;
        Ok(response.data)
    }

    /// List all instances in a compartment
    pub async fn list_instances(
        &self,
        credentials: &CredentialMaterial,
        compartment_id: &str,
    ) -> Result<Vec<OciInstance>> {
        let args = strings(&[
            "compute",
            "instance",
            "list",
            "--compartment-id",
            compartment_id,
            "--all",
        ]);
        let output = self.run_command(credentials, &args).await?;

        // The CLI prints nothing at all for an empty list
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }

        let response: DataEnvelope<Vec<OciInstance>> = serde_json::from_str(&output)?;
        Ok(response.data)
    }

    /// Run a power action (START / STOP)
    pub async fn instance_action(
        &self,
        credentials: &CredentialMaterial,
        id: &str,
        action: InstanceAction,
    ) -> Result<OciInstance> {
        let args = strings(&[
            "compute",
            "instance",
            "action",
            "--instance-id",
            id,
            "--action",
            action.as_str(),
        ]);
        let output = self.run_command(credentials, &args).await?;
        let response: DataEnvelope<OciInstance> = serde_json::from_str(&output)?;
        Ok(response.data)
    }

    /// Terminate an instance (prints nothing on success)
    pub async fn terminate_instance(&self, credentials: &CredentialMaterial, id: &str) -> Result<()> {
        let args = strings(&["compute", "instance", "terminate", "--instance-id", id, "--force"]);
        self.run_command(credentials, &args).await?;
        Ok(())
    }

    /// List availability domains
    pub async fn list_availability_domains(
        &self,
        credentials: &CredentialMaterial,
        compartment_id: &str,
    ) -> Result<Vec<AvailabilityDomain>> {
        let args = strings(&[
            "iam",
            "availability-domain",
            "list",
            "--compartment-id",
            compartment_id,
        ]);
        let output = self.run_command(credentials, &args).await?;

        if output.trim().is_empty() {
            return Ok(Vec::new());
        }

        let response: DataEnvelope<Vec<AvailabilityDomain>> = serde_json::from_str(&output)?;
        Ok(response.data)
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Metadata values can carry SSH keys; keep them out of debug logs
fn redact_args(args: &[String]) -> Vec<&str> {
    let mut redacted = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        if hide_next {
            redacted.push("<redacted>");
            hide_next = false;
        } else {
            hide_next = arg == "--metadata";
            redacted.push(arg.as_str());
        }
    }
    redacted
}

/// Turn CLI stderr into an error, extracting the `ServiceError:` JSON body if present
pub(crate) fn parse_cli_error(stderr: &str) -> OciError {
    if let (Some(start), Some(end)) = (stderr.find('{'), stderr.rfind('}')) {
        if start < end {
            if let Ok(body) = serde_json::from_str::<ServiceErrorBody>(&stderr[start..=end]) {
                if body.code.is_some() || body.status.is_some() {
                    return OciError::Service(body);
                }
            }
        }
    }
    OciError::CommandFailed(stderr.trim().to_string())
}

/// `{"data": ...}` wrapper around every CLI response
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// Instance information from the oci CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OciInstance {
    pub id: String,

    #[serde(default)]
    pub display_name: String,

    pub lifecycle_state: String,

    #[serde(default)]
    pub availability_domain: Option<String>,

    #[serde(default)]
    pub shape: Option<String>,

    #[serde(default)]
    pub time_created: Option<DateTime<Utc>>,
}

/// Availability domain from the oci CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityDomain {
    pub name: String,
}

/// Configuration for launching an instance
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub compartment_id: String,
    pub availability_domain: String,
    pub display_name: String,
    pub shape: String,
    pub shape_config: Option<ShapeConfig>,
    pub image_id: String,
    pub subnet_id: String,
    pub ssh_authorized_keys: Option<String>,
    pub boot_volume_size_gbs: Option<u32>,
    pub assign_public_ip: bool,
}

impl LaunchConfig {
    /// Build `oci compute instance launch` arguments
    ///
    /// Sizing goes out as JSON numbers; the API rejects string-typed values.
    pub fn to_args(&self) -> Result<Vec<String>> {
        let mut args = strings(&[
            "compute",
            "instance",
            "launch",
            "--compartment-id",
            self.compartment_id.as_str(),
            "--availability-domain",
            self.availability_domain.as_str(),
            "--display-name",
            self.display_name.as_str(),
            "--shape",
            self.shape.as_str(),
            "--image-id",
            self.image_id.as_str(),
            "--subnet-id",
            self.subnet_id.as_str(),
            "--assign-public-ip",
            if self.assign_public_ip { "true" } else { "false" },
        ]);

        if let Some(shape_config) = &self.shape_config {
            args.push("--shape-config".to_string());
            args.push(serde_json::to_string(shape_config)?);
        }

        if let Some(size) = self.boot_volume_size_gbs {
            args.push("--boot-volume-size-in-gbs".to_string());
            args.push(size.to_string());
        }

        if let Some(keys) = &self.ssh_authorized_keys {
            args.push("--metadata".to_string());
            args.push(serde_json::json!({ "ssh_authorized_keys": keys }).to_string());
        }

        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch_config() -> LaunchConfig {
        LaunchConfig {
            compartment_id: "ocid1.tenancy.oc1..aaaa".to_string(),
            availability_domain: "kIdk:ME-ABUDHABI-1-AD-1".to_string(),
            display_name: "auto-instance".to_string(),
            shape: "VM.Standard.A1.Flex".to_string(),
            shape_config: Some(ShapeConfig::new(4.0, 24.0).unwrap()),
            image_id: "ocid1.image.oc1.me-abudhabi-1.aaaa".to_string(),
            subnet_id: "ocid1.subnet.oc1.me-abudhabi-1.aaaa".to_string(),
            ssh_authorized_keys: Some("ssh-ed25519 AAAAC3Nz test@host".to_string()),
            boot_volume_size_gbs: None,
            assign_public_ip: true,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_launch_args_shape_config_numbers() {
        let args = launch_config().to_args().unwrap();
        let shape_config: serde_json::Value =
            serde_json::from_str(value_after(&args, "--shape-config").unwrap()).unwrap();
        assert!(shape_config["ocpus"].is_number());
        assert!(shape_config["memoryInGBs"].is_number());
        assert_eq!(shape_config["memoryInGBs"].as_f64(), Some(24.0));
    }

    #[test]
    fn test_launch_args_metadata() {
        let args = launch_config().to_args().unwrap();
        let metadata: serde_json::Value =
            serde_json::from_str(value_after(&args, "--metadata").unwrap()).unwrap();
        assert_eq!(metadata["ssh_authorized_keys"], "ssh-ed25519 AAAAC3Nz test@host");
        assert_eq!(value_after(&args, "--shape"), Some("VM.Standard.A1.Flex"));
        assert!(value_after(&args, "--boot-volume-size-in-gbs").is_none());
    }

    #[test]
    fn test_redact_metadata_arg() {
        let args = launch_config().to_args().unwrap();
        let redacted = redact_args(&args).join(" ");
        assert!(!redacted.contains("ssh-ed25519"));
        assert!(redacted.contains("--metadata <redacted>"));
    }

    #[test]
    fn test_parse_service_error() {
        let stderr = r#"ServiceError:
{
    "client_version": "Oracle-PythonSDK/2.126.0, Oracle-PythonCLI/3.40.0",
    "code": "InternalError",
    "message": "Out of host capacity.",
    "opc-request-id": "ABCD/EFGH",
    "operation_name": "launch_instance",
    "status": 500,
    "target_service": "compute"
}
"#;
        match parse_cli_error(stderr) {
            OciError::Service(body) => {
                assert_eq!(body.status, Some(500));
                assert_eq!(body.code.as_deref(), Some("InternalError"));
                assert_eq!(body.message.as_deref(), Some("Out of host capacity."));
            }
            other => panic!("Expected Service error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_usage_error() {
        let stderr = "Usage: oci compute instance launch [OPTIONS]\n\nError: Missing option(s) --subnet-id.\n";
        match parse_cli_error(stderr) {
            OciError::CommandFailed(msg) => assert!(msg.contains("Missing option(s) --subnet-id")),
            other => panic!("Expected CommandFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_instance_response() {
        let output = r#"{
  "data": {
    "availability-domain": "kIdk:ME-ABUDHABI-1-AD-1",
    "display-name": "auto-instance",
    "id": "ocid1.instance.oc1.me-abudhabi-1.anqxe",
    "lifecycle-state": "PROVISIONING",
    "shape": "VM.Standard.A1.Flex",
    "time-created": "2024-05-01T10:20:30.123000+00:00"
  },
  "etag": "abc"
}"#;
        let response: DataEnvelope<OciInstance> = serde_json::from_str(output).unwrap();
        let instance = response.data;
        assert_eq!(instance.id, "ocid1.instance.oc1.me-abudhabi-1.anqxe");
        assert_eq!(instance.lifecycle_state, "PROVISIONING");
        assert!(instance.time_created.is_some());
    }
}

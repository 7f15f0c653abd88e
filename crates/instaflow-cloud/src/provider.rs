//! Provisioning client trait definition

use crate::action::InstanceAction;
use crate::credential::CredentialMaterial;
use crate::error::{Result, SpecError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cloud provider abstraction trait
///
/// A provisioning client performs the actual create/get/list/action calls
/// against a cloud provider. Every call receives the credential material
/// materialized for the attempt in flight; implementations must not keep
/// it beyond the call.
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Returns the provider name (e.g., "oracle-cloud")
    fn name(&self) -> &str;

    /// Create a new instance
    async fn create_instance(
        &self,
        credentials: &CredentialMaterial,
        spec: &ResourceSpec,
    ) -> Result<InstanceInfo>;

    /// Get a single instance by provider id
    async fn get_instance(&self, credentials: &CredentialMaterial, id: &str)
    -> Result<InstanceInfo>;

    /// List all instances in a compartment
    async fn list_instances(
        &self,
        credentials: &CredentialMaterial,
        compartment_id: &str,
    ) -> Result<Vec<InstanceInfo>>;

    /// Perform a lifecycle action on an instance
    async fn perform_action(
        &self,
        credentials: &CredentialMaterial,
        id: &str,
        action: InstanceAction,
    ) -> Result<InstanceInfo>;
}

/// CPU/memory sizing for flexible shapes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShapeConfig {
    ocpus: f32,
    #[serde(rename = "memoryInGBs")]
    memory_in_gbs: f32,
}

impl ShapeConfig {
    pub fn new(ocpus: f32, memory_in_gbs: f32) -> std::result::Result<Self, SpecError> {
        if !(ocpus.is_finite() && ocpus > 0.0) {
            return Err(SpecError::InvalidSizing {
                field: "ocpus",
                value: ocpus,
            });
        }
        if !(memory_in_gbs.is_finite() && memory_in_gbs > 0.0) {
            return Err(SpecError::InvalidSizing {
                field: "memory_in_gbs",
                value: memory_in_gbs,
            });
        }
        Ok(Self {
            ocpus,
            memory_in_gbs,
        })
    }

    pub fn ocpus(&self) -> f32 {
        self.ocpus
    }

    pub fn memory_in_gbs(&self) -> f32 {
        self.memory_in_gbs
    }
}

/// Immutable description of the instance to create
///
/// All string fields are trimmed on the way in; optional fields that are
/// empty after trimming are stored as `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSpec {
    compartment_id: String,
    shape: String,
    image_id: String,
    subnet_id: String,
    display_name: String,
    shape_config: Option<ShapeConfig>,
    availability_domain: Option<String>,
    ssh_public_key: Option<String>,
    boot_volume_size_gbs: Option<u32>,
    assign_public_ip: bool,
}

pub const DEFAULT_DISPLAY_NAME: &str = "auto-instance";

fn trimmed(value: impl Into<String>) -> String {
    let value = value.into();
    let trimmed = value.trim();
    if trimmed.len() == value.len() {
        value
    } else {
        trimmed.to_string()
    }
}

fn trimmed_opt(value: Option<String>) -> Option<String> {
    value.map(trimmed).filter(|v| !v.is_empty())
}

impl ResourceSpec {
    pub fn new(
        compartment_id: impl Into<String>,
        shape: impl Into<String>,
        image_id: impl Into<String>,
        subnet_id: impl Into<String>,
    ) -> Self {
        Self {
            compartment_id: trimmed(compartment_id),
            shape: trimmed(shape),
            image_id: trimmed(image_id),
            subnet_id: trimmed(subnet_id),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            shape_config: None,
            availability_domain: None,
            ssh_public_key: None,
            boot_volume_size_gbs: None,
            assign_public_ip: true,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = trimmed(display_name);
        self
    }

    pub fn with_shape_config(mut self, shape_config: ShapeConfig) -> Self {
        self.shape_config = Some(shape_config);
        self
    }

    pub fn with_availability_domain(mut self, availability_domain: Option<String>) -> Self {
        self.availability_domain = trimmed_opt(availability_domain);
        self
    }

    pub fn with_ssh_public_key(mut self, ssh_public_key: Option<String>) -> Self {
        self.ssh_public_key = trimmed_opt(ssh_public_key);
        self
    }

    pub fn with_boot_volume_size_gbs(mut self, size: Option<u32>) -> Self {
        self.boot_volume_size_gbs = size.filter(|s| *s > 0);
        self
    }

    pub fn with_public_ip(mut self, assign: bool) -> Self {
        self.assign_public_ip = assign;
        self
    }

    /// Check that every field the provider requires is present
    pub fn validate(&self) -> std::result::Result<(), SpecError> {
        let required = [
            ("compartment_id", &self.compartment_id),
            ("shape", &self.shape),
            ("image_id", &self.image_id),
            ("subnet_id", &self.subnet_id),
            ("display_name", &self.display_name),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(SpecError::MissingField(field));
            }
        }
        Ok(())
    }

    pub fn compartment_id(&self) -> &str {
        &self.compartment_id
    }

    pub fn shape(&self) -> &str {
        &self.shape
    }

    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn subnet_id(&self) -> &str {
        &self.subnet_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn shape_config(&self) -> Option<ShapeConfig> {
        self.shape_config
    }

    pub fn availability_domain(&self) -> Option<&str> {
        self.availability_domain.as_deref()
    }

    pub fn ssh_public_key(&self) -> Option<&str> {
        self.ssh_public_key.as_deref()
    }

    pub fn boot_volume_size_gbs(&self) -> Option<u32> {
        self.boot_volume_size_gbs
    }

    pub fn assign_public_ip(&self) -> bool {
        self.assign_public_ip
    }
}

/// Lifecycle state of an instance as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Moving,
    Provisioning,
    Running,
    Starting,
    Stopping,
    Stopped,
    CreatingImage,
    Terminating,
    Terminated,
    #[serde(other)]
    Unknown,
}

impl LifecycleState {
    /// Whether the instance still exists (or is about to)
    pub fn is_live(&self) -> bool {
        !matches!(
            self,
            LifecycleState::Terminating | LifecycleState::Terminated
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Moving => "MOVING",
            LifecycleState::Provisioning => "PROVISIONING",
            LifecycleState::Running => "RUNNING",
            LifecycleState::Starting => "STARTING",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Stopped => "STOPPED",
            LifecycleState::CreatingImage => "CREATING_IMAGE",
            LifecycleState::Terminating => "TERMINATING",
            LifecycleState::Terminated => "TERMINATED",
            LifecycleState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Instance as returned by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Provider-specific resource ID
    pub id: String,

    pub display_name: String,

    pub lifecycle_state: LifecycleState,

    pub availability_domain: Option<String>,

    pub shape: Option<String>,

    pub time_created: Option<DateTime<Utc>>,
}

impl InstanceInfo {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        lifecycle_state: LifecycleState,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            lifecycle_state,
            availability_domain: None,
            shape: None,
            time_created: None,
        }
    }

    pub fn with_lifecycle_state(mut self, lifecycle_state: LifecycleState) -> Self {
        self.lifecycle_state = lifecycle_state;
        self
    }
}

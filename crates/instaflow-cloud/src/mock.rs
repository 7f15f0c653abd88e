//! Scripted provisioning client for tests

use crate::action::InstanceAction;
use crate::credential::CredentialMaterial;
use crate::error::{ProviderError, Result};
use crate::provider::{InstanceInfo, LifecycleState, ProvisioningClient, ResourceSpec};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory [`ProvisioningClient`]
///
/// `create_instance` pops scripted results in order and succeeds with a
/// generated id once the script runs out. Created instances show up in
/// `list_instances` and `get_instance`.
#[derive(Default)]
pub struct MockProvisioningClient {
    create_script: Mutex<VecDeque<Result<InstanceInfo>>>,
    list_script: Mutex<VecDeque<ProviderError>>,
    instances: Mutex<Vec<InstanceInfo>>,
    create_delay: Option<Duration>,
    create_calls: AtomicUsize,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    action_calls: AtomicUsize,
    observed_keys: Mutex<Vec<(PathBuf, bool)>>,
}

impl MockProvisioningClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every create call for `delay` before answering
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    /// Pretend an instance already exists in the compartment
    pub fn with_existing(self, instance: InstanceInfo) -> Self {
        self.lock_instances().push(instance);
        self
    }

    pub fn push_create_error(&self, error: ProviderError) {
        self.lock_create().push_back(Err(error));
    }

    pub fn push_create_success(&self, instance: InstanceInfo) {
        self.lock_create().push_back(Ok(instance));
    }

    pub fn push_list_error(&self, error: ProviderError) {
        self.list_script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn action_calls(&self) -> usize {
        self.action_calls.load(Ordering::SeqCst)
    }

    /// Key paths seen by provider calls, with whether the file existed at call time
    pub fn observed_keys(&self) -> Vec<(PathBuf, bool)> {
        self.observed_keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_create(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<InstanceInfo>>> {
        self.create_script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_instances(&self) -> std::sync::MutexGuard<'_, Vec<InstanceInfo>> {
        self.instances.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn observe(&self, credentials: &CredentialMaterial) {
        let path = credentials.key_path().to_path_buf();
        let exists = path.exists();
        self.observed_keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((path, exists));
    }

    fn find(&self, id: &str) -> Result<InstanceInfo> {
        self.lock_instances()
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| ProviderError::ResourceNotFound(id.to_string()))
    }
}

#[async_trait]
impl ProvisioningClient for MockProvisioningClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_instance(
        &self,
        credentials: &CredentialMaterial,
        spec: &ResourceSpec,
    ) -> Result<InstanceInfo> {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.observe(credentials);

        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.lock_create().pop_front();
        let instance = match scripted {
            Some(result) => result?,
            None => InstanceInfo::new(
                format!("ocid1.instance.oc1..mock{}", call),
                spec.display_name(),
                LifecycleState::Provisioning,
            ),
        };
        self.lock_instances().push(instance.clone());
        Ok(instance)
    }

    async fn get_instance(
        &self,
        credentials: &CredentialMaterial,
        id: &str,
    ) -> Result<InstanceInfo> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.observe(credentials);
        self.find(id)
    }

    async fn list_instances(
        &self,
        credentials: &CredentialMaterial,
        _compartment_id: &str,
    ) -> Result<Vec<InstanceInfo>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.observe(credentials);
        let scripted = self
            .list_script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }
        Ok(self.lock_instances().clone())
    }

    async fn perform_action(
        &self,
        credentials: &CredentialMaterial,
        id: &str,
        action: InstanceAction,
    ) -> Result<InstanceInfo> {
        self.action_calls.fetch_add(1, Ordering::SeqCst);
        self.observe(credentials);
        let state = match action {
            InstanceAction::Start => LifecycleState::Starting,
            InstanceAction::Stop => LifecycleState::Stopping,
            InstanceAction::Terminate => LifecycleState::Terminating,
        };
        let mut instances = self.lock_instances();
        let instance = instances
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| ProviderError::ResourceNotFound(id.to_string()))?;
        instance.lifecycle_state = state;
        Ok(instance.clone())
    }
}

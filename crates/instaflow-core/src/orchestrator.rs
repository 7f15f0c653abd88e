//! Provisioning attempt orchestrator

use crate::classifier::ErrorClassifier;
use crate::notify::{NotificationSink, TracingNotifier};
use crate::outcome::{AttemptOutcome, OutcomeKind};
use crate::retry::RetryPolicy;
use crate::status::{OrchestratorState, StatusReader, StatusSnapshot, StatusStore};
use chrono::{DateTime, TimeDelta, Utc};
use instaflow_cloud::{
    CredentialMaterial, CredentialMaterializer, InstanceAction, InstanceInfo, ProviderError,
    ProvisioningClient, RawCredentials, ResourceSpec,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(300);
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from instance queries made after provisioning
#[derive(Debug, thiserror::Error)]
pub enum InstanceQueryError {
    #[error("No instance has been provisioned yet")]
    NotProvisioned,

    #[error("{0}")]
    Failed(AttemptOutcome),
}

impl InstanceQueryError {
    pub fn kind(&self) -> Option<OutcomeKind> {
        match self {
            InstanceQueryError::NotProvisioned => None,
            InstanceQueryError::Failed(outcome) => Some(outcome.kind()),
        }
    }
}

/// Notification bookkeeping carried across attempts
#[derive(Debug, Default)]
struct AttemptLedger {
    /// Last failure kind a notification was sent for
    last_failure_notified: Option<OutcomeKind>,
}

/// Resets `Attempting` if an attempt future is dropped before it records
struct AttemptingGuard<'a> {
    status: &'a StatusStore,
    armed: bool,
}

impl Drop for AttemptingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.status.update(|s| {
            if s.state == OrchestratorState::Attempting {
                s.state = OrchestratorState::Idle;
                s.message = "Attempt cancelled".to_string();
            }
        });
        tracing::warn!("Provisioning attempt cancelled before completion");
    }
}

/// Drives provisioning attempts and owns the status store
///
/// `attempt()` never returns an error: every failure is folded into the
/// returned [`StatusSnapshot`]. At most one attempt contacts the provider at a
/// time, and once an instance has been created no further create call is made.
pub struct Orchestrator {
    client: Arc<dyn ProvisioningClient>,
    credentials: RawCredentials,
    materializer: CredentialMaterializer,
    notifier: Arc<dyn NotificationSink>,
    classifier: ErrorClassifier,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    adopt_existing: bool,
    notify_failures: bool,
    status: StatusStore,
    in_flight: Mutex<AttemptLedger>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn ProvisioningClient>, credentials: RawCredentials) -> Self {
        let retry = RetryPolicy::default();
        Self {
            client,
            credentials,
            materializer: CredentialMaterializer::new(),
            notifier: Arc::new(TracingNotifier),
            classifier: ErrorClassifier::new(retry.rate_limit_cooldown),
            retry,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            adopt_existing: true,
            notify_failures: false,
            status: StatusStore::new(),
            in_flight: Mutex::new(AttemptLedger::default()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.classifier = ErrorClassifier::new(retry.rate_limit_cooldown);
        self.retry = retry;
        self
    }

    pub fn with_materializer(mut self, materializer: CredentialMaterializer) -> Self {
        self.materializer = materializer;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Treat a live instance with the same display name as already created
    pub fn with_adopt_existing(mut self, adopt: bool) -> Self {
        self.adopt_existing = adopt;
        self
    }

    /// Also notify on failures that need operator action
    pub fn with_failure_notifications(mut self, enabled: bool) -> Self {
        self.notify_failures = enabled;
        self
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.read()
    }

    pub fn subscribe(&self) -> StatusReader {
        self.status.reader()
    }

    /// Run one provisioning attempt unless one is not permitted right now
    ///
    /// Returns the current snapshot without contacting the provider when the
    /// orchestrator is terminal, another attempt is in flight, or a
    /// rate-limit cool-down is still running.
    pub async fn attempt(&self, spec: &ResourceSpec) -> StatusSnapshot {
        let now = Utc::now();
        // Claiming the attempt and publishing `Attempting` is one store
        // update, so a rejected caller always observes the in-flight state.
        let (claimed, started) = self.status.update_if(|s| {
            if s.state.is_terminal()
                || s.state == OrchestratorState::Attempting
                || rate_limit_cooldown_until(s, now).is_some()
            {
                return false;
            }
            s.state = OrchestratorState::Attempting;
            s.last_attempt_at = Some(now);
            s.attempts += 1;
            s.message = "Provisioning attempt in progress".to_string();
            true
        });
        if !claimed {
            match &started.state {
                OrchestratorState::Attempting => tracing::debug!("Attempt already in flight"),
                state if state.is_terminal() => {
                    tracing::debug!("Orchestrator is {}, skipping attempt", state)
                }
                _ => tracing::info!(
                    "Rate limit cool-down active until {:?}, skipping attempt",
                    started.next_attempt_at
                ),
            }
            return started;
        }

        let mut guard = AttemptingGuard {
            status: &self.status,
            armed: true,
        };
        // Held only while a previous attempt finishes notifying.
        let mut ledger = self.in_flight.lock().await;

        tracing::info!(
            attempt = started.attempts,
            provider = self.client.name(),
            shape = spec.shape(),
            "Starting provisioning attempt"
        );

        let outcome = self.run_attempt(spec).await;
        let snapshot = self.record(&outcome);
        guard.armed = false;

        match &outcome {
            AttemptOutcome::Success { .. } => tracing::info!("{}", outcome),
            other if other.kind().is_auto_retryable() => tracing::warn!(
                kind = %other.kind(),
                next_attempt_at = ?snapshot.next_attempt_at,
                "{}",
                other
            ),
            other => tracing::error!(kind = %other.kind(), "{}", other),
        }

        self.notify(&mut ledger, &outcome).await;
        snapshot
    }

    /// Stop issuing attempts
    ///
    /// A succeeded orchestrator keeps its `Succeeded` state so the resource id
    /// stays visible.
    pub fn stop(&self) -> StatusSnapshot {
        let snapshot = self.status.update(|s| {
            if s.is_succeeded() {
                return;
            }
            s.state = OrchestratorState::Exhausted;
            s.next_attempt_at = None;
            s.message = "Stopped by operator".to_string();
        });
        tracing::info!("Orchestrator stopped ({})", snapshot.state);
        snapshot
    }

    /// Fetch the provisioned instance from the provider
    pub async fn inspect(&self) -> Result<InstanceInfo, InstanceQueryError> {
        let id = self.provisioned_id()?;
        self.with_credentials(|client, creds| async move {
            client.get_instance(&creds, &id).await.map(|i| (creds, i))
        })
        .await
    }

    /// Start, stop or terminate the provisioned instance
    pub async fn perform(&self, action: InstanceAction) -> Result<InstanceInfo, InstanceQueryError> {
        let id = self.provisioned_id()?;
        tracing::info!("Requested {} on instance {}", action, id);
        self.with_credentials(|client, creds| async move {
            client
                .perform_action(&creds, &id, action)
                .await
                .map(|i| (creds, i))
        })
        .await
    }

    fn provisioned_id(&self) -> Result<String, InstanceQueryError> {
        self.status
            .read()
            .state
            .resource_id()
            .map(str::to_string)
            .ok_or(InstanceQueryError::NotProvisioned)
    }

    /// Materialize credentials, run `call` under the attempt timeout, clean up
    async fn with_credentials<F, Fut>(&self, call: F) -> Result<InstanceInfo, InstanceQueryError>
    where
        F: FnOnce(Arc<dyn ProvisioningClient>, CredentialMaterial) -> Fut,
        Fut: Future<Output = instaflow_cloud::Result<(CredentialMaterial, InstanceInfo)>>,
    {
        let creds = self
            .materializer
            .materialize(&self.credentials)
            .map_err(|e| InstanceQueryError::Failed(self.classifier.classify_credential(&e)))?;

        // The key file is owned by the call future; dropping it on timeout
        // removes the file.
        let result = tokio::time::timeout(self.attempt_timeout, call(self.client.clone(), creds))
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.attempt_timeout)));

        match result {
            Ok((creds, instance)) => {
                release(creds);
                Ok(instance)
            }
            Err(e) => Err(InstanceQueryError::Failed(self.classifier.classify(&e))),
        }
    }

    async fn run_attempt(&self, spec: &ResourceSpec) -> AttemptOutcome {
        if let Err(e) = spec.validate() {
            return self.classifier.classify_spec(&e);
        }

        let creds = match self.materializer.materialize(&self.credentials) {
            Ok(creds) => creds,
            Err(e) => return self.classifier.classify_credential(&e),
        };

        let result = tokio::time::timeout(self.attempt_timeout, self.provision(&creds, spec))
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.attempt_timeout)));
        release(creds);

        match result {
            Ok(instance) => AttemptOutcome::Success {
                resource_id: instance.id,
                lifecycle_state: instance.lifecycle_state,
            },
            Err(e) => self.classifier.classify(&e),
        }
    }

    async fn provision(
        &self,
        creds: &CredentialMaterial,
        spec: &ResourceSpec,
    ) -> instaflow_cloud::Result<InstanceInfo> {
        if self.adopt_existing {
            let instances = self
                .client
                .list_instances(creds, spec.compartment_id())
                .await?;
            if let Some(existing) = instances
                .into_iter()
                .find(|i| i.display_name == spec.display_name() && i.lifecycle_state.is_live())
            {
                tracing::info!(
                    "Adopting existing instance {} ({})",
                    existing.id,
                    existing.lifecycle_state
                );
                return Ok(existing);
            }
        }

        let instance = self.client.create_instance(creds, spec).await?;
        if instance.id.trim().is_empty() {
            return Err(ProviderError::CommandFailed(
                "provider returned an instance without an id".to_string(),
            ));
        }
        Ok(instance)
    }

    fn record(&self, outcome: &AttemptOutcome) -> StatusSnapshot {
        let now = Utc::now();
        self.status.update(|s| {
            s.last_outcome_kind = Some(outcome.kind());
            s.message = outcome.to_string();

            if let AttemptOutcome::Success { resource_id, .. } = outcome {
                s.state = OrchestratorState::Succeeded {
                    resource_id: resource_id.clone(),
                };
                s.consecutive_failures = 0;
                s.next_attempt_at = None;
                return;
            }

            s.consecutive_failures = s.consecutive_failures.saturating_add(1);
            if s.state == OrchestratorState::Exhausted {
                // stopped while the attempt was in flight
                s.next_attempt_at = None;
                return;
            }
            s.state = OrchestratorState::Idle;
            s.next_attempt_at = self
                .retry
                .delay_after(outcome, s.consecutive_failures)
                .map(|delay| add_delay(now, delay));
        })
    }

    async fn notify(&self, ledger: &mut AttemptLedger, outcome: &AttemptOutcome) {
        let kind = outcome.kind();
        let text = match outcome {
            AttemptOutcome::Success { .. } => format!("✅ {}", outcome),
            _ if kind.is_auto_retryable() => {
                ledger.last_failure_notified = None;
                return;
            }
            _ if !self.notify_failures || ledger.last_failure_notified == Some(kind) => return,
            _ => {
                ledger.last_failure_notified = Some(kind);
                format!("⚠️ {}", outcome)
            }
        };

        match tokio::time::timeout(NOTIFY_TIMEOUT, self.notifier.send(&text)).await {
            Ok(Ok(())) => tracing::debug!("Notification sent via {}", self.notifier.name()),
            Ok(Err(e)) => tracing::warn!("Failed to send notification: {}", e),
            Err(_) => tracing::warn!("Notification via {} timed out", self.notifier.name()),
        }
    }
}

fn release(creds: CredentialMaterial) {
    if let Err(e) = creds.close() {
        tracing::warn!("Failed to remove transient key file: {}", e);
    }
}

fn add_delay(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn rate_limit_cooldown_until(snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if snapshot.last_outcome_kind != Some(OutcomeKind::RateLimited) {
        return None;
    }
    snapshot.next_attempt_at.filter(|until| *until > now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_only_after_rate_limit() {
        let now = Utc::now();
        let mut snapshot = StatusSnapshot {
            last_outcome_kind: Some(OutcomeKind::CapacityExhausted),
            next_attempt_at: Some(now + TimeDelta::seconds(60)),
            ..StatusSnapshot::default()
        };
        assert_eq!(rate_limit_cooldown_until(&snapshot, now), None);

        snapshot.last_outcome_kind = Some(OutcomeKind::RateLimited);
        assert_eq!(
            rate_limit_cooldown_until(&snapshot, now),
            snapshot.next_attempt_at
        );
        assert_eq!(
            rate_limit_cooldown_until(&snapshot, now + TimeDelta::seconds(61)),
            None
        );
    }

    #[test]
    fn test_add_delay_saturates() {
        let now = Utc::now();
        assert_eq!(add_delay(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(
            add_delay(now, Duration::from_secs(120)),
            now + TimeDelta::seconds(120)
        );
    }
}

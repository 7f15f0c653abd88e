//! instaflow Core
//!
//! The provisioning attempt orchestrator: materializes credentials for a
//! single attempt, calls the provisioning client, classifies failures into a
//! fixed taxonomy, schedules retries and guarantees that a successful
//! creation is never repeated.
//!
//! ```text
//!  trigger / timer ──▶ Orchestrator::attempt()
//!                         │
//!                         ├─▶ CredentialMaterializer ─▶ transient key file
//!                         ├─▶ ProvisioningClient::create_instance
//!                         ├─▶ ErrorClassifier ─▶ AttemptOutcome
//!                         ├─▶ RetryPolicy ─▶ next_attempt_at
//!                         ├─▶ StatusStore (single writer)
//!                         └─▶ NotificationSink (best effort)
//! ```

pub mod classifier;
pub mod notify;
pub mod orchestrator;
pub mod outcome;
pub mod retry;
pub mod runner;
pub mod status;

pub use classifier::{DEFAULT_RATE_LIMIT_COOLDOWN, ErrorClassifier};
pub use notify::{
    FanoutNotifier, NotificationSink, NotifyError, TelegramNotifier, TracingNotifier,
    WebhookNotifier,
};
pub use orchestrator::{InstanceQueryError, Orchestrator};
pub use outcome::{AttemptOutcome, OutcomeKind};
pub use retry::RetryPolicy;
pub use runner::run_loop;
pub use status::{OrchestratorState, StatusReader, StatusSnapshot, StatusStore};

//! Orchestrator state and the status store
//!
//! The store keeps a single `StatusSnapshot` behind a `watch` channel: the
//! orchestrator is the only writer, readers clone whole snapshots and never
//! observe a half-applied update.

use crate::outcome::OutcomeKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Orchestrator state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Attempting,
    Succeeded { resource_id: String },
    Exhausted,
}

impl OrchestratorState {
    /// No further provisioning attempts are issued from a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestratorState::Succeeded { .. } | OrchestratorState::Exhausted
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Attempting => "attempting",
            OrchestratorState::Succeeded { .. } => "succeeded",
            OrchestratorState::Exhausted => "exhausted",
        }
    }

    pub fn resource_id(&self) -> Option<&str> {
        match self {
            OrchestratorState::Succeeded { resource_id } => Some(resource_id),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only projection of the orchestrator status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    #[serde(flatten)]
    pub state: OrchestratorState,

    /// When the last provider-contacting attempt started
    pub last_attempt_at: Option<DateTime<Utc>>,

    pub last_outcome_kind: Option<OutcomeKind>,

    pub message: String,

    /// Earliest time the scheduler will attempt again
    pub next_attempt_at: Option<DateTime<Utc>>,

    pub consecutive_failures: u32,

    /// Attempts issued so far
    pub attempts: u64,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: OrchestratorState::Idle,
            last_attempt_at: None,
            last_outcome_kind: None,
            message: "No attempt made yet".to_string(),
            next_attempt_at: None,
            consecutive_failures: 0,
            attempts: 0,
        }
    }
}

impl StatusSnapshot {
    pub fn is_succeeded(&self) -> bool {
        matches!(self.state, OrchestratorState::Succeeded { .. })
    }
}

/// Single-writer status store
#[derive(Debug)]
pub struct StatusStore {
    tx: watch::Sender<StatusSnapshot>,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StatusSnapshot::default());
        Self { tx }
    }

    pub fn read(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    pub fn write(&self, snapshot: StatusSnapshot) {
        self.tx.send_replace(snapshot);
    }

    /// Apply `f` atomically and return the resulting snapshot
    pub fn update<F>(&self, f: F) -> StatusSnapshot
    where
        F: FnOnce(&mut StatusSnapshot),
    {
        let mut updated = None;
        self.tx.send_modify(|snapshot| {
            f(snapshot);
            updated = Some(snapshot.clone());
        });
        updated.unwrap_or_else(|| self.read())
    }

    /// Apply `f` atomically, publishing only when it returns `true`
    ///
    /// Returns whether the snapshot changed along with the snapshot as it
    /// stands afterwards. Readers are not woken for a rejected change.
    pub fn update_if<F>(&self, f: F) -> (bool, StatusSnapshot)
    where
        F: FnOnce(&mut StatusSnapshot) -> bool,
    {
        let mut current = None;
        let changed = self.tx.send_if_modified(|snapshot| {
            let changed = f(snapshot);
            current = Some(snapshot.clone());
            changed
        });
        (changed, current.unwrap_or_else(|| self.read()))
    }

    pub fn reader(&self) -> StatusReader {
        StatusReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read handle to a [`StatusStore`]
#[derive(Debug, Clone)]
pub struct StatusReader {
    rx: watch::Receiver<StatusSnapshot>,
}

impl StatusReader {
    pub fn read(&self) -> StatusSnapshot {
        self.rx.borrow().clone()
    }

    /// Read and mark the current snapshot as seen
    pub fn read_latest(&mut self) -> StatusSnapshot {
        self.rx.borrow_and_update().clone()
    }

    /// Wait until a snapshot newer than the last seen one is written
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = StatusSnapshot {
            state: OrchestratorState::Succeeded {
                resource_id: "ocid1.instance.oc1..abc".to_string(),
            },
            last_outcome_kind: Some(OutcomeKind::Success),
            message: "Instance created".to_string(),
            ..StatusSnapshot::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "succeeded");
        assert_eq!(json["resource_id"], "ocid1.instance.oc1..abc");
        assert_eq!(json["last_outcome_kind"], "success");
        assert_eq!(json["message"], "Instance created");
        assert!(json["last_attempt_at"].is_null());

        let json = serde_json::to_value(StatusSnapshot::default()).unwrap();
        assert_eq!(json["state"], "idle");
        assert!(json.get("resource_id").is_none());
    }

    #[test]
    fn test_store_update_visible_to_readers() {
        let store = StatusStore::new();
        let reader = store.reader();

        let updated = store.update(|s| {
            s.state = OrchestratorState::Attempting;
            s.attempts += 1;
        });
        assert_eq!(updated.state, OrchestratorState::Attempting);
        assert_eq!(reader.read(), updated);
        assert_eq!(store.read().attempts, 1);
    }

    #[test]
    fn test_rejected_update_does_not_wake_readers() {
        let store = StatusStore::new();
        let mut reader = store.reader();
        reader.read_latest();

        let (changed, current) = store.update_if(|_| false);
        assert!(!changed);
        assert_eq!(current.state, OrchestratorState::Idle);
        assert!(!reader.rx.has_changed().unwrap());

        let (changed, current) = store.update_if(|s| {
            s.state = OrchestratorState::Attempting;
            true
        });
        assert!(changed);
        assert_eq!(current.state, OrchestratorState::Attempting);
        assert!(reader.rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_reader_wakes_on_write() {
        let store = StatusStore::new();
        let mut reader = store.reader();
        reader.read_latest();

        store.write(StatusSnapshot {
            state: OrchestratorState::Exhausted,
            ..StatusSnapshot::default()
        });
        assert!(reader.changed().await);
        assert_eq!(reader.read_latest().state, OrchestratorState::Exhausted);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrchestratorState::Idle.is_terminal());
        assert!(!OrchestratorState::Attempting.is_terminal());
        assert!(OrchestratorState::Exhausted.is_terminal());
        assert!(
            OrchestratorState::Succeeded {
                resource_id: "x".to_string()
            }
            .is_terminal()
        );
    }
}

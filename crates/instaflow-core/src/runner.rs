//! Background attempt loop

use crate::orchestrator::Orchestrator;
use crate::status::{OrchestratorState, StatusSnapshot};
use chrono::{DateTime, Utc};
use instaflow_cloud::ResourceSpec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also counts as shutdown.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Time until the next scheduled attempt, `None` when nothing is scheduled
fn next_wait(snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Option<Duration> {
    if snapshot.state == OrchestratorState::Attempting {
        return None;
    }
    snapshot
        .next_attempt_at
        .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Drive `attempt()` on the retry schedule until a terminal state or shutdown
///
/// Attempts made by other callers are picked up through the status store, so
/// a manual trigger reschedules the loop instead of doubling up. When no
/// automatic retry is scheduled the loop parks until the status changes.
/// An attempt still in flight when shutdown is requested is cancelled, which
/// removes its key file.
pub async fn run_loop(
    orchestrator: Arc<Orchestrator>,
    spec: ResourceSpec,
    mut shutdown: watch::Receiver<bool>,
) -> StatusSnapshot {
    let mut status = orchestrator.subscribe();
    tracing::info!(
        "Provisioning loop started (retry interval: {}s)",
        orchestrator.retry_policy().interval.as_secs()
    );

    let mut attempt_now = true;
    loop {
        if *shutdown.borrow() {
            break;
        }

        if attempt_now {
            tokio::select! {
                _ = orchestrator.attempt(&spec) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        let snapshot = status.read_latest();
        if snapshot.state.is_terminal() {
            tracing::info!("Provisioning loop finished: {}", snapshot.state);
            return snapshot;
        }

        let wait = next_wait(&snapshot, Utc::now());
        match wait {
            Some(wait) => tracing::debug!("Next attempt in {}s", wait.as_secs()),
            None => tracing::debug!("No automatic retry scheduled, waiting for a status change"),
        }

        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            alive = status.changed() => {
                if !alive {
                    break;
                }
                attempt_now = false;
            }
            _ = tokio::time::sleep(wait.unwrap_or_default()), if wait.is_some() => {
                attempt_now = true;
            }
        }
    }

    tracing::info!("Provisioning loop stopped");
    orchestrator.status()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_next_wait() {
        let now = Utc::now();
        let mut snapshot = StatusSnapshot {
            next_attempt_at: Some(now + TimeDelta::seconds(120)),
            ..StatusSnapshot::default()
        };
        assert_eq!(next_wait(&snapshot, now), Some(Duration::from_secs(120)));

        snapshot.next_attempt_at = Some(now - TimeDelta::seconds(5));
        assert_eq!(next_wait(&snapshot, now), Some(Duration::ZERO));

        snapshot.state = OrchestratorState::Attempting;
        assert_eq!(next_wait(&snapshot, now), None);

        snapshot.state = OrchestratorState::Idle;
        snapshot.next_attempt_at = None;
        assert_eq!(next_wait(&snapshot, now), None);
    }
}

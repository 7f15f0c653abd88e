//! HTTP status and trigger surface

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use instaflow_cloud::{InstanceAction, InstanceInfo, ResourceSpec};
use instaflow_core::{
    AttemptOutcome, InstanceQueryError, Orchestrator, OrchestratorState, OutcomeKind,
    StatusSnapshot,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub spec: Arc<ResourceSpec>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, spec: ResourceSpec) -> Self {
        Self {
            orchestrator,
            spec: Arc::new(spec),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/trigger", get(trigger).post(trigger))
        .route("/stop", post(stop))
        .route("/instance", get(instance))
        .route("/instance/{action}", post(instance_action))
        .with_state(state)
}

#[derive(Serialize)]
struct ApiResponse {
    ok: bool,
    kind: String,
    message: String,
    status: StatusSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    instance: Option<InstanceInfo>,
}

impl ApiResponse {
    fn from_snapshot(snapshot: StatusSnapshot) -> Self {
        Self {
            ok: snapshot.is_succeeded(),
            kind: snapshot_kind(&snapshot).to_string(),
            message: snapshot.message.clone(),
            status: snapshot,
            instance: None,
        }
    }
}

fn snapshot_kind(snapshot: &StatusSnapshot) -> &'static str {
    match &snapshot.state {
        OrchestratorState::Succeeded { .. } => OutcomeKind::Success.as_str(),
        OrchestratorState::Attempting => "in_flight",
        OrchestratorState::Exhausted => "exhausted",
        OrchestratorState::Idle => snapshot
            .last_outcome_kind
            .map(|kind| kind.as_str())
            .unwrap_or("idle"),
    }
}

fn outcome_status(kind: OutcomeKind) -> StatusCode {
    match kind {
        OutcomeKind::Success => StatusCode::OK,
        OutcomeKind::CapacityExhausted
        | OutcomeKind::RateLimited
        | OutcomeKind::TransientProviderError => StatusCode::SERVICE_UNAVAILABLE,
        OutcomeKind::ConfigurationError => StatusCode::INTERNAL_SERVER_ERROR,
        OutcomeKind::UnknownError => StatusCode::BAD_GATEWAY,
    }
}

/// HTTP status for the snapshot returned by a trigger
pub fn trigger_status(snapshot: &StatusSnapshot) -> StatusCode {
    match &snapshot.state {
        OrchestratorState::Succeeded { .. } => StatusCode::OK,
        OrchestratorState::Attempting => StatusCode::ACCEPTED,
        OrchestratorState::Exhausted => StatusCode::CONFLICT,
        OrchestratorState::Idle => snapshot
            .last_outcome_kind
            .map(outcome_status)
            .unwrap_or(StatusCode::ACCEPTED),
    }
}

/// Seconds until the next scheduled attempt, at least 1
fn retry_after_secs(snapshot: &StatusSnapshot) -> Option<i64> {
    snapshot
        .next_attempt_at
        .map(|at| (at - Utc::now()).num_seconds().max(1))
}

fn snapshot_response(code: StatusCode, snapshot: StatusSnapshot) -> Response {
    let retry_after = (code == StatusCode::SERVICE_UNAVAILABLE)
        .then(|| retry_after_secs(&snapshot))
        .flatten();
    let mut response = (code, Json(ApiResponse::from_snapshot(snapshot))).into_response();
    if let Some(secs) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

async fn index() -> &'static str {
    "instaflow is running"
}

async fn status(State(state): State<AppState>) -> Response {
    snapshot_response(StatusCode::OK, state.orchestrator.status())
}

async fn trigger(State(state): State<AppState>) -> Response {
    // Run detached so a dropped connection cannot cancel the attempt.
    let orchestrator = state.orchestrator.clone();
    let spec = state.spec.clone();
    let snapshot = match tokio::spawn(async move { orchestrator.attempt(&spec).await }).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!("Attempt task failed: {}", e);
            state.orchestrator.status()
        }
    };
    snapshot_response(trigger_status(&snapshot), snapshot)
}

async fn stop(State(state): State<AppState>) -> Response {
    snapshot_response(StatusCode::OK, state.orchestrator.stop())
}

async fn instance(State(state): State<AppState>) -> Response {
    let result = state.orchestrator.inspect().await;
    instance_response(&state, result)
}

async fn instance_action(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> Response {
    let action: InstanceAction = match action.parse() {
        Ok(action) => action,
        Err(message) => {
            let body = ApiResponse {
                ok: false,
                kind: "invalid_action".to_string(),
                message,
                status: state.orchestrator.status(),
                instance: None,
            };
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    let result = state.orchestrator.perform(action).await;
    instance_response(&state, result)
}

fn instance_response(
    state: &AppState,
    result: Result<InstanceInfo, InstanceQueryError>,
) -> Response {
    let status = state.orchestrator.status();
    match result {
        Ok(instance) => {
            let body = ApiResponse {
                ok: true,
                kind: "instance".to_string(),
                message: format!("{} ({})", instance.id, instance.lifecycle_state),
                status,
                instance: Some(instance),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(InstanceQueryError::NotProvisioned) => {
            let body = ApiResponse {
                ok: false,
                kind: "not_provisioned".to_string(),
                message: InstanceQueryError::NotProvisioned.to_string(),
                status,
                instance: None,
            };
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
        Err(InstanceQueryError::Failed(outcome)) => {
            let code = outcome_status(outcome.kind());
            let body = ApiResponse {
                ok: false,
                kind: outcome.kind().as_str().to_string(),
                message: outcome.to_string(),
                status,
                instance: None,
            };
            let mut response = (code, Json(body)).into_response();
            if let AttemptOutcome::RateLimited { retry_after, .. } = outcome {
                if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().max(1).to_string())
                {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
            }
            response
        }
    }
}

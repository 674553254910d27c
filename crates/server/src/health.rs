use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::bootstrap::OrchestratorMode;

#[derive(Clone)]
pub struct HealthState {
    orchestrator_mode: OrchestratorMode,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub orchestrator: HealthCheck,
    pub checked_at: String,
}

pub fn router(orchestrator_mode: OrchestratorMode) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { orchestrator_mode })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let orchestrator = orchestrator_check(state.orchestrator_mode);
    let ready = orchestrator.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "proactor-server runtime initialized".to_string(),
        },
        orchestrator,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn orchestrator_check(mode: OrchestratorMode) -> HealthCheck {
    match mode {
        OrchestratorMode::Http => {
            HealthCheck { status: "ready", detail: "http turn orchestrator configured".to_string() }
        }
        OrchestratorMode::Unconfigured => HealthCheck {
            status: "degraded",
            detail: "no orchestrator endpoint configured; turns produce no response".to_string(),
        },
    }
}

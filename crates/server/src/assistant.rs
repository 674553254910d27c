//! HTTP surface of the proactive runner: wizard state changes in, transcript out.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use proactor_agent::runner::{AutoTurnRunner, RunnerContext};
use proactor_agent::transcript::{TranscriptMessage, TranscriptStore};
use proactor_core::domain::snapshot::{ControlMode, WizardState};
use proactor_core::domain::trigger::ChangeSource;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct AssistantState {
    runner: AutoTurnRunner,
    transcript: Arc<dyn TranscriptStore>,
}

pub fn router(runner: AutoTurnRunner, transcript: Arc<dyn TranscriptStore>) -> Router {
    Router::new()
        .route("/api/v1/assistant/state-change", post(state_change))
        .route("/api/v1/assistant/idle", post(idle))
        .route("/api/v1/assistant/transcript/{project_id}", get(list_transcript))
        .with_state(AssistantState { runner, transcript })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangeRequest {
    pub previous: WizardState,
    pub next: WizardState,
    pub project_id: String,
    pub user_id: String,
    #[serde(default)]
    pub mode: ControlMode,
    #[serde(default = "default_source")]
    pub source: ChangeSource,
}

fn default_source() -> ChangeSource {
    ChangeSource::User
}

#[derive(Debug, Serialize)]
pub struct StateChangeResponse {
    pub scheduled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdleRequest {
    pub project_id: String,
}

#[derive(Debug, Serialize)]
pub struct IdleResponse {
    pub delivered: bool,
}

async fn state_change(
    State(state): State<AssistantState>,
    Json(request): Json<StateChangeRequest>,
) -> (StatusCode, Json<StateChangeResponse>) {
    let context = RunnerContext {
        mode: request.mode,
        last_change_source: request.source,
        project_id: request.project_id,
        user_id: request.user_id,
    };
    let scheduled = state.runner.handle_user_state_change(&request.previous, &request.next, &context);
    (StatusCode::ACCEPTED, Json(StateChangeResponse { scheduled }))
}

async fn idle(State(state): State<AssistantState>, Json(request): Json<IdleRequest>) -> Json<IdleResponse> {
    let delivered = state.runner.handle_idle(&request.project_id).await;
    Json(IdleResponse { delivered })
}

async fn list_transcript(
    State(state): State<AssistantState>,
    Path(project_id): Path<String>,
) -> Json<Vec<TranscriptMessage>> {
    Json(state.transcript.messages(&project_id))
}

use std::time::Duration;

use async_trait::async_trait;
use proactor_core::config::OrchestratorConfig;
use proactor_core::domain::event::{DomainEventType, InteractionMode};
use proactor_core::domain::intent::Obligation;
use proactor_core::domain::snapshot::{ControlMode, WizardState};
use proactor_core::errors::ApplicationError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("turn orchestrator timed out")]
    Timeout,
    #[error("turn orchestrator call was cancelled")]
    Cancelled,
    #[error("turn orchestrator transport failure: {0}")]
    Transport(String),
    #[error("turn orchestrator returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl OrchestratorError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<OrchestratorError> for ApplicationError {
    fn from(value: OrchestratorError) -> Self {
        match value {
            OrchestratorError::Cancelled => Self::Cancelled,
            other => Self::Orchestrator(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub query: String,
    pub wizard_state: WizardState,
    pub project_id: String,
    pub user_id: String,
    pub current_chapter: Option<String>,
    pub mode: ControlMode,
    pub interaction_mode: InteractionMode,
    pub trigger_type: DomainEventType,
    pub trigger_id: String,
    pub enable_anticipation: bool,
    pub enable_conflict_detection: bool,
    pub urgent_obligations: Vec<Obligation>,
}

/// A proposed mutation of the wizard state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub path: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TurnPlan {
    pub goal: String,
    pub priority: String,
    pub route: String,
    pub allow_patches: bool,
    pub deferred_topics: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TurnMetadata {
    pub intent: Option<String>,
    pub turn_plan: TurnPlan,
    pub tokens_used: u32,
    pub attempts: u32,
    pub used_fallback: bool,
    pub guard_verdict: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TurnResult {
    pub response: String,
    pub patches: Vec<Patch>,
    pub metadata: TurnMetadata,
}

#[async_trait]
pub trait TurnOrchestrator: Send + Sync {
    async fn run_turn(&self, request: &TurnRequest) -> Result<TurnResult, OrchestratorError>;
}

/// Runs one orchestrator call, resolving to `Cancelled` as soon as `cancel` fires.
pub async fn run_cancellable(
    orchestrator: &dyn TurnOrchestrator,
    request: &TurnRequest,
    cancel: &CancellationToken,
) -> Result<TurnResult, OrchestratorError> {
    if cancel.is_cancelled() {
        return Err(OrchestratorError::Cancelled);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(OrchestratorError::Cancelled),
        result = orchestrator.run_turn(request) => result,
    }
}

pub struct HttpTurnOrchestrator {
    client: reqwest::Client,
    endpoint_url: String,
    api_key: Option<SecretString>,
}

impl HttpTurnOrchestrator {
    pub fn new(
        endpoint_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, OrchestratorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| OrchestratorError::Transport(error.to_string()))?;
        Ok(Self { client, endpoint_url: endpoint_url.into(), api_key })
    }

    /// Builds a client when an endpoint is configured.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Option<Self>, OrchestratorError> {
        let Some(endpoint_url) = config.endpoint_url.as_deref() else {
            return Ok(None);
        };
        Self::new(endpoint_url, config.api_key.clone(), Duration::from_secs(config.timeout_secs))
            .map(Some)
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }
}

#[async_trait]
impl TurnOrchestrator for HttpTurnOrchestrator {
    async fn run_turn(&self, request: &TurnRequest) -> Result<TurnResult, OrchestratorError> {
        let mut builder = self.client.post(&self.endpoint_url).json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        let response = response.error_for_status().map_err(map_transport_error)?;

        response
            .json::<TurnResult>()
            .await
            .map_err(|error| OrchestratorError::InvalidResponse(error.to_string()))
    }
}

fn map_transport_error(error: reqwest::Error) -> OrchestratorError {
    if error.is_timeout() {
        OrchestratorError::Timeout
    } else {
        OrchestratorError::Transport(error.to_string())
    }
}

/// Stand-in used when no orchestrator endpoint is configured.
#[derive(Clone, Debug, Default)]
pub struct UnconfiguredOrchestrator;

#[async_trait]
impl TurnOrchestrator for UnconfiguredOrchestrator {
    async fn run_turn(&self, _request: &TurnRequest) -> Result<TurnResult, OrchestratorError> {
        Err(OrchestratorError::Transport("no orchestrator endpoint configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proactor_core::errors::ApplicationError;
    use secrecy::SecretString;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{
        run_cancellable, HttpTurnOrchestrator, OrchestratorError, TurnOrchestrator, TurnResult,
    };
    use crate::testing::{sample_request, ScriptedOrchestrator, VALID_RESPONSE};

    fn client(server: &MockServer, api_key: Option<&str>, timeout: Duration) -> HttpTurnOrchestrator {
        let url = format!("{}/turn", server.uri());
        let api_key = api_key.map(|key| SecretString::from(key.to_string()));
        match HttpTurnOrchestrator::new(url, api_key, timeout) {
            Ok(client) => client,
            Err(error) => panic!("client should build: {error}"),
        }
    }

    #[test]
    fn cancellation_maps_to_application_cancelled() {
        assert_eq!(ApplicationError::from(OrchestratorError::Cancelled), ApplicationError::Cancelled);
        assert!(matches!(
            ApplicationError::from(OrchestratorError::Timeout),
            ApplicationError::Orchestrator(_)
        ));
    }

    #[test]
    fn turn_result_tolerates_sparse_payloads() {
        let parsed: TurnResult = serde_json::from_str(
            r#"{"response":"Context: a Inzicht: b Actie: c","metadata":{"turnPlan":{"allowPatches":true}}}"#,
        )
        .unwrap_or_default();

        assert!(parsed.metadata.turn_plan.allow_patches);
        assert!(parsed.patches.is_empty());
        assert!(parsed.metadata.turn_plan.deferred_topics.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_interrupts_a_slow_call() {
        let orchestrator = ScriptedOrchestrator::default().with_delay(Duration::from_secs(30));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = run_cancellable(&orchestrator, &sample_request(), &cancel).await;
        assert_eq!(result, Err(OrchestratorError::Cancelled));
    }

    #[tokio::test]
    async fn http_client_sends_bearer_key_and_parses_the_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/turn"))
            .and(header("authorization", "Bearer turn-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": VALID_RESPONSE,
                "metadata": { "intent": "budgetteren", "tokensUsed": 17 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let orchestrator = client(&server, Some("turn-secret"), Duration::from_secs(5));
        let result = orchestrator.run_turn(&sample_request()).await;

        let Ok(result) = result else {
            panic!("turn should succeed: {result:?}");
        };
        assert_eq!(result.response, VALID_RESPONSE);
        assert_eq!(result.metadata.intent.as_deref(), Some("budgetteren"));
        assert_eq!(result.metadata.tokens_used, 17);
    }

    #[tokio::test]
    async fn http_client_without_key_is_rejected_by_an_authenticating_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer turn-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "ok" })))
            .mount(&server)
            .await;

        let orchestrator = client(&server, None, Duration::from_secs(5));
        let result = orchestrator.run_turn(&sample_request()).await;

        assert!(matches!(result, Err(OrchestratorError::Transport(_))));
    }

    #[tokio::test]
    async fn http_error_status_maps_to_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let orchestrator = client(&server, None, Duration::from_secs(5));
        let result = orchestrator.run_turn(&sample_request()).await;

        let Err(OrchestratorError::Transport(message)) = result else {
            panic!("expected a transport error, got {result:?}");
        };
        assert!(message.contains("500"));
    }

    #[tokio::test]
    async fn slow_endpoint_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": VALID_RESPONSE }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let orchestrator = client(&server, None, Duration::from_millis(100));
        let result = orchestrator.run_turn(&sample_request()).await;

        assert_eq!(result, Err(OrchestratorError::Timeout));
    }

    #[tokio::test]
    async fn malformed_body_maps_to_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let orchestrator = client(&server, None, Duration::from_secs(5));
        let result = orchestrator.run_turn(&sample_request()).await;

        assert!(matches!(result, Err(OrchestratorError::InvalidResponse(_))));
    }
}

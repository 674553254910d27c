//! Server-sent event endpoint for a single user-requested turn.
//!
//! The full contract sequence (call, validate, retry once, fallback) completes
//! before any text is streamed, so clients only ever receive compliant text.
//! Streamed turns run on the same per-project session as proactive turns.

use std::convert::Infallible;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::routing::post;
use axum::Router;
use futures::stream::{self, Stream};
use proactor_agent::router::RouterContext;
use proactor_agent::runner::AutoTurnRunner;
use proactor_core::domain::event::{DomainEvent, DomainEventType, InteractionMode};
use proactor_core::domain::snapshot::{ControlMode, WizardState};
use proactor_core::domain::trigger::ChangeSource;
use proactor_core::errors::{ApplicationError, DomainError, InterfaceError};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
pub struct StreamState {
    runner: AutoTurnRunner,
    chunk_size: usize,
}

pub fn router(runner: AutoTurnRunner, chunk_size: usize) -> Router {
    Router::new()
        .route("/api/v1/assistant/stream", post(stream_turn))
        .with_state(StreamState { runner, chunk_size })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamRequest {
    event: Option<StreamEvent>,
    wizard_state: Option<WizardState>,
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    user_id: String,
    interaction_mode: Option<InteractionMode>,
    #[serde(default)]
    user_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: DomainEventType,
    #[serde(default)]
    chapter: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

struct ParsedRequest {
    event: DomainEvent,
    wizard_state: WizardState,
    interaction_mode: InteractionMode,
    user_message: Option<String>,
}

pub async fn stream_turn(
    State(state): State<StreamState>,
    body: Bytes,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let started = Instant::now();
    let events = match parse_request(&body) {
        Ok(request) => run_turn(&state, request, started).await,
        Err(error) => {
            let interface = ApplicationError::from(error).into_interface("stream");
            warn!(
                event_name = "stream.rejected",
                correlation_id = "stream",
                error = %interface,
                "stream request rejected"
            );
            vec![error_event(&interface)]
        }
    };
    Sse::new(stream::iter(events.into_iter().map(Ok::<_, Infallible>)))
}

fn parse_request(body: &[u8]) -> Result<ParsedRequest, DomainError> {
    let request: StreamRequest = serde_json::from_slice(body)
        .map_err(|error| DomainError::InvalidSnapshot(error.to_string()))?;
    let raw_event = request.event.ok_or_else(|| DomainError::MissingInput("event".to_string()))?;
    let wizard_state =
        request.wizard_state.ok_or_else(|| DomainError::MissingInput("wizardState".to_string()))?;
    if request.project_id.trim().is_empty() {
        return Err(DomainError::MissingInput("projectId".to_string()));
    }

    let mut event = DomainEvent::new(
        raw_event.event_type,
        ChangeSource::User,
        request.project_id,
        request.user_id,
    );
    if let Some(chapter) = raw_event.chapter.or_else(|| wizard_state.current_chapter.clone()) {
        event = event.with_chapter(chapter);
    }
    if let Some(payload) = raw_event.payload {
        event = event.with_payload(payload);
    }

    Ok(ParsedRequest {
        event,
        wizard_state,
        interaction_mode: request.interaction_mode.unwrap_or_default(),
        user_message: request.user_message.filter(|message| !message.trim().is_empty()),
    })
}

async fn run_turn(state: &StreamState, request: ParsedRequest, started: Instant) -> Vec<Event> {
    let ParsedRequest { event, wizard_state, interaction_mode, user_message } = request;
    let router = state.runner.project_router(&event.project_id);
    let mut router = router.lock().await;
    let context = RouterContext {
        state: &wizard_state,
        mode: ControlMode::User,
        interaction_mode,
        enable_conflict_detection: true,
        enable_anticipation: true,
        user_message: user_message.as_deref(),
        cancel: CancellationToken::new(),
    };

    let accepted = router.process_event(&event, &context).await;
    let Some(turn) = router.last_turn().filter(|_| accepted) else {
        let error = router
            .last_error()
            .cloned()
            .map(ApplicationError::from)
            .unwrap_or_else(|| ApplicationError::Orchestrator("no response".to_string()));
        let interface = error.into_interface(&event.id);
        warn!(
            event_name = "stream.no_response",
            project_id = %event.project_id,
            correlation_id = %event.id,
            error = %interface,
            "stream turn produced no response"
        );
        return vec![error_event(&interface)];
    };

    let enforced = &turn.enforced;
    let mut events = vec![sse(
        "metadata",
        json!({
            "eventType": event.event_type.as_str(),
            "category": turn.category.as_str(),
            "intent": enforced.metadata.intent,
            "verdict": turn.verdict,
            "attempts": enforced.attempts,
            "usedFallback": enforced.used_fallback(),
            "guardVerdict": enforced.verdict.as_str(),
        }),
    )];
    events.extend(router.last_patches().iter().map(|patch| sse("patch", json!(patch))));
    events.extend(
        chunk_words(&enforced.text, state.chunk_size)
            .into_iter()
            .map(|chunk| sse("stream", json!({ "content": chunk }))),
    );

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    events.push(sse(
        "done",
        json!({ "id": event.id, "tokens": enforced.metadata.tokens_used, "latencyMs": latency_ms }),
    ));

    info!(
        event_name = "stream.completed",
        project_id = %event.project_id,
        correlation_id = %event.id,
        guard_verdict = enforced.verdict.as_str(),
        latency_ms,
        "stream turn completed"
    );
    events
}

/// Splits `text` into chunks of at most `max_chars` characters, breaking after
/// whitespace where possible. Concatenating the chunks yields `text`.
pub fn chunk_words(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for segment in text.split_inclusive(char::is_whitespace) {
        let len = segment.chars().count();
        if current_len + len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if len > max_chars {
            let chars = segment.chars().collect::<Vec<_>>();
            for piece in chars.chunks(max_chars) {
                if piece.len() == max_chars {
                    chunks.push(piece.iter().collect());
                } else {
                    current = piece.iter().collect();
                    current_len = piece.len();
                }
            }
            continue;
        }
        current.push_str(segment);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn sse(name: &str, payload: Value) -> Event {
    Event::default().event(name).data(payload.to_string())
}

fn error_event(error: &InterfaceError) -> Event {
    sse(
        "error",
        json!({
            "message": error.user_message(),
            "detail": error.to_string(),
            "recoverable": error.recoverable(),
            "correlationId": error.correlation_id(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use proactor_agent::orchestrator::OrchestratorError;
    use proactor_agent::runner::{AutoTurnRunner, SchedulerSettings};
    use proactor_agent::transcript::InMemoryTranscript;
    use proactor_core::audit::InMemoryAuditSink;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{chunk_words, router};
    use crate::testing::{FixedOrchestrator, VALID_RESPONSE};

    fn runner(orchestrator: &FixedOrchestrator) -> AutoTurnRunner {
        AutoTurnRunner::new(
            SchedulerSettings::default(),
            Arc::new(orchestrator.clone()),
            Arc::new(InMemoryTranscript::default()),
            Arc::new(InMemoryAuditSink::default()),
        )
    }

    fn app(orchestrator: &FixedOrchestrator) -> Router {
        router(runner(orchestrator), 48)
    }

    async fn post_stream(app: &Router, body: Value) -> Vec<(String, Value)> {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/assistant/stream")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap_or_default();
        let response = match app.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap_or_default();
        parse_sse(&String::from_utf8_lossy(&bytes))
    }

    fn parse_sse(raw: &str) -> Vec<(String, Value)> {
        raw.split("\n\n")
            .filter(|block| !block.trim().is_empty())
            .map(|block| {
                let mut name = String::new();
                let mut data = String::new();
                for line in block.lines() {
                    if let Some((field, value)) = line.split_once(':') {
                        let value = value.strip_prefix(' ').unwrap_or(value);
                        match field {
                            "event" => name = value.to_string(),
                            "data" => data.push_str(value),
                            _ => {}
                        }
                    }
                }
                (name, serde_json::from_str(&data).unwrap_or(Value::Null))
            })
            .collect()
    }

    fn request_body(interaction_mode: &str) -> Value {
        json!({
            "event": { "type": "chapter_entered", "chapter": "ruimtes" },
            "wizardState": { "currentChapter": "ruimtes", "chapterAnswers": {} },
            "projectId": "project-1",
            "userId": "user-1",
            "interactionMode": interaction_mode,
        })
    }

    #[tokio::test]
    async fn stream_emits_metadata_chunks_and_done() {
        let orchestrator = FixedOrchestrator::replying(VALID_RESPONSE);
        let events = post_stream(&app(&orchestrator), request_body("auto")).await;

        let names = events.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
        assert_eq!(names.first(), Some(&"metadata"));
        assert_eq!(names.last(), Some(&"done"));
        assert!(!names.contains(&"patch"));

        let metadata = &events[0].1;
        assert_eq!(metadata["category"], "navigation");
        assert_eq!(metadata["eventType"], "chapter_entered");
        assert_eq!(metadata["usedFallback"], false);
        assert_eq!(metadata["verdict"], "ALIGNED");

        let text = events
            .iter()
            .filter(|(name, _)| name == "stream")
            .filter_map(|(_, data)| data["content"].as_str())
            .collect::<String>();
        assert_eq!(text, VALID_RESPONSE);
        assert_eq!(orchestrator.calls(), 1);
    }

    #[tokio::test]
    async fn user_mode_streams_allowed_patches() {
        let orchestrator = FixedOrchestrator::replying(VALID_RESPONSE).with_patch("ruimtes.totalArea");
        let events = post_stream(&app(&orchestrator), request_body("user")).await;

        let patches =
            events.iter().filter(|(name, _)| name == "patch").map(|(_, data)| data).collect::<Vec<_>>();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0]["path"], "ruimtes.totalArea");
        assert_eq!(events[1].0, "patch");
    }

    #[tokio::test]
    async fn missing_event_is_a_non_recoverable_error() {
        let orchestrator = FixedOrchestrator::replying(VALID_RESPONSE);
        let events = post_stream(
            &app(&orchestrator),
            json!({ "wizardState": {}, "projectId": "project-1", "userId": "user-1" }),
        )
        .await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "error");
        assert_eq!(events[0].1["recoverable"], false);
        assert_eq!(orchestrator.calls(), 0);
    }

    #[tokio::test]
    async fn orchestrator_failure_is_a_recoverable_error() {
        let orchestrator = FixedOrchestrator::failing(OrchestratorError::Timeout);
        let events = post_stream(&app(&orchestrator), request_body("auto")).await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "error");
        assert_eq!(events[0].1["recoverable"], true);
    }

    #[tokio::test]
    async fn streamed_turns_share_the_project_session() {
        let orchestrator = FixedOrchestrator::replying(VALID_RESPONSE);
        let runner = runner(&orchestrator);
        let app = router(runner.clone(), 48);

        let mut first = request_body("user");
        first["userMessage"] = json!("Kan de keuken ook naar achteren?");
        post_stream(&app, first).await;
        let events = post_stream(&app, request_body("user")).await;
        assert_eq!(events.last().map(|(name, _)| name.as_str()), Some("done"));

        let router = runner.project_router("project-1");
        let router = router.lock().await;
        assert_eq!(router.session().turn_count, 2);
        assert_eq!(
            router.session().pim.open_questions,
            vec!["Kan de keuken ook naar achteren?".to_string()]
        );
        assert_eq!(orchestrator.calls(), 2);
    }

    #[test]
    fn chunks_respect_word_boundaries_and_reassemble() {
        let text = "Context: De woonkamer en de keuken liggen op dezelfde verdieping.\n\
                    Inzicht: Een open keuken brengt kookgeur in de leefruimte.";
        let chunks = chunk_words(text, 48);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 48));
        assert!(chunks.iter().all(|chunk| !chunk.starts_with(' ')));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn overlong_words_are_split_hard() {
        let chunks = chunk_words("kort ", 8);
        assert_eq!(chunks, vec!["kort ".to_string()]);

        let word = "a".repeat(20);
        let chunks = chunk_words(&format!("{word} b"), 8);
        assert_eq!(chunks.concat(), format!("{word} b"));
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 8));
    }
}

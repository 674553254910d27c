//! Scripted collaborators shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use proactor_core::domain::event::{DomainEventType, InteractionMode};
use proactor_core::domain::snapshot::{ControlMode, WizardState};

use crate::orchestrator::{OrchestratorError, TurnOrchestrator, TurnRequest, TurnResult};

pub const VALID_RESPONSE: &str = "Context: U heeft het budget aangepast.\n\
     Inzicht: De verplichte wensen passen nog binnen het budget.\n\
     Actie: Controleer of de post onvoorzien voldoende is?";

pub fn reply(text: &str) -> Result<TurnResult, OrchestratorError> {
    Ok(TurnResult { response: text.to_string(), ..TurnResult::default() })
}

pub fn sample_request() -> TurnRequest {
    TurnRequest {
        query: "Gebeurtenis: field_edited".to_string(),
        wizard_state: WizardState::default(),
        project_id: "project-1".to_string(),
        user_id: "user-1".to_string(),
        current_chapter: Some("budget".to_string()),
        mode: ControlMode::User,
        interaction_mode: InteractionMode::Auto,
        trigger_type: DomainEventType::FieldEdited,
        trigger_id: "evt-1".to_string(),
        enable_anticipation: true,
        enable_conflict_detection: true,
        urgent_obligations: Vec::new(),
    }
}

/// Replays scripted replies in order, then keeps answering `VALID_RESPONSE`.
#[derive(Clone, Default)]
pub struct ScriptedOrchestrator {
    script: Arc<Mutex<VecDeque<Result<TurnResult, OrchestratorError>>>>,
    requests: Arc<Mutex<Vec<TurnRequest>>>,
    delay: Option<Duration>,
    panics: Arc<AtomicUsize>,
}

impl ScriptedOrchestrator {
    pub fn new(script: Vec<Result<TurnResult, OrchestratorError>>) -> Self {
        Self { script: Arc::new(Mutex::new(script.into())), ..Self::default() }
    }

    /// The first `calls` turns panic instead of answering.
    pub fn panicking_first(mut self, calls: usize) -> Self {
        self.panics = Arc::new(AtomicUsize::new(calls));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests().len()
    }
}

#[async_trait]
impl TurnOrchestrator for ScriptedOrchestrator {
    async fn run_turn(&self, request: &TurnRequest) -> Result<TurnResult, OrchestratorError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let panicking =
            self.panics.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if panicking.is_ok() {
            panic!("scripted orchestrator panic");
        }
        let next = self.script.lock().ok().and_then(|mut script| script.pop_front());
        next.unwrap_or_else(|| reply(VALID_RESPONSE))
    }
}

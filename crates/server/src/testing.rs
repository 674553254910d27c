use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use proactor_agent::orchestrator::{
    OrchestratorError, Patch, TurnOrchestrator, TurnRequest, TurnResult,
};
use serde_json::json;

pub const VALID_RESPONSE: &str = "Context: U bent begonnen aan het hoofdstuk ruimtes.\n\
     Inzicht: De woonkamer en keuken bepalen samen het grootste deel van de vloer.\n\
     Actie: Welke ruimte wilt u als eerste uitwerken?";

/// Answers every turn with the same result and counts the calls.
#[derive(Clone)]
pub struct FixedOrchestrator {
    result: Result<TurnResult, OrchestratorError>,
    calls: Arc<AtomicUsize>,
}

impl FixedOrchestrator {
    pub fn replying(text: &str) -> Self {
        let mut result = TurnResult { response: text.to_string(), ..TurnResult::default() };
        result.metadata.intent = Some("orienteren".to_string());
        result.metadata.tokens_used = 42;
        Self { result: Ok(result), calls: Arc::default() }
    }

    pub fn failing(error: OrchestratorError) -> Self {
        Self { result: Err(error), calls: Arc::default() }
    }

    pub fn with_patch(mut self, path: &str) -> Self {
        if let Ok(result) = &mut self.result {
            result.patches.push(Patch { path: path.to_string(), value: json!(64), reason: None });
            result.metadata.turn_plan.allow_patches = true;
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TurnOrchestrator for FixedOrchestrator {
    async fn run_turn(&self, _request: &TurnRequest) -> Result<TurnResult, OrchestratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

use std::sync::Arc;

use proactor_core::conflicts::{ConflictEngine, DeterministicConflictEngine};
use proactor_core::domain::event::{DomainEvent, InteractionMode};
use proactor_core::domain::intent::PlanVerdict;
use proactor_core::domain::snapshot::{ControlMode, WizardState};
use tokio_util::sync::CancellationToken;

use crate::contract::{ContractEnforcer, EnforcedTurn};
use crate::conversation::ConversationSession;
use crate::orchestrator::{OrchestratorError, Patch, TurnOrchestrator, TurnRequest};
use crate::query::{build_query, QueryContext, TriggerCategory};

/// Per-call inputs that are not part of the event itself.
#[derive(Clone, Debug)]
pub struct RouterContext<'a> {
    pub state: &'a WizardState,
    pub mode: ControlMode,
    pub interaction_mode: InteractionMode,
    pub enable_conflict_detection: bool,
    pub enable_anticipation: bool,
    pub user_message: Option<&'a str>,
    pub cancel: CancellationToken,
}

impl<'a> RouterContext<'a> {
    /// Context for a turn the assistant raises on its own.
    pub fn proactive(state: &'a WizardState, cancel: CancellationToken) -> Self {
        Self {
            state,
            mode: ControlMode::User,
            interaction_mode: InteractionMode::Auto,
            enable_conflict_detection: true,
            enable_anticipation: true,
            user_message: None,
            cancel,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoutedTurn {
    pub event_id: String,
    pub category: TriggerCategory,
    pub verdict: PlanVerdict,
    pub turn: u32,
    pub conflicts: usize,
    pub enforced: EnforcedTurn,
}

/// Maps domain events to orchestrator turns for a single project.
pub struct EventRouter {
    enforcer: ContractEnforcer,
    conflict_engine: Arc<dyn ConflictEngine>,
    session: ConversationSession,
    last_turn: Option<RoutedTurn>,
    last_error: Option<OrchestratorError>,
}

impl EventRouter {
    pub fn new(orchestrator: Arc<dyn TurnOrchestrator>) -> Self {
        Self {
            enforcer: ContractEnforcer::new(orchestrator),
            conflict_engine: Arc::new(DeterministicConflictEngine),
            session: ConversationSession::default(),
            last_turn: None,
            last_error: None,
        }
    }

    pub fn with_conflict_engine(mut self, conflict_engine: Arc<dyn ConflictEngine>) -> Self {
        self.conflict_engine = conflict_engine;
        self
    }

    pub fn with_session(mut self, session: ConversationSession) -> Self {
        self.session = session;
        self
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    /// Returns `true` once text has been accepted, `false` when no response was produced.
    pub async fn process_event(&mut self, event: &DomainEvent, context: &RouterContext<'_>) -> bool {
        self.last_turn = None;
        self.last_error = None;

        let category = TriggerCategory::from(event.event_type);
        let conflicts = if context.enable_conflict_detection {
            self.conflict_engine.detect(context.state)
        } else {
            Vec::new()
        };
        if self.session.observe(context.state) {
            tracing::debug!(
                event_name = "router.intent_locked",
                project_id = %event.project_id,
                correlation_id = %event.id,
                "project intent locked from wizard answers"
            );
        }
        let urgent_obligations = self.session.urgent_obligations();
        let verdict = self.session.verdict(context.state);

        let query = build_query(&QueryContext {
            event,
            category,
            conflicts: &conflicts,
            urgent_obligations: &urgent_obligations,
            verdict,
        });

        let request = TurnRequest {
            query,
            wizard_state: context.state.clone(),
            project_id: event.project_id.clone(),
            user_id: event.user_id.clone(),
            current_chapter: event.chapter.clone().or_else(|| context.state.current_chapter.clone()),
            mode: context.mode,
            interaction_mode: context.interaction_mode,
            trigger_type: event.event_type,
            trigger_id: event.id.clone(),
            enable_anticipation: context.enable_anticipation,
            enable_conflict_detection: context.enable_conflict_detection,
            urgent_obligations,
        };

        match self.enforcer.enforce(event, &request, &context.cancel).await {
            Ok(enforced) => {
                let record = self.session.record_turn(
                    &enforced.text,
                    &enforced.metadata.turn_plan.deferred_topics,
                    context.state,
                    context.user_message,
                );
                tracing::info!(
                    event_name = "router.turn_accepted",
                    project_id = %event.project_id,
                    correlation_id = %event.id,
                    category = category.as_str(),
                    guard_verdict = enforced.verdict.as_str(),
                    turn = record.turn,
                    "turn accepted"
                );
                self.last_turn = Some(RoutedTurn {
                    event_id: event.id.clone(),
                    category,
                    verdict,
                    turn: record.turn,
                    conflicts: conflicts.len(),
                    enforced,
                });
                true
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "router.no_response",
                    project_id = %event.project_id,
                    correlation_id = %event.id,
                    category = category.as_str(),
                    error = %error,
                    "turn orchestrator produced no response"
                );
                self.last_error = Some(error);
                false
            }
        }
    }

    pub fn last_response(&self) -> Option<&str> {
        self.last_turn.as_ref().map(|turn| turn.enforced.text.as_str())
    }

    /// Patches of the last accepted turn; always empty for proactive turns.
    pub fn last_patches(&self) -> &[Patch] {
        self.last_turn.as_ref().map(|turn| turn.enforced.patches.as_slice()).unwrap_or(&[])
    }

    pub fn last_turn(&self) -> Option<&RoutedTurn> {
        self.last_turn.as_ref()
    }

    pub fn last_error(&self) -> Option<&OrchestratorError> {
        self.last_error.as_ref()
    }
}

//! Scheduling layer for proactive turns.
//!
//! The runner decides when the assistant may speak for a project: user-sourced
//! wizard changes are debounced into one domain event per burst, an accepted
//! message silences idle wake-ups until the user changes something again, and
//! turns with the same rate-limit key inside the cool-down are dropped. At most
//! one orchestrator call is in flight per project; a dispatch that fires
//! meanwhile is parked and runs when the flight ends.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use proactor_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use proactor_core::config::SchedulerConfig;
use proactor_core::domain::event::{DomainEvent, DomainEventType, Priority};
use proactor_core::domain::snapshot::{ControlMode, WizardState};
use proactor_core::domain::trigger::ChangeSource;
use proactor_core::triggers::{
    detect_chapter_transition, detect_field_triggers, newly_completed_chapters,
};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::contract::GuardVerdict;
use crate::orchestrator::TurnOrchestrator;
use crate::router::{EventRouter, RouterContext};
use crate::transcript::{TranscriptMessage, TranscriptStore};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

const NAVIGATION_KEY: &str = "navigation";
const IDLE_KEY: &str = "idle";
const SHARED_KEY: &str = "turn";
const ACTOR: &str = "auto_turn_runner";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub debounce: Duration,
    pub cooldown: Duration,
    pub rate_limit_per_category: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { debounce: DEFAULT_DEBOUNCE, cooldown: DEFAULT_COOLDOWN, rate_limit_per_category: true }
    }
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            cooldown: Duration::from_secs(config.cooldown_secs),
            rate_limit_per_category: config.rate_limit_per_category,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerContext {
    pub mode: ControlMode,
    pub last_change_source: ChangeSource,
    pub project_id: String,
    pub user_id: String,
}

impl RunnerContext {
    pub fn user(project_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            mode: ControlMode::User,
            last_change_source: ChangeSource::User,
            project_id: project_id.into(),
            user_id: user_id.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuppressReason {
    AwaitingUserInput,
    RateLimited,
}

impl SuppressReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingUserInput => "awaiting_user_input",
            Self::RateLimited => "rate_limited",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Accepted,
    Suppressed(SuppressReason),
    /// Parked behind the call already in flight.
    Queued,
    NoResponse,
}

struct Dispatch {
    event: DomainEvent,
    state: WizardState,
    rate_key: String,
}

struct LatestContext {
    state: WizardState,
    user_id: String,
}

#[derive(Default)]
struct ProjectSchedule {
    debounce: Option<JoinHandle<()>>,
    pending: Option<Dispatch>,
    awaiting_user_input: bool,
    last_turn_at: HashMap<String, Instant>,
    in_flight: bool,
    cancel: CancellationToken,
    latest: Option<LatestContext>,
}

impl ProjectSchedule {
    fn stop(&mut self) {
        if let Some(handle) = self.debounce.take() {
            handle.abort();
        }
        self.pending = None;
        self.cancel.cancel();
    }
}

struct RunnerShared {
    settings: SchedulerSettings,
    orchestrator: Arc<dyn TurnOrchestrator>,
    transcript: Arc<dyn TranscriptStore>,
    audit: Arc<dyn AuditSink>,
    schedules: Mutex<HashMap<String, ProjectSchedule>>,
    routers: Mutex<HashMap<String, Arc<tokio::sync::Mutex<EventRouter>>>>,
}

/// Per-project scheduler for proactive assistant turns.
#[derive(Clone)]
pub struct AutoTurnRunner {
    shared: Arc<RunnerShared>,
}

impl AutoTurnRunner {
    pub fn new(
        settings: SchedulerSettings,
        orchestrator: Arc<dyn TurnOrchestrator>,
        transcript: Arc<dyn TranscriptStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            shared: Arc::new(RunnerShared {
                settings,
                orchestrator,
                transcript,
                audit,
                schedules: Mutex::new(HashMap::new()),
                routers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn settings(&self) -> SchedulerSettings {
        self.shared.settings
    }

    /// Schedules a debounced turn for a user-sourced change.
    ///
    /// Returns `true` when a dispatch was (re)scheduled. Must be called from
    /// within a Tokio runtime.
    pub fn handle_user_state_change(
        &self,
        prev: &WizardState,
        next: &WizardState,
        context: &RunnerContext,
    ) -> bool {
        if !context.last_change_source.is_user() || context.mode != ControlMode::User {
            return false;
        }
        let Some(dispatch) = self.classify(prev, next, context) else {
            return false;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                event_name = "scheduler.no_runtime",
                project_id = %context.project_id,
                "state change received outside a Tokio runtime"
            );
            return false;
        };

        tracing::debug!(
            event_name = "scheduler.debounce_restarted",
            project_id = %context.project_id,
            correlation_id = %dispatch.event.id,
            event_type = dispatch.event.event_type.as_str(),
            "debounce timer restarted"
        );

        let runner = self.clone();
        let project_id = context.project_id.clone();
        let delay = self.shared.settings.debounce;

        let mut schedules = self.schedules();
        let schedule = schedules.entry(context.project_id.clone()).or_default();
        schedule.awaiting_user_input = false;
        schedule.latest =
            Some(LatestContext { state: next.clone(), user_id: context.user_id.clone() });
        if let Some(previous) = schedule.debounce.take() {
            previous.abort();
        }
        schedule.debounce = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Detached so a later abort of the timer cannot interrupt the flight.
            tokio::spawn(async move {
                runner.dispatch(&project_id, dispatch).await;
            });
        }));
        true
    }

    /// Raises an idle turn for the project's latest known state.
    ///
    /// Returns `true` only when a message was accepted.
    pub async fn handle_idle(&self, project_id: &str) -> bool {
        let latest = {
            let schedules = self.schedules();
            schedules
                .get(project_id)
                .and_then(|schedule| schedule.latest.as_ref())
                .map(|latest| (latest.state.clone(), latest.user_id.clone()))
        };
        let Some((state, user_id)) = latest else {
            tracing::debug!(
                event_name = "scheduler.idle_ignored",
                project_id = %project_id,
                "idle wake-up for a project without state"
            );
            return false;
        };

        let mut event =
            DomainEvent::new(DomainEventType::Idle, ChangeSource::System, project_id, user_id)
                .with_priority(Priority::Low);
        if let Some(chapter) = &state.current_chapter {
            event = event.with_chapter(chapter.clone());
        }
        let dispatch = Dispatch { event, state, rate_key: self.rate_limit_key(IDLE_KEY) };

        self.dispatch(project_id, dispatch).await == DispatchOutcome::Accepted
    }

    /// Aborts the pending debounce timer and cancels the call in flight.
    pub fn cancel(&self, project_id: &str) {
        if let Some(schedule) = self.schedules().get_mut(project_id) {
            schedule.stop();
        }
        tracing::info!(
            event_name = "scheduler.cancelled",
            project_id = %project_id,
            "pending and in-flight turns cancelled"
        );
    }

    /// Clears timers, flags, timestamps and routers for every project.
    pub fn reset(&self) {
        let drained = std::mem::take(&mut *self.schedules());
        for (_, mut schedule) in drained {
            schedule.stop();
        }
        self.routers().clear();
    }

    pub fn set_last_turn_at(&self, project_id: &str, rate_key: &str, at: Instant) {
        self.schedules()
            .entry(project_id.to_string())
            .or_default()
            .last_turn_at
            .insert(rate_key.to_string(), at);
    }

    pub fn is_awaiting_user_input(&self, project_id: &str) -> bool {
        self.schedules().get(project_id).map(|s| s.awaiting_user_input).unwrap_or(false)
    }

    fn classify(
        &self,
        prev: &WizardState,
        next: &WizardState,
        context: &RunnerContext,
    ) -> Option<Dispatch> {
        let source = context.last_change_source;
        let new_event = |event_type: DomainEventType| {
            DomainEvent::new(event_type, source, &context.project_id, &context.user_id)
        };

        let (event, key) = if let Some(chapter) = newly_completed_chapters(prev, next).pop() {
            let event = new_event(DomainEventType::ChapterCompleted)
                .with_chapter(chapter)
                .with_priority(Priority::High);
            (event, NAVIGATION_KEY.to_string())
        } else if let Some(chapter) = detect_chapter_transition(prev, next, source) {
            (new_event(DomainEventType::ChapterEntered).with_chapter(chapter), NAVIGATION_KEY.to_string())
        } else {
            let triggers = detect_field_triggers(prev, next, source);
            let chapter = triggers.first()?.chapter().to_string();
            let fields = triggers.iter().map(|t| t.field_path.as_str()).collect::<Vec<_>>();
            let event = new_event(DomainEventType::FieldEdited)
                .with_chapter(chapter.clone())
                .with_payload(json!({ "fields": fields }));
            (event, chapter)
        };

        Some(Dispatch { event, state: next.clone(), rate_key: self.rate_limit_key(&key) })
    }

    fn rate_limit_key(&self, key: &str) -> String {
        if self.shared.settings.rate_limit_per_category {
            key.to_string()
        } else {
            SHARED_KEY.to_string()
        }
    }

    /// Runs `dispatch`, then whatever got parked behind it.
    async fn dispatch(&self, project_id: &str, dispatch: Dispatch) -> DispatchOutcome {
        let (outcome, mut parked) = self.run_once(project_id, dispatch).await;
        while let Some(next) = parked.take() {
            parked = self.run_once(project_id, next).await.1;
        }
        outcome
    }

    async fn run_once(
        &self,
        project_id: &str,
        dispatch: Dispatch,
    ) -> (DispatchOutcome, Option<Dispatch>) {
        let now = Instant::now();
        let admission = {
            let mut schedules = self.schedules();
            let schedule = schedules.entry(project_id.to_string()).or_default();
            if schedule.in_flight {
                tracing::debug!(
                    event_name = "scheduler.turn_queued",
                    project_id = %project_id,
                    correlation_id = %dispatch.event.id,
                    "turn parked behind the call in flight"
                );
                schedule.pending = Some(dispatch);
                return (DispatchOutcome::Queued, None);
            }
            match self.suppression(schedule, &dispatch, now) {
                Some(reason) => Err(reason),
                None => {
                    schedule.in_flight = true;
                    schedule.cancel = CancellationToken::new();
                    Ok(schedule.cancel.clone())
                }
            }
        };

        let cancel = match admission {
            Ok(cancel) => cancel,
            Err(reason) => {
                tracing::info!(
                    event_name = "scheduler.turn_suppressed",
                    project_id = %project_id,
                    correlation_id = %dispatch.event.id,
                    reason = reason.as_str(),
                    rate_key = %dispatch.rate_key,
                    "proactive turn suppressed"
                );
                self.emit_audit(
                    &dispatch,
                    "scheduler.turn_suppressed",
                    AuditOutcome::Suppressed,
                    Some(reason.as_str()),
                );
                return (DispatchOutcome::Suppressed(reason), None);
            }
        };

        let router = self.project_router(project_id);
        let flight = async {
            let mut router = router.lock().await;
            let context = RouterContext::proactive(&dispatch.state, cancel.clone());
            if router.process_event(&dispatch.event, &context).await {
                router.last_turn().map(|turn| {
                    let enforced = &turn.enforced;
                    (enforced.text.clone(), enforced.verdict, enforced.attempts)
                })
            } else {
                None
            }
        };
        let (response, panicked) = match AssertUnwindSafe(flight).catch_unwind().await {
            Ok(response) => (response, false),
            Err(_) => {
                tracing::error!(
                    event_name = "scheduler.turn_panicked",
                    project_id = %project_id,
                    correlation_id = %dispatch.event.id,
                    "proactive turn panicked; discarding the project session"
                );
                self.routers().remove(project_id);
                (None, true)
            }
        };
        let cancelled = cancel.is_cancelled();
        let response = response.filter(|_| !cancelled);

        let parked = {
            let mut schedules = self.schedules();
            let schedule = schedules.entry(project_id.to_string()).or_default();
            schedule.in_flight = false;
            if response.is_some() {
                schedule.last_turn_at.insert(dispatch.rate_key.clone(), now);
                schedule.awaiting_user_input = true;
            }
            schedule.pending.take()
        };

        match response {
            Some((text, verdict, attempts)) => {
                if verdict != GuardVerdict::Pass {
                    self.emit_contract_audit(&dispatch, verdict, attempts);
                }
                self.shared.transcript.append(TranscriptMessage::assistant(
                    project_id,
                    text,
                    &dispatch.event.id,
                ));
                tracing::info!(
                    event_name = "scheduler.turn_accepted",
                    project_id = %project_id,
                    correlation_id = %dispatch.event.id,
                    rate_key = %dispatch.rate_key,
                    "proactive turn delivered"
                );
                self.emit_audit(&dispatch, "scheduler.turn_accepted", AuditOutcome::Success, None);
                (DispatchOutcome::Accepted, parked)
            }
            None => {
                let reason = if cancelled {
                    "cancelled"
                } else if panicked {
                    "panicked"
                } else {
                    "no_response"
                };
                tracing::warn!(
                    event_name = "scheduler.turn_failed",
                    project_id = %project_id,
                    correlation_id = %dispatch.event.id,
                    reason,
                    "proactive turn produced no message"
                );
                self.emit_audit(
                    &dispatch,
                    "scheduler.turn_failed",
                    AuditOutcome::Failed,
                    Some(reason),
                );
                (DispatchOutcome::NoResponse, parked)
            }
        }
    }

    fn suppression(
        &self,
        schedule: &ProjectSchedule,
        dispatch: &Dispatch,
        now: Instant,
    ) -> Option<SuppressReason> {
        if !dispatch.event.source.is_user() && schedule.awaiting_user_input {
            return Some(SuppressReason::AwaitingUserInput);
        }
        let last = schedule.last_turn_at.get(&dispatch.rate_key)?;
        (now.saturating_duration_since(*last) < self.shared.settings.cooldown)
            .then_some(SuppressReason::RateLimited)
    }

    /// Router holding the conversation session of `project_id`, shared by
    /// proactive turns and streamed user turns.
    pub fn project_router(&self, project_id: &str) -> Arc<tokio::sync::Mutex<EventRouter>> {
        let orchestrator = Arc::clone(&self.shared.orchestrator);
        self.routers()
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(EventRouter::new(orchestrator))))
            .clone()
    }

    fn emit_audit(
        &self,
        dispatch: &Dispatch,
        event_type: &str,
        outcome: AuditOutcome,
        reason: Option<&str>,
    ) {
        let mut event = AuditEvent::new(
            &dispatch.event.project_id,
            &dispatch.event.id,
            event_type,
            AuditCategory::Scheduler,
            ACTOR,
            outcome,
        )
        .with_metadata("category", &dispatch.rate_key)
        .with_metadata("event_type", dispatch.event.event_type.as_str());
        if let Some(reason) = reason {
            event = event.with_metadata("reason", reason);
        }
        self.shared.audit.emit(event);
    }

    fn emit_contract_audit(&self, dispatch: &Dispatch, verdict: GuardVerdict, attempts: u32) {
        let event_type = match verdict {
            GuardVerdict::Pass => return,
            GuardVerdict::Repaired => "contract.repaired",
            GuardVerdict::Fallback => "contract.fallback",
        };
        self.shared.audit.emit(
            AuditEvent::new(
                &dispatch.event.project_id,
                &dispatch.event.id,
                event_type,
                AuditCategory::Contract,
                ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("attempts", attempts.to_string())
            .with_metadata("event_type", dispatch.event.event_type.as_str()),
        );
    }

    fn schedules(&self) -> MutexGuard<'_, HashMap<String, ProjectSchedule>> {
        match self.shared.schedules.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn routers(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<EventRouter>>>> {
        match self.shared.routers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

use proactor_core::domain::intent::{Obligation, PlanVerdict, ProjectIntentModel};
use proactor_core::domain::snapshot::WizardState;
use proactor_core::memory::{
    defer_topic, get_urgent_obligations, lock_intent, mark_addressed, plan_watcher,
};

/// Memory of one conversation: turn counter, intent model and follow-ups.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationSession {
    pub turn_count: u32,
    pub pim: ProjectIntentModel,
    pub obligations: Vec<Obligation>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnRecord {
    pub turn: u32,
    pub addressed: usize,
    pub deferred: usize,
    pub verdict: PlanVerdict,
    pub added_tensions: Vec<&'static str>,
}

impl ConversationSession {
    pub fn new(pim: ProjectIntentModel) -> Self {
        Self { pim, ..Self::default() }
    }

    /// Turn number the next round-trip will get.
    pub fn upcoming_turn(&self) -> u32 {
        self.turn_count.saturating_add(1)
    }

    pub fn urgent_obligations(&self) -> Vec<Obligation> {
        get_urgent_obligations(&self.obligations, self.upcoming_turn()).into_iter().cloned().collect()
    }

    /// Locks the declared project intent the first time it shows up in `state`.
    pub fn observe(&mut self, state: &WizardState) -> bool {
        lock_intent(&mut self.pim, state)
    }

    /// Plan verdict for `state` without touching the session.
    pub fn verdict(&self, state: &WizardState) -> PlanVerdict {
        plan_watcher(&self.pim, state, None).verdict
    }

    /// Applies a completed round-trip to the session.
    pub fn record_turn(
        &mut self,
        turn_text: &str,
        deferred_topics: &[String],
        state: &WizardState,
        user_message: Option<&str>,
    ) -> TurnRecord {
        self.turn_count = self.upcoming_turn();
        let turn = self.turn_count;

        let addressed = mark_addressed(&mut self.obligations, turn_text);
        let reason = format!("uitgesteld in beurt {turn}");
        let deferred = deferred_topics
            .iter()
            .filter(|topic| defer_topic(&mut self.obligations, topic, &reason, turn))
            .count();

        let watch = plan_watcher(&self.pim, state, user_message);
        self.pim = watch.next_pim;
        self.pim.last_updated_turn = turn;

        TurnRecord { turn, addressed, deferred, verdict: watch.verdict, added_tensions: watch.added_tensions }
    }
}

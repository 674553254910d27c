use rust_decimal::Decimal;

use crate::conflicts::{rooms, total_budget, wishes, BASIS_CHAPTER};
use crate::domain::intent::{PlanVerdict, ProjectIntentModel};
use crate::domain::snapshot::WizardState;
use crate::memory::tensions::apply_tension_rules;

/// Budgets below this floor cannot carry a locked high-cost ambition.
pub const LOW_BUDGET_FLOOR: Decimal = Decimal::from_parts(75_000, 0, 0, false, 0);

const HIGH_COST_AMBITIONS: &[&str] =
    &["nieuwbouw", "villa", "kelder", "zwembad", "passiefhuis", "energieneutraal", "optopping"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanWatch {
    pub next_pim: ProjectIntentModel,
    pub verdict: PlanVerdict,
    pub added_tensions: Vec<&'static str>,
}

/// Checks the intent model against the latest snapshot.
///
/// `pim` is never mutated; all updates land in `PlanWatch::next_pim`.
pub fn plan_watcher(
    pim: &ProjectIntentModel,
    state: &WizardState,
    user_message: Option<&str>,
) -> PlanWatch {
    let mut next_pim = pim.clone();

    let verdict = if has_drifted(pim, state) {
        PlanVerdict::Drift
    } else if budget_contradicts_ambition(pim, state) {
        PlanVerdict::Conflict
    } else {
        PlanVerdict::Aligned
    };

    let added_tensions = apply_tension_rules(&mut next_pim, &rooms(state), &wishes(state));

    if let Some(question) = user_message.map(str::trim).filter(|m| m.contains('?')) {
        if !next_pim.open_questions.iter().any(|q| q == question) {
            next_pim.open_questions.push(question.to_string());
        }
    }

    PlanWatch { next_pim, verdict, added_tensions }
}

/// Locks intent the user declared in the `basis` chapter: `projectType`,
/// `priorities` and `ambition` (the north star). Values that are already
/// locked are kept, so later answers are judged against the first ones.
/// Returns `true` when anything was locked.
pub fn lock_intent(pim: &mut ProjectIntentModel, state: &WizardState) -> bool {
    let mut locked = false;

    if pim.locked.project_type.is_none() {
        if let Some(project_type) = state.answer_str(BASIS_CHAPTER, "projectType") {
            pim.locked.project_type = Some(project_type.to_string());
            locked = true;
        }
    }

    if pim.locked.top_priorities.is_empty() {
        let priorities = state
            .answer_list(BASIS_CHAPTER, "priorities")
            .iter()
            .filter_map(|priority| priority.as_str().map(str::trim))
            .filter(|priority| !priority.is_empty())
            .map(String::from)
            .collect::<Vec<_>>();
        if !priorities.is_empty() {
            pim.locked.top_priorities = priorities;
            locked = true;
        }
    }

    if pim.north_star.trim().is_empty() {
        if let Some(ambition) = state.answer_str(BASIS_CHAPTER, "ambition") {
            pim.north_star = ambition.to_string();
            locked = true;
        }
    }

    locked
}

fn has_drifted(pim: &ProjectIntentModel, state: &WizardState) -> bool {
    let Some(locked) = pim.locked.project_type.as_deref().map(str::trim) else {
        return false;
    };
    match state.answer_str(BASIS_CHAPTER, "projectType") {
        Some(current) => !current.eq_ignore_ascii_case(locked),
        None => false,
    }
}

fn budget_contradicts_ambition(pim: &ProjectIntentModel, state: &WizardState) -> bool {
    let Some(budget) = total_budget(state) else {
        return false;
    };
    if budget >= LOW_BUDGET_FLOOR {
        return false;
    }
    let locked_type = pim.locked.project_type.iter();
    locked_type.chain(pim.locked.top_priorities.iter()).any(|ambition| is_high_cost(ambition))
}

fn is_high_cost(ambition: &str) -> bool {
    let ambition = ambition.to_lowercase();
    HIGH_COST_AMBITIONS.iter().any(|keyword| ambition.contains(keyword))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{lock_intent, plan_watcher};
    use crate::domain::intent::{LockedIntent, PlanVerdict, ProjectIntentModel};
    use crate::domain::snapshot::WizardState;

    fn locked(project_type: &str, priorities: &[&str]) -> ProjectIntentModel {
        ProjectIntentModel {
            north_star: "Ruim gezinshuis".to_string(),
            locked: LockedIntent {
                project_type: Some(project_type.to_string()),
                top_priorities: priorities.iter().map(|p| p.to_string()).collect(),
            },
            ..ProjectIntentModel::default()
        }
    }

    #[test]
    fn changed_project_type_is_drift() {
        let pim = locked("verbouw", &[]);
        let state = WizardState::default().with_answer("basis", "projectType", json!("Nieuwbouw"));

        let watch = plan_watcher(&pim, &state, None);
        assert_eq!(watch.verdict, PlanVerdict::Drift);
    }

    #[test]
    fn low_budget_against_high_cost_ambition_is_conflict() {
        let pim = locked("verbouw", &["zwembad in de tuin"]);
        let state = WizardState::default()
            .with_answer("basis", "projectType", json!("verbouw"))
            .with_answer("budget", "budgetTotaal", json!(40_000));

        assert_eq!(plan_watcher(&pim, &state, None).verdict, PlanVerdict::Conflict);

        let rich = state.with_answer("budget", "budgetTotaal", json!(400_000));
        assert_eq!(plan_watcher(&pim, &rich, None).verdict, PlanVerdict::Aligned);
    }

    #[test]
    fn input_model_is_never_mutated() {
        let pim = ProjectIntentModel {
            north_star: "duurzaam wonen".to_string(),
            ..ProjectIntentModel::default()
        };
        let state = WizardState::default().with_answer(
            "wensen",
            "wishes",
            json!([{ "label": "Glazen pui", "priority": "nice" }]),
        );
        let before = pim.clone();

        let watch = plan_watcher(&pim, &state, Some("Kan dat ook goedkoper?"));

        assert_eq!(pim, before);
        assert_eq!(watch.next_pim.tensions.len(), 1);
        assert_eq!(watch.next_pim.open_questions, vec!["Kan dat ook goedkoper?".to_string()]);
        assert_eq!(watch.added_tensions.len(), 1);
        assert_eq!(watch.verdict, PlanVerdict::Aligned);
    }

    #[test]
    fn repeated_watch_does_not_duplicate_tensions() {
        let pim = ProjectIntentModel::default();
        let state = WizardState::default()
            .with_answer("wensen", "wishes", json!([{ "label": "Open keuken" }]))
            .with_answer("ruimtes", "rooms", json!([{ "name": "Woonkamer", "type": "woonkamer" }]));

        let first = plan_watcher(&pim, &state, None);
        let second = plan_watcher(&first.next_pim, &state, None);

        assert_eq!(first.next_pim.tensions.len(), 1);
        assert_eq!(second.next_pim.tensions.len(), 1);
        assert!(second.added_tensions.is_empty());
    }

    #[test]
    fn first_observation_locks_intent_and_later_answers_do_not_overwrite_it() {
        let mut pim = ProjectIntentModel::default();
        let state = WizardState::default()
            .with_answer("basis", "projectType", json!("verbouw"))
            .with_answer("basis", "priorities", json!(["duurzaamheid", "", 3]))
            .with_answer("basis", "ambition", json!("Energiezuinig gezinshuis"));

        assert!(lock_intent(&mut pim, &state));
        assert_eq!(pim.locked.project_type.as_deref(), Some("verbouw"));
        assert_eq!(pim.locked.top_priorities, vec!["duurzaamheid".to_string()]);
        assert_eq!(pim.north_star, "Energiezuinig gezinshuis");

        let changed = state.with_answer("basis", "projectType", json!("nieuwbouw"));
        assert!(!lock_intent(&mut pim, &changed));
        assert_eq!(pim.locked.project_type.as_deref(), Some("verbouw"));
        assert_eq!(plan_watcher(&pim, &changed, None).verdict, PlanVerdict::Drift);
    }

    #[test]
    fn empty_basis_locks_nothing() {
        let mut pim = ProjectIntentModel::default();
        assert!(!lock_intent(&mut pim, &WizardState::default()));
        assert_eq!(pim, ProjectIntentModel::default());
    }
}

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::conflict::{Conflict, ConflictType, Severity};
use crate::domain::snapshot::WizardState;

pub const BUDGET_CHAPTER: &str = "budget";
pub const WISHES_CHAPTER: &str = "wensen";
pub const ROOMS_CHAPTER: &str = "ruimtes";
pub const BASIS_CHAPTER: &str = "basis";

/// Nice-to-have cost may exceed the remaining budget by this factor before it
/// counts as an ambition mismatch.
const AMBITION_MISMATCH_FACTOR: Decimal = Decimal::from_parts(15, 0, 0, false, 1);

pub trait ConflictEngine: Send + Sync {
    fn detect(&self, state: &WizardState) -> Vec<Conflict>;
}

#[derive(Clone, Debug, Default)]
pub struct DeterministicConflictEngine;

impl ConflictEngine for DeterministicConflictEngine {
    fn detect(&self, state: &WizardState) -> Vec<Conflict> {
        detect_conflicts(state)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WishPriority {
    Must,
    Nice,
    Other,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Wish {
    pub index: usize,
    pub label: String,
    pub priority: WishPriority,
    pub estimated_cost: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Room {
    pub name: String,
    pub room_type: String,
    pub area: Option<Decimal>,
    pub floor: Option<String>,
    pub adjacent_to: Vec<String>,
}

pub fn detect_conflicts(state: &WizardState) -> Vec<Conflict> {
    let budget = total_budget(state);
    let wishes = wishes(state);
    let rooms = rooms(state);

    let mut conflicts = Vec::new();
    let must_total = priority_cost(&wishes, WishPriority::Must);

    if let Some(budget) = budget {
        if must_total > budget {
            conflicts.push(budget_risk(&wishes, budget, must_total));
        }
    }

    for wish in wishes.iter().filter(|w| w.priority == WishPriority::Must) {
        if wish.estimated_cost.is_none() {
            conflicts.push(must_have_unsatisfied(wish));
        }
    }

    if let Some(declared) = total_area(state) {
        let used = saturating_sum(rooms.iter().filter_map(|room| room.area));
        if used > declared {
            conflicts.push(physical_constraint(&rooms, declared, used));
        }
    }

    if let Some(budget) = budget {
        let nice_total = priority_cost(&wishes, WishPriority::Nice);
        let remaining = budget.saturating_sub(must_total).max(Decimal::ZERO);
        let tolerated = remaining.saturating_mul(AMBITION_MISMATCH_FACTOR);
        if nice_total > Decimal::ZERO && nice_total > tolerated {
            conflicts.push(ambition_mismatch(&wishes, remaining, nice_total));
        }
    }

    conflicts
}

pub fn total_budget(state: &WizardState) -> Option<Decimal> {
    state.answer(BUDGET_CHAPTER, "budgetTotaal").and_then(parse_money)
}

pub fn total_area(state: &WizardState) -> Option<Decimal> {
    state
        .answer(BASIS_CHAPTER, "totalArea")
        .and_then(parse_money)
        .or_else(|| state.answer(ROOMS_CHAPTER, "totalArea").and_then(parse_money))
}

pub fn wishes(state: &WizardState) -> Vec<Wish> {
    state
        .answer_list(WISHES_CHAPTER, "wishes")
        .iter()
        .enumerate()
        .filter(|(_, raw)| raw.is_object())
        .map(|(index, raw)| Wish {
            index,
            label: text_field(raw, "label").unwrap_or_else(|| format!("wens {}", index + 1)),
            priority: match text_field(raw, "priority").map(|p| p.to_ascii_lowercase()).as_deref()
            {
                Some("must") => WishPriority::Must,
                Some("nice") => WishPriority::Nice,
                _ => WishPriority::Other,
            },
            estimated_cost: raw.get("estimatedCost").and_then(parse_money),
        })
        .collect()
}

pub fn rooms(state: &WizardState) -> Vec<Room> {
    state
        .answer_list(ROOMS_CHAPTER, "rooms")
        .iter()
        .filter(|raw| raw.is_object())
        .map(|raw| Room {
            name: text_field(raw, "name").unwrap_or_default(),
            room_type: text_field(raw, "type").unwrap_or_default().to_lowercase(),
            area: raw.get("area").and_then(parse_money),
            floor: raw.get("floor").and_then(|floor| match floor {
                Value::String(s) => Some(s.trim().to_lowercase()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
            adjacent_to: raw
                .get("adjacentTo")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|s| s.trim().to_lowercase())
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

/// Parses a non-negative amount from a JSON number or a numeric string such
/// as `"€ 55 000"`. Anything else counts as absent.
pub fn parse_money(value: &Value) -> Option<Decimal> {
    let parsed = match value {
        Value::Number(number) => Decimal::from_str(&number.to_string())
            .ok()
            .or_else(|| number.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Value::String(raw) => {
            let cleaned = raw
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '€' && *c != '_')
                .collect::<String>()
                .replace(',', ".");
            Decimal::from_str(&cleaned).ok()
        }
        _ => None,
    }?;
    (parsed >= Decimal::ZERO).then_some(parsed)
}

fn text_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

fn priority_cost(wishes: &[Wish], priority: WishPriority) -> Decimal {
    saturating_sum(wishes.iter().filter(|w| w.priority == priority).filter_map(|w| w.estimated_cost))
}

/// Totals clamp at `Decimal::MAX`; a clamped total still exceeds any parsed budget or area.
fn saturating_sum(amounts: impl Iterator<Item = Decimal>) -> Decimal {
    amounts.fold(Decimal::ZERO, Decimal::saturating_add)
}

fn wish_fields(wishes: &[Wish], priority: WishPriority) -> Vec<String> {
    wishes
        .iter()
        .filter(|w| w.priority == priority)
        .map(|w| format!("{WISHES_CHAPTER}.wishes.{}.estimatedCost", w.index))
        .collect()
}

fn budget_risk(wishes: &[Wish], budget: Decimal, must_total: Decimal) -> Conflict {
    let mut affected_fields = vec![format!("{BUDGET_CHAPTER}.budgetTotaal")];
    affected_fields.extend(wish_fields(wishes, WishPriority::Must));

    Conflict {
        id: ConflictType::BudgetRisk.as_str().to_string(),
        conflict_type: ConflictType::BudgetRisk,
        severity: Severity::Blocking,
        description: format!(
            "De must-have wensen kosten samen {must_total}, meer dan het totale budget van {budget}."
        ),
        affected_fields,
        affected_chapters: vec![BUDGET_CHAPTER.to_string(), WISHES_CHAPTER.to_string()],
        resolution: "Verhoog het budget of verplaats wensen van must naar nice.".to_string(),
        estimated_cost: Some(must_total),
    }
}

fn must_have_unsatisfied(wish: &Wish) -> Conflict {
    Conflict {
        id: format!("{}:{}", ConflictType::MustHaveUnsatisfied.as_str(), wish.index),
        conflict_type: ConflictType::MustHaveUnsatisfied,
        severity: Severity::Warning,
        description: format!("De must-have wens '{}' heeft nog geen kostenraming.", wish.label),
        affected_fields: vec![format!("{WISHES_CHAPTER}.wishes.{}.estimatedCost", wish.index)],
        affected_chapters: vec![WISHES_CHAPTER.to_string()],
        resolution: "Vul een kostenraming in zodat de wens tegen het budget getoetst kan worden."
            .to_string(),
        estimated_cost: None,
    }
}

fn physical_constraint(rooms: &[Room], declared: Decimal, used: Decimal) -> Conflict {
    let mut affected_fields = vec![format!("{BASIS_CHAPTER}.totalArea")];
    affected_fields.extend((0..rooms.len()).map(|i| format!("{ROOMS_CHAPTER}.rooms.{i}.area")));

    Conflict {
        id: ConflictType::PhysicalConstraint.as_str().to_string(),
        conflict_type: ConflictType::PhysicalConstraint,
        severity: Severity::Blocking,
        description: format!(
            "De ruimtes beslaan samen {used} m², meer dan de opgegeven {declared} m²."
        ),
        affected_fields,
        affected_chapters: vec![BASIS_CHAPTER.to_string(), ROOMS_CHAPTER.to_string()],
        resolution: "Verklein of combineer ruimtes, of corrigeer het totale oppervlak.".to_string(),
        estimated_cost: None,
    }
}

fn ambition_mismatch(wishes: &[Wish], remaining: Decimal, nice_total: Decimal) -> Conflict {
    let mut affected_fields = vec![format!("{BUDGET_CHAPTER}.budgetTotaal")];
    affected_fields.extend(wish_fields(wishes, WishPriority::Nice));

    Conflict {
        id: ConflictType::AmbitionMismatch.as_str().to_string(),
        conflict_type: ConflictType::AmbitionMismatch,
        severity: Severity::Warning,
        description: format!(
            "De nice-to-have wensen kosten {nice_total}, ruim boven het resterende budget van {remaining}."
        ),
        affected_fields,
        affected_chapters: vec![BUDGET_CHAPTER.to_string(), WISHES_CHAPTER.to_string()],
        resolution: "Kies welke nice-to-have wensen in een latere fase kunnen.".to_string(),
        estimated_cost: Some(nice_total),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{detect_conflicts, parse_money, ConflictEngine, DeterministicConflictEngine};
    use crate::domain::conflict::{ConflictType, Severity};
    use crate::domain::snapshot::WizardState;

    fn state(budget: serde_json::Value, wishes: serde_json::Value) -> WizardState {
        WizardState::default()
            .with_answer("budget", "budgetTotaal", budget)
            .with_answer("wensen", "wishes", wishes)
    }

    #[test]
    fn must_wishes_over_budget_raise_blocking_budget_risk() {
        let conflicts = detect_conflicts(&state(
            json!(50_000),
            json!([
                { "label": "uitbouw", "priority": "must", "estimatedCost": 40_000 },
                { "label": "dakkapel", "priority": "must", "estimatedCost": 15_000 }
            ]),
        ));

        let risk = conflicts
            .iter()
            .find(|c| c.conflict_type == ConflictType::BudgetRisk)
            .expect("budget risk expected");
        assert_eq!(risk.severity, Severity::Blocking);
        assert_eq!(risk.estimated_cost, Some(Decimal::new(55_000, 0)));
        assert!(risk.affected_chapters.contains(&"budget".to_string()));
        assert!(risk.affected_fields.contains(&"wensen.wishes.1.estimatedCost".to_string()));
    }

    #[test]
    fn affordable_must_wish_has_no_budget_risk() {
        let conflicts = detect_conflicts(&state(
            json!(150_000),
            json!([{ "label": "keuken", "priority": "must", "estimatedCost": 30_000 }]),
        ));

        assert!(conflicts.iter().all(|c| c.conflict_type != ConflictType::BudgetRisk));
    }

    #[test]
    fn must_wish_without_cost_is_a_warning() {
        let conflicts = detect_conflicts(&state(
            json!(150_000),
            json!([{ "label": "warmtepomp", "priority": "must" }]),
        ));

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::MustHaveUnsatisfied);
        assert_eq!(conflicts[0].severity, Severity::Warning);
        assert!(conflicts[0].description.contains("warmtepomp"));
    }

    #[test]
    fn rooms_larger_than_declared_area_are_blocking() {
        let state = WizardState::default()
            .with_answer("basis", "totalArea", json!(100))
            .with_answer(
                "ruimtes",
                "rooms",
                json!([
                    { "name": "woonkamer", "area": 120 },
                    { "name": "keuken", "area": 60 },
                    { "name": "zolder", "area": "50" }
                ]),
            );

        let conflicts = detect_conflicts(&state);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::PhysicalConstraint);
        assert!(conflicts[0].is_blocking());
        assert!(conflicts[0].description.contains("230"));
    }

    #[test]
    fn expensive_nice_wishes_raise_ambition_mismatch() {
        let conflicts = detect_conflicts(&state(
            json!(100_000),
            json!([
                { "label": "aanbouw", "priority": "must", "estimatedCost": 90_000 },
                { "label": "sauna", "priority": "nice", "estimatedCost": 25_000 }
            ]),
        ));

        assert!(conflicts.iter().any(|c| c.conflict_type == ConflictType::AmbitionMismatch));
        assert!(conflicts.iter().all(|c| c.conflict_type != ConflictType::BudgetRisk));
    }

    #[test]
    fn rules_may_co_occur() {
        let conflicts = detect_conflicts(&state(
            json!(10_000),
            json!([
                { "label": "a", "priority": "must", "estimatedCost": 20_000 },
                { "label": "b", "priority": "must" },
                { "label": "c", "priority": "nice", "estimatedCost": 5_000 }
            ]),
        ));

        let types = conflicts.iter().map(|c| c.conflict_type).collect::<Vec<_>>();
        assert_eq!(
            types,
            vec![
                ConflictType::BudgetRisk,
                ConflictType::MustHaveUnsatisfied,
                ConflictType::AmbitionMismatch
            ]
        );
    }

    #[test]
    fn malformed_snapshots_never_panic() {
        let mut broken = WizardState::default();
        broken.chapter_answers.insert("budget".into(), json!("veel"));
        broken.chapter_answers.insert("wensen".into(), json!({ "wishes": "geen lijst" }));
        broken.chapter_answers.insert("ruimtes".into(), json!({ "rooms": [1, null, "x"] }));
        broken.chapter_answers.insert("basis".into(), json!({ "totalArea": -5 }));

        assert!(DeterministicConflictEngine.detect(&broken).is_empty());
        assert!(detect_conflicts(&WizardState::default()).is_empty());
    }

    #[test]
    fn huge_amounts_saturate_instead_of_overflowing() {
        let nice_only = detect_conflicts(&state(
            json!("70000000000000000000000000000"),
            json!([{ "label": "zwembad", "priority": "nice", "estimatedCost": 1_000 }]),
        ));
        assert!(nice_only.is_empty());

        let musts = detect_conflicts(&state(
            json!(100_000),
            json!([
                { "label": "a", "priority": "must", "estimatedCost": "50000000000000000000000000000" },
                { "label": "b", "priority": "must", "estimatedCost": "50000000000000000000000000000" },
                { "label": "c", "priority": "nice", "estimatedCost": "50000000000000000000000000000" }
            ]),
        ));
        let risk = musts.iter().find(|c| c.conflict_type == ConflictType::BudgetRisk);
        assert_eq!(risk.and_then(|c| c.estimated_cost), Some(Decimal::MAX));
        assert!(musts.iter().any(|c| c.conflict_type == ConflictType::AmbitionMismatch));

        let rooms = WizardState::default().with_answer("basis", "totalArea", json!(100)).with_answer(
            "ruimtes",
            "rooms",
            json!([
                { "name": "hal", "area": "50000000000000000000000000000" },
                { "name": "gang", "area": "50000000000000000000000000000" }
            ]),
        );
        let conflicts = detect_conflicts(&rooms);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::PhysicalConstraint);
    }

    #[test]
    fn money_parsing_accepts_formatted_strings() {
        assert_eq!(parse_money(&json!("€ 55 000")), Some(Decimal::new(55_000, 0)));
        assert_eq!(parse_money(&json!("12,5")), Some(Decimal::new(125, 1)));
        assert_eq!(parse_money(&json!(1.5)), Some(Decimal::new(15, 1)));
        assert_eq!(parse_money(&json!(-1)), None);
        assert_eq!(parse_money(&json!(true)), None);
    }
}

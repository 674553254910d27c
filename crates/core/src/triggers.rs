//! Field-change detection between consecutive wizard snapshots.
//!
//! The detector is the primary loop breaker: changes that did not originate
//! from the user never produce triggers, so assistant-applied patches cannot
//! wake the assistant again.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;

use crate::domain::snapshot::WizardState;
use crate::domain::trigger::{ChangeSource, FieldChange, FieldTrigger};

pub fn detect_field_triggers(
    prev: &WizardState,
    next: &WizardState,
    source: ChangeSource,
) -> Vec<FieldTrigger> {
    if !source.is_user() || prev.chapter_answers == next.chapter_answers {
        return Vec::new();
    }

    let before = flatten_answers(prev);
    let after = flatten_answers(next);
    let mut changes: BTreeMap<&str, FieldChange> = BTreeMap::new();

    for (path, value) in &after {
        match before.get(path) {
            Some(previous) if previous == value => {}
            Some(_) => {
                changes.insert(path.as_str(), FieldChange::Changed);
            }
            None => {
                changes.insert(path.as_str(), FieldChange::Added);
            }
        }
    }
    for path in before.keys() {
        if !after.contains_key(path) {
            changes.insert(path.as_str(), FieldChange::Removed);
        }
    }

    let timestamp = Utc::now();
    changes
        .into_iter()
        .map(|(path, change)| FieldTrigger {
            field_path: path.to_string(),
            source,
            change,
            confidence: change.confidence(),
            timestamp,
        })
        .collect()
}

/// The chapter the user navigated to, if the current chapter changed.
pub fn detect_chapter_transition(
    prev: &WizardState,
    next: &WizardState,
    source: ChangeSource,
) -> Option<String> {
    if !source.is_user() || prev.current_chapter == next.current_chapter {
        return None;
    }
    next.current_chapter.clone()
}

pub fn newly_completed_chapters(prev: &WizardState, next: &WizardState) -> Vec<String> {
    next.completed_chapters
        .iter()
        .filter(|chapter| !prev.completed_chapters.contains(chapter))
        .cloned()
        .collect()
}

fn flatten_answers(state: &WizardState) -> BTreeMap<String, &Value> {
    let mut leaves = BTreeMap::new();
    for (chapter, answers) in &state.chapter_answers {
        flatten_into(chapter.clone(), answers, &mut leaves);
    }
    leaves
}

fn flatten_into<'a>(path: String, value: &'a Value, leaves: &mut BTreeMap<String, &'a Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(format!("{path}.{key}"), child, leaves);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(format!("{path}.{index}"), child, leaves);
            }
        }
        _ => {
            leaves.insert(path, value);
        }
    }
}

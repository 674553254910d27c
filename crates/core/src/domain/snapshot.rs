use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Snapshot of the requirements wizard as seen by the assistant.
///
/// Only `chapter_answers` is user content. The remaining fields are navigation
/// metadata and never produce field triggers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WizardState {
    pub chapter_answers: BTreeMap<String, Value>,
    pub current_chapter: Option<String>,
    pub mode: Option<String>,
    pub completed_chapters: Vec<String>,
}

impl WizardState {
    pub fn chapter(&self, chapter: &str) -> Option<&Value> {
        self.chapter_answers.get(chapter)
    }

    pub fn answer(&self, chapter: &str, key: &str) -> Option<&Value> {
        self.chapter(chapter).and_then(|answers| answers.get(key))
    }

    pub fn answer_str(&self, chapter: &str, key: &str) -> Option<&str> {
        self.answer(chapter, key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
    }

    /// Array answer, or an empty slice when missing or not an array.
    pub fn answer_list(&self, chapter: &str, key: &str) -> &[Value] {
        self.answer(chapter, key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn with_answer(mut self, chapter: &str, key: &str, value: Value) -> Self {
        let entry = self
            .chapter_answers
            .entry(chapter.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if !entry.is_object() {
            *entry = Value::Object(Default::default());
        }
        if let Value::Object(map) = entry {
            map.insert(key.to_string(), value);
        }
        self
    }

    pub fn with_chapter(mut self, chapter: impl Into<String>) -> Self {
        self.current_chapter = Some(chapter.into());
        self
    }
}

/// Who is currently driving the wizard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    #[default]
    User,
    Assistant,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::WizardState;

    #[test]
    fn deserializes_camel_case_and_tolerates_missing_fields() {
        let state: WizardState = serde_json::from_value(json!({
            "chapterAnswers": { "budget": { "budgetTotaal": 100000 } },
            "currentChapter": "budget",
            "somethingElse": true
        }))
        .expect("snapshot should deserialize");

        assert_eq!(state.current_chapter.as_deref(), Some("budget"));
        assert_eq!(state.answer("budget", "budgetTotaal"), Some(&json!(100000)));
        assert!(state.completed_chapters.is_empty());
        assert!(state.answer_list("wensen", "wishes").is_empty());
    }

    #[test]
    fn with_answer_replaces_non_object_chapter() {
        let mut state = WizardState::default();
        state.chapter_answers.insert("basis".to_string(), json!("garbage"));

        let state = state.with_answer("basis", "projectType", json!("verbouw"));
        assert_eq!(state.answer_str("basis", "projectType"), Some("verbouw"));
    }
}

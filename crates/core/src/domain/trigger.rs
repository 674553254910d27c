use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance tag carried with every state mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    User,
    Ai,
    System,
}

impl ChangeSource {
    pub fn is_user(self) -> bool {
        matches!(self, Self::User)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldChange {
    Changed,
    Added,
    Removed,
}

impl FieldChange {
    pub fn confidence(self) -> f32 {
        match self {
            Self::Changed => 1.0,
            Self::Added => 0.9,
            Self::Removed => 0.7,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTrigger {
    pub field_path: String,
    pub source: ChangeSource,
    pub change: FieldChange,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

impl FieldTrigger {
    /// First path segment, which is always the chapter key.
    pub fn chapter(&self) -> &str {
        self.field_path.split('.').next().unwrap_or_default()
    }
}

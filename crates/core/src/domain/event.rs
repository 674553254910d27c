use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::trigger::ChangeSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainEventType {
    ChapterEntered,
    ChapterCompleted,
    FieldEdited,
    Idle,
}

impl DomainEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChapterEntered => "chapter_entered",
            Self::ChapterCompleted => "chapter_completed",
            Self::FieldEdited => "field_edited",
            Self::Idle => "idle",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Whether a turn was requested by the user or raised proactively.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    #[default]
    Auto,
    User,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: DomainEventType,
    pub source: ChangeSource,
    pub project_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl DomainEvent {
    pub fn new(
        event_type: DomainEventType,
        source: ChangeSource,
        project_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            source,
            project_id: project_id.into(),
            user_id: user_id.into(),
            timestamp: Utc::now(),
            priority: Priority::default(),
            chapter: None,
            payload: None,
        }
    }

    pub fn with_chapter(mut self, chapter: impl Into<String>) -> Self {
        self.chapter = Some(chapter.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

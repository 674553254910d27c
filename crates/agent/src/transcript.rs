use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMessage {
    pub id: String,
    pub project_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<String>,
}

impl TranscriptMessage {
    pub fn new(project_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            trigger_id: None,
        }
    }

    pub fn assistant(
        project_id: impl Into<String>,
        content: impl Into<String>,
        trigger_id: impl Into<String>,
    ) -> Self {
        Self { trigger_id: Some(trigger_id.into()), ..Self::new(project_id, Role::Assistant, content) }
    }
}

/// Append-only, role-tagged message log.
pub trait TranscriptStore: Send + Sync {
    fn append(&self, message: TranscriptMessage);
    fn messages(&self, project_id: &str) -> Vec<TranscriptMessage>;
}

#[derive(Clone, Default)]
pub struct InMemoryTranscript {
    messages: Arc<Mutex<Vec<TranscriptMessage>>>,
}

impl InMemoryTranscript {
    pub fn assistant_messages(&self, project_id: &str) -> Vec<TranscriptMessage> {
        self.messages(project_id).into_iter().filter(|m| m.role == Role::Assistant).collect()
    }
}

impl TranscriptStore for InMemoryTranscript {
    fn append(&self, message: TranscriptMessage) {
        match self.messages.lock() {
            Ok(mut messages) => messages.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
    }

    fn messages(&self, project_id: &str) -> Vec<TranscriptMessage> {
        let messages = match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        messages.into_iter().filter(|m| m.project_id == project_id).collect()
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Turns an obligation may stay open before it is due.
pub const OBLIGATION_GRACE_TURNS: u32 = 3;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LockedIntent {
    pub project_type: Option<String>,
    pub top_priorities: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensionRisk {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tension {
    pub label: String,
    pub cause: String,
    pub risk: TensionRisk,
}

/// Running model of what the project is trying to achieve.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectIntentModel {
    pub north_star: String,
    pub locked: LockedIntent,
    pub assumptions: Vec<String>,
    pub open_questions: Vec<String>,
    pub tensions: Vec<Tension>,
    pub last_updated_turn: u32,
}

impl ProjectIntentModel {
    pub fn has_tension(&self, label: &str) -> bool {
        self.tensions.iter().any(|tension| tension.label == label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationStatus {
    Open,
    Addressed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Obligation {
    pub id: String,
    pub topic: String,
    pub reason: String,
    pub created_at_turn: u32,
    pub must_address_by_turn: u32,
    pub status: ObligationStatus,
}

impl Obligation {
    pub fn open(topic: impl Into<String>, reason: impl Into<String>, turn: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            reason: reason.into(),
            created_at_turn: turn,
            must_address_by_turn: turn.saturating_add(OBLIGATION_GRACE_TURNS),
            status: ObligationStatus::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == ObligationStatus::Open
    }

    pub fn is_due(&self, current_turn: u32) -> bool {
        self.is_open() && current_turn >= self.must_address_by_turn
    }

    pub fn is_overdue(&self, current_turn: u32) -> bool {
        self.is_open() && current_turn > self.must_address_by_turn
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanVerdict {
    Aligned,
    Drift,
    Conflict,
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    BudgetRisk,
    MustHaveUnsatisfied,
    PhysicalConstraint,
    AmbitionMismatch,
}

impl ConflictType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BudgetRisk => "budget_risk",
            Self::MustHaveUnsatisfied => "must_have_unsatisfied",
            Self::PhysicalConstraint => "physical_constraint",
            Self::AmbitionMismatch => "ambition_mismatch",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocking,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub id: String,
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub description: String,
    pub affected_fields: Vec<String>,
    pub affected_chapters: Vec<String>,
    pub resolution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<Decimal>,
}

impl Conflict {
    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

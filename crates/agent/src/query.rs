use std::fmt::Write as _;

use proactor_core::domain::conflict::Conflict;
use proactor_core::domain::event::{DomainEvent, DomainEventType};
use proactor_core::domain::intent::{Obligation, PlanVerdict};
use serde::{Deserialize, Serialize};

use crate::contract::CONTRACT_INSTRUCTIONS;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCategory {
    Navigation,
    Edit,
    Idle,
}

impl TriggerCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::Edit => "edit",
            Self::Idle => "idle",
        }
    }
}

impl From<DomainEventType> for TriggerCategory {
    fn from(value: DomainEventType) -> Self {
        match value {
            DomainEventType::ChapterEntered | DomainEventType::ChapterCompleted => Self::Navigation,
            DomainEventType::FieldEdited => Self::Edit,
            DomainEventType::Idle => Self::Idle,
        }
    }
}

pub struct QueryContext<'a> {
    pub event: &'a DomainEvent,
    pub category: TriggerCategory,
    pub conflicts: &'a [Conflict],
    pub urgent_obligations: &'a [Obligation],
    pub verdict: PlanVerdict,
}

/// Renders the instruction text sent to the turn orchestrator.
pub fn build_query(context: &QueryContext<'_>) -> String {
    let event = context.event;
    let mut query = String::new();

    let _ = writeln!(query, "Gebeurtenis: {}", event.event_type.as_str());
    let _ = writeln!(query, "Categorie: {}", context.category.as_str());
    if let Some(chapter) = &event.chapter {
        let _ = writeln!(query, "Hoofdstuk: {chapter}");
    }
    if let Some(fields) = event.payload.as_ref().and_then(|p| p.get("fields")) {
        if let Some(fields) = fields.as_array() {
            let paths = fields.iter().filter_map(|f| f.as_str()).collect::<Vec<_>>();
            if !paths.is_empty() {
                let _ = writeln!(query, "Gewijzigde velden: {}", paths.join(", "));
            }
        }
    }

    match context.verdict {
        PlanVerdict::Aligned => {}
        PlanVerdict::Drift => {
            let _ = writeln!(query, "Plan: het projecttype wijkt af van de vastgelegde intentie.");
        }
        PlanVerdict::Conflict => {
            let _ = writeln!(query, "Plan: het budget past niet bij de vastgelegde ambitie.");
        }
    }

    if !context.conflicts.is_empty() {
        let _ = writeln!(query, "Conflicten:");
        for conflict in context.conflicts {
            let _ = writeln!(
                query,
                "- [{}] {} Oplossing: {}",
                conflict.conflict_type.as_str(),
                conflict.description,
                conflict.resolution
            );
        }
    }

    if !context.urgent_obligations.is_empty() {
        let _ = writeln!(query, "Openstaande toezeggingen, behandel deze nu:");
        for obligation in context.urgent_obligations {
            let _ = writeln!(query, "- {} ({})", obligation.topic, obligation.reason);
        }
    }

    query.push_str(CONTRACT_INSTRUCTIONS);
    query
}

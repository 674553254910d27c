pub mod audit;
pub mod config;
pub mod conflicts;
pub mod domain;
pub mod errors;
pub mod memory;
pub mod triggers;

pub use audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use conflicts::{detect_conflicts, ConflictEngine, DeterministicConflictEngine};
pub use domain::conflict::{Conflict, ConflictType, Severity};
pub use domain::event::{DomainEvent, DomainEventType, InteractionMode, Priority};
pub use domain::intent::{Obligation, ObligationStatus, PlanVerdict, ProjectIntentModel};
pub use domain::snapshot::{ControlMode, WizardState};
pub use domain::trigger::{ChangeSource, FieldChange, FieldTrigger};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use memory::{get_urgent_obligations, plan_watcher, PlanWatch};
pub use triggers::{detect_chapter_transition, detect_field_triggers, newly_completed_chapters};

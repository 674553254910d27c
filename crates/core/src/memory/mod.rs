pub mod obligations;
pub mod plan_watcher;
pub mod tensions;

pub use obligations::{defer_topic, get_urgent_obligations, mark_addressed};
pub use plan_watcher::{lock_intent, plan_watcher, PlanWatch, LOW_BUDGET_FLOOR};
pub use tensions::{apply_tension_rules, TensionRule, TENSION_RULES};

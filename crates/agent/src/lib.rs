//! Proactive turn runtime.
//!
//! This crate decides when the assistant embedded in the requirements wizard
//! speaks on its own initiative and what it is allowed to say:
//! - `runner` debounces user-sourced wizard changes into domain events and
//!   applies the silence guard, rate limit and single-flight rules
//! - `router` turns one domain event into a turn request and exposes the result
//! - `contract` validates, retries and falls back on generated text
//! - `conversation` keeps the per-project intent model and follow-up obligations
//! - `orchestrator` is the seam to the text generation service
//!
//! The model never mutates the wizard directly. Patches it proposes are only
//! surfaced for user-requested turns that explicitly allow them.

pub mod contract;
pub mod conversation;
pub mod orchestrator;
pub mod query;
pub mod router;
pub mod runner;
pub mod transcript;

#[cfg(test)]
pub(crate) mod testing;

pub use contract::{ContractEnforcer, EnforcedTurn, GuardVerdict};
pub use orchestrator::{
    HttpTurnOrchestrator, OrchestratorError, TurnOrchestrator, TurnRequest, TurnResult,
    UnconfiguredOrchestrator,
};
pub use router::{EventRouter, RouterContext};
pub use runner::{AutoTurnRunner, RunnerContext, SchedulerSettings};
pub use transcript::{InMemoryTranscript, TranscriptMessage, TranscriptStore};

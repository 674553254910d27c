use std::sync::Arc;

use proactor_agent::orchestrator::{
    HttpTurnOrchestrator, OrchestratorError, TurnOrchestrator, UnconfiguredOrchestrator,
};
use proactor_agent::runner::{AutoTurnRunner, SchedulerSettings};
use proactor_agent::transcript::{InMemoryTranscript, TranscriptStore};
use proactor_core::audit::{AuditSink, TracingAuditSink};
use proactor_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestratorMode {
    Http,
    Unconfigured,
}

impl OrchestratorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Unconfigured => "unconfigured",
        }
    }
}

pub struct Application {
    pub config: AppConfig,
    pub orchestrator_mode: OrchestratorMode,
    pub transcript: Arc<dyn TranscriptStore>,
    pub runner: AutoTurnRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("turn orchestrator client could not be built: {0}")]
    Orchestrator(#[source] OrchestratorError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        project_id = "unknown",
        "starting application bootstrap"
    );

    let (orchestrator, orchestrator_mode): (Arc<dyn TurnOrchestrator>, OrchestratorMode) =
        match HttpTurnOrchestrator::from_config(&config.orchestrator)
            .map_err(BootstrapError::Orchestrator)?
        {
            Some(client) => (Arc::new(client), OrchestratorMode::Http),
            None => (Arc::new(UnconfiguredOrchestrator), OrchestratorMode::Unconfigured),
        };
    info!(
        event_name = "system.bootstrap.orchestrator_ready",
        correlation_id = "bootstrap",
        project_id = "unknown",
        orchestrator_mode = orchestrator_mode.as_str(),
        "turn orchestrator initialized"
    );

    let transcript: Arc<dyn TranscriptStore> = Arc::new(InMemoryTranscript::default());
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let runner = AutoTurnRunner::new(
        SchedulerSettings::from(&config.scheduler),
        orchestrator,
        Arc::clone(&transcript),
        audit,
    );

    Ok(Application { config, orchestrator_mode, transcript, runner })
}

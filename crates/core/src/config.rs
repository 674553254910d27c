use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub orchestrator: OrchestratorConfig,
    pub scheduler: SchedulerConfig,
    pub stream: StreamConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub endpoint_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub debounce_ms: u64,
    pub cooldown_secs: u64,
    pub rate_limit_per_category: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    pub chunk_size: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub orchestrator_endpoint_url: Option<String>,
    pub orchestrator_api_key: Option<String>,
    pub debounce_ms: Option<u64>,
    pub cooldown_secs: Option<u64>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { debounce_ms: 400, cooldown_secs: 10, rate_limit_per_category: true }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { chunk_size: 48 }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig { endpoint_url: None, api_key: None, timeout_secs: 30 },
            scheduler: SchedulerConfig::default(),
            stream: StreamConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("proactor.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(orchestrator) = patch.orchestrator {
            if let Some(endpoint_url) = orchestrator.endpoint_url {
                self.orchestrator.endpoint_url = Some(endpoint_url);
            }
            if let Some(api_key) = orchestrator.api_key {
                self.orchestrator.api_key = Some(secret_value(api_key));
            }
            if let Some(timeout_secs) = orchestrator.timeout_secs {
                self.orchestrator.timeout_secs = timeout_secs;
            }
        }

        if let Some(scheduler) = patch.scheduler {
            if let Some(debounce_ms) = scheduler.debounce_ms {
                self.scheduler.debounce_ms = debounce_ms;
            }
            if let Some(cooldown_secs) = scheduler.cooldown_secs {
                self.scheduler.cooldown_secs = cooldown_secs;
            }
            if let Some(per_category) = scheduler.rate_limit_per_category {
                self.scheduler.rate_limit_per_category = per_category;
            }
        }

        if let Some(stream) = patch.stream {
            if let Some(chunk_size) = stream.chunk_size {
                self.stream.chunk_size = chunk_size;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PROACTOR_ORCHESTRATOR_ENDPOINT_URL") {
            self.orchestrator.endpoint_url = Some(value);
        }
        if let Some(value) = read_env("PROACTOR_ORCHESTRATOR_API_KEY") {
            self.orchestrator.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PROACTOR_ORCHESTRATOR_TIMEOUT_SECS") {
            self.orchestrator.timeout_secs =
                parse_u64("PROACTOR_ORCHESTRATOR_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PROACTOR_SCHEDULER_DEBOUNCE_MS") {
            self.scheduler.debounce_ms = parse_u64("PROACTOR_SCHEDULER_DEBOUNCE_MS", &value)?;
        }
        if let Some(value) = read_env("PROACTOR_SCHEDULER_COOLDOWN_SECS") {
            self.scheduler.cooldown_secs = parse_u64("PROACTOR_SCHEDULER_COOLDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("PROACTOR_SCHEDULER_RATE_LIMIT_PER_CATEGORY") {
            self.scheduler.rate_limit_per_category =
                parse_bool("PROACTOR_SCHEDULER_RATE_LIMIT_PER_CATEGORY", &value)?;
        }

        if let Some(value) = read_env("PROACTOR_STREAM_CHUNK_SIZE") {
            self.stream.chunk_size = parse_usize("PROACTOR_STREAM_CHUNK_SIZE", &value)?;
        }

        if let Some(value) = read_env("PROACTOR_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PROACTOR_SERVER_PORT") {
            self.server.port = parse_u16("PROACTOR_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PROACTOR_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PROACTOR_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("PROACTOR_LOGGING_LEVEL").or_else(|| read_env("PROACTOR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PROACTOR_LOGGING_FORMAT").or_else(|| read_env("PROACTOR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(endpoint_url) = overrides.orchestrator_endpoint_url {
            self.orchestrator.endpoint_url = Some(endpoint_url);
        }
        if let Some(api_key) = overrides.orchestrator_api_key {
            self.orchestrator.api_key = Some(secret_value(api_key));
        }
        if let Some(debounce_ms) = overrides.debounce_ms {
            self.scheduler.debounce_ms = debounce_ms;
        }
        if let Some(cooldown_secs) = overrides.cooldown_secs {
            self.scheduler.cooldown_secs = cooldown_secs;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_orchestrator(&self.orchestrator)?;
        validate_scheduler(&self.scheduler)?;
        validate_stream(&self.stream)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("proactor.toml"), PathBuf::from("config/proactor.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_orchestrator(orchestrator: &OrchestratorConfig) -> Result<(), ConfigError> {
    if orchestrator.timeout_secs == 0 || orchestrator.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "orchestrator.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if let Some(endpoint_url) = &orchestrator.endpoint_url {
        if !endpoint_url.starts_with("http://") && !endpoint_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "orchestrator.endpoint_url must start with http:// or https://".to_string(),
            ));
        }
    }

    let blank_key = orchestrator
        .api_key
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(false);
    if blank_key {
        return Err(ConfigError::Validation(
            "orchestrator.api_key must not be blank when provided".to_string(),
        ));
    }

    Ok(())
}

fn validate_scheduler(scheduler: &SchedulerConfig) -> Result<(), ConfigError> {
    if scheduler.debounce_ms == 0 || scheduler.debounce_ms > 5_000 {
        return Err(ConfigError::Validation(
            "scheduler.debounce_ms must be in range 1..=5000".to_string(),
        ));
    }

    if scheduler.cooldown_secs > 3_600 {
        return Err(ConfigError::Validation(
            "scheduler.cooldown_secs must be at most 3600".to_string(),
        ));
    }

    Ok(())
}

fn validate_stream(stream: &StreamConfig) -> Result<(), ConfigError> {
    if !(8..=1024).contains(&stream.chunk_size) {
        return Err(ConfigError::Validation(
            "stream.chunk_size must be in range 8..=1024".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    orchestrator: Option<OrchestratorPatch>,
    scheduler: Option<SchedulerPatch>,
    stream: Option<StreamPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct OrchestratorPatch {
    endpoint_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerPatch {
    debounce_ms: Option<u64>,
    cooldown_secs: Option<u64>,
    rate_limit_per_category: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamPatch {
    chunk_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

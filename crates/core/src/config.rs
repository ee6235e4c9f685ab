use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::deal::DealStatus;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub agent: AgentConfig,
    pub automation: AutomationConfig,
    pub autopilot: AutopilotConfig,
    pub ops: OpsConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    /// Model used by the coordinator.
    pub flagship_model: String,
    /// Model used by specialists.
    pub standard_model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
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

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_turns: u32,
    pub history_limit: usize,
    pub inject_system_context: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_turns: 15, history_limit: 50, inject_system_context: true }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Minimum filename-classification confidence before an upload is reclassified or a
    /// review task is opened.
    pub reclassify_min_confidence: f64,
    pub alert_failure_threshold: u32,
    pub health_window_days: i64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self { reclassify_min_confidence: 0.7, alert_failure_threshold: 3, health_window_days: 7 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    pub min_kpi_sample_size: u32,
    pub min_matched_predictions: u32,
    pub max_median_timeline_mae_days: f64,
    pub max_approval_calibration_gap: f64,
    pub min_probability_approval: f64,
    pub min_strategy_sample_size: u32,
    pub approval_weight: f64,
    pub speed_weight: f64,
    pub lookback_months: u32,
    pub record_limit: u32,
    pub sweep_limit: u32,
    pub sweep_statuses: Vec<DealStatus>,
    pub collaborator_timeout_secs: u64,
    pub collaborator_retries: u32,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            min_kpi_sample_size: 20,
            min_matched_predictions: 10,
            max_median_timeline_mae_days: 45.0,
            max_approval_calibration_gap: 0.15,
            min_probability_approval: 0.55,
            min_strategy_sample_size: 5,
            approval_weight: 0.7,
            speed_weight: 0.3,
            lookback_months: 36,
            record_limit: 500,
            sweep_limit: 25,
            sweep_statuses: vec![DealStatus::Preapp, DealStatus::Concept],
            collaborator_timeout_secs: 30,
            collaborator_retries: 2,
        }
    }
}

/// Operational settings checked by the health evaluator.
#[derive(Clone, Debug, Default)]
pub struct OpsConfig {
    pub storage_url: Option<String>,
    pub cron_secret: Option<SecretString>,
    pub error_reporting_dsn: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

impl LlmProvider {
    fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// A fully resolved model endpoint.
#[derive(Clone, Debug)]
pub struct ModelEndpoint {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Resolves the endpoint the model runtime talks to. Precedence: explicit `base_url`,
    /// then the provider default. Hosted providers without an api key resolve to `None`.
    pub fn resolve_endpoint(&self) -> Option<ModelEndpoint> {
        let api_key = self
            .api_key
            .as_ref()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .cloned();
        if self.provider == LlmProvider::OpenAi && api_key.is_none() {
            return None;
        }

        let base_url = self
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string();

        Some(ModelEndpoint { base_url, api_key, timeout_secs: self.timeout_secs })
    }
}

impl OpsConfig {
    pub fn has_cron_secret(&self) -> bool {
        self.cron_secret.as_ref().map(|secret| !secret.expose_secret().is_empty()).unwrap_or(false)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub agent_max_turns: Option<u32>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://entops.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                flagship_model: "gpt-5.2".to_string(),
                standard_model: "gpt-5.1".to_string(),
                timeout_secs: 60,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            agent: AgentConfig::default(),
            automation: AutomationConfig::default(),
            autopilot: AutopilotConfig::default(),
            ops: OpsConfig::default(),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("entops.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(api_key.into());
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(flagship_model) = llm.flagship_model {
                self.llm.flagship_model = flagship_model;
            }
            if let Some(standard_model) = llm.standard_model {
                self.llm.standard_model = standard_model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
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

        if let Some(ops) = patch.ops {
            if let Some(storage_url) = ops.storage_url {
                self.ops.storage_url = Some(storage_url);
            }
            if let Some(cron_secret) = ops.cron_secret {
                self.ops.cron_secret = Some(cron_secret.into());
            }
            if let Some(error_reporting_dsn) = ops.error_reporting_dsn {
                self.ops.error_reporting_dsn = Some(error_reporting_dsn);
            }
        }

        if let Some(agent) = patch.agent {
            self.agent = agent;
        }
        if let Some(automation) = patch.automation {
            self.automation = automation;
        }
        if let Some(autopilot) = patch.autopilot {
            self.autopilot = autopilot;
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ENTOPS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ENTOPS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("ENTOPS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ENTOPS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("ENTOPS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ENTOPS_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("ENTOPS_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("ENTOPS_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("ENTOPS_LLM_FLAGSHIP_MODEL") {
            self.llm.flagship_model = value;
        }
        if let Some(value) = read_env("ENTOPS_LLM_STANDARD_MODEL") {
            self.llm.standard_model = value;
        }
        if let Some(value) = read_env("ENTOPS_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("ENTOPS_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ENTOPS_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_env("ENTOPS_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("ENTOPS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ENTOPS_SERVER_PORT") {
            self.server.port = parse_env("ENTOPS_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("ENTOPS_AGENT_MAX_TURNS") {
            self.agent.max_turns = parse_env("ENTOPS_AGENT_MAX_TURNS", &value)?;
        }
        if let Some(value) = read_env("ENTOPS_AGENT_HISTORY_LIMIT") {
            self.agent.history_limit = parse_env("ENTOPS_AGENT_HISTORY_LIMIT", &value)?;
        }
        if let Some(value) = read_env("ENTOPS_AUTOMATION_ALERT_FAILURE_THRESHOLD") {
            self.automation.alert_failure_threshold =
                parse_env("ENTOPS_AUTOMATION_ALERT_FAILURE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("ENTOPS_AUTOPILOT_SWEEP_LIMIT") {
            self.autopilot.sweep_limit = parse_env("ENTOPS_AUTOPILOT_SWEEP_LIMIT", &value)?;
        }

        if let Some(value) = read_env("ENTOPS_STORAGE_URL") {
            self.ops.storage_url = Some(value);
        }
        if let Some(value) = read_env("ENTOPS_CRON_SECRET") {
            self.ops.cron_secret = Some(value.into());
        }
        if let Some(value) = read_env("ENTOPS_ERROR_REPORTING_DSN") {
            self.ops.error_reporting_dsn = Some(value);
        }

        let log_level = read_env("ENTOPS_LOGGING_LEVEL").or_else(|| read_env("ENTOPS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ENTOPS_LOGGING_FORMAT").or_else(|| read_env("ENTOPS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(api_key.into());
        }
        if let Some(base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(base_url);
        }
        if let Some(max_turns) = overrides.agent_max_turns {
            self.agent.max_turns = max_turns;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_agent(&self.agent)?;
        validate_automation(&self.automation)?;
        validate_autopilot(&self.autopilot)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("entops.toml"), PathBuf::from("config/entops.toml")]
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

/// Expands `${VAR}` references from the process environment.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let key = &after[..end];
        let value = env::var(key)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.to_string() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if llm.flagship_model.trim().is_empty() || llm.standard_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.flagship_model and llm.standard_model must not be empty".to_string(),
        ));
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
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

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_turns == 0 || agent.max_turns > 100 {
        return Err(ConfigError::Validation("agent.max_turns must be in range 1..=100".to_string()));
    }
    if agent.history_limit == 0 {
        return Err(ConfigError::Validation(
            "agent.history_limit must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_automation(automation: &AutomationConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&automation.reclassify_min_confidence) {
        return Err(ConfigError::Validation(
            "automation.reclassify_min_confidence must be in range 0..=1".to_string(),
        ));
    }
    if automation.alert_failure_threshold == 0 {
        return Err(ConfigError::Validation(
            "automation.alert_failure_threshold must be at least 1".to_string(),
        ));
    }
    if automation.health_window_days <= 0 {
        return Err(ConfigError::Validation(
            "automation.health_window_days must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_autopilot(autopilot: &AutopilotConfig) -> Result<(), ConfigError> {
    if autopilot.approval_weight < 0.0
        || autopilot.speed_weight < 0.0
        || autopilot.approval_weight + autopilot.speed_weight <= 0.0
    {
        return Err(ConfigError::Validation(
            "autopilot.approval_weight and autopilot.speed_weight must be non-negative with a positive sum"
                .to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&autopilot.min_probability_approval) {
        return Err(ConfigError::Validation(
            "autopilot.min_probability_approval must be in range 0..=1".to_string(),
        ));
    }
    if autopilot.max_approval_calibration_gap < 0.0 || autopilot.max_median_timeline_mae_days < 0.0
    {
        return Err(ConfigError::Validation(
            "autopilot drift thresholds must be non-negative".to_string(),
        ));
    }
    if autopilot.sweep_limit == 0 || autopilot.sweep_statuses.is_empty() {
        return Err(ConfigError::Validation(
            "autopilot.sweep_limit must be positive and autopilot.sweep_statuses non-empty"
                .to_string(),
        ));
    }
    if autopilot.collaborator_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "autopilot.collaborator_timeout_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    ops: Option<OpsPatch>,
    agent: Option<AgentConfig>,
    automation: Option<AutomationConfig>,
    autopilot: Option<AutopilotConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    flagship_model: Option<String>,
    standard_model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
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

#[derive(Debug, Default, Deserialize)]
struct OpsPatch {
    storage_url: Option<String>,
    cron_secret: Option<String>,
    error_reporting_dsn: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};
    use crate::domain::deal::DealStatus;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_load_without_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.agent.max_turns == 15, "default max turns should be 15")?;
        ensure(config.agent.history_limit == 50, "default history limit should be 50")?;
        ensure(
            config.automation.alert_failure_threshold == 3,
            "default alert threshold should be 3",
        )?;
        ensure(
            config.autopilot.sweep_statuses == vec![DealStatus::Preapp, DealStatus::Concept],
            "default sweep statuses should be PREAPP and CONCEPT",
        )?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation_and_section_defaults() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_ENTOPS_LLM_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("entops.toml");
            fs::write(
                &path,
                r#"
[llm]
api_key = "${TEST_ENTOPS_LLM_KEY}"

[autopilot]
sweep_limit = 5
sweep_statuses = ["CONCEPT"]
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            ensure(config.autopilot.sweep_limit == 5, "sweep limit should come from file")?;
            ensure(
                config.autopilot.sweep_statuses == vec![DealStatus::Concept],
                "sweep statuses should come from file",
            )?;
            ensure(
                (config.autopilot.approval_weight - 0.7).abs() < f64::EPSILON,
                "unspecified autopilot fields keep their defaults",
            )
        })();

        clear_vars(&["TEST_ENTOPS_LLM_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ENTOPS_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("ENTOPS_AGENT_MAX_TURNS", "20");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("entops.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.agent.max_turns == 20, "env max turns should win over defaults")
        })();

        clear_vars(&["ENTOPS_DATABASE_URL", "ENTOPS_AGENT_MAX_TURNS"]);
        result
    }

    #[test]
    fn invalid_env_override_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ENTOPS_SERVER_PORT", "not-a-port");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected env override failure".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "ENTOPS_SERVER_PORT", "error should name the offending key")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["ENTOPS_SERVER_PORT"]);
        result
    }

    #[test]
    fn validation_rejects_non_sqlite_database() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://localhost/entops".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure".to_string()),
            Err(error) => error,
        };

        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("database.url")),
            "validation failure should mention database.url",
        )
    }

    #[test]
    fn endpoint_resolution_requires_key_for_hosted_provider() -> Result<(), String> {
        let mut config = AppConfig::default();
        ensure(config.llm.resolve_endpoint().is_none(), "openai without key has no endpoint")?;

        config.llm.api_key = Some("sk-test".to_string().into());
        let endpoint = config.llm.resolve_endpoint().ok_or("endpoint should resolve")?;
        ensure(
            endpoint.base_url == "https://api.openai.com/v1",
            "provider default base url should be used",
        )?;

        config.llm.provider = LlmProvider::Ollama;
        config.llm.api_key = None;
        config.llm.base_url = Some("http://models.internal:11434/v1/".to_string());
        let endpoint = config.llm.resolve_endpoint().ok_or("ollama endpoint should resolve")?;
        ensure(
            endpoint.base_url == "http://models.internal:11434/v1",
            "explicit base url wins and loses its trailing slash",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ENTOPS_LLM_API_KEY", "sk-secret-value");
        env::set_var("ENTOPS_CRON_SECRET", "cron-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                !debug.contains("cron-secret-value"),
                "debug output should not contain cron secret",
            )?;
            ensure(config.ops.has_cron_secret(), "cron secret should be loaded")
        })();

        clear_vars(&["ENTOPS_LLM_API_KEY", "ENTOPS_CRON_SECRET"]);
        result
    }
}

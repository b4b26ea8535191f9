//! Engine and object configuration
//!
//! Both are plain serde structures loaded from JSON, TOML or YAML chosen by
//! file extension. Engine settings can be overridden from `WATCHKEEPER_*`
//! environment variables.

mod objects;

pub use objects::*;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engine::{SchedulerConfig, StateMachineOptions, TimeoutState};
use crate::registry::RegistryError;

/// Configuration errors (fatal at startup)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File error: {0}")]
    FileError(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::FileError(err.to_string())
    }
}

/// Supported serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "json" => Ok(ConfigFormat::Json),
            "toml" => Ok(ConfigFormat::Toml),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            _ => Err(ConfigError::UnknownFormat(extension)),
        }
    }

    pub fn parse<T: DeserializeOwned>(&self, content: &str) -> Result<T, ConfigError> {
        match self {
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("JSON error: {}", e))),
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("TOML error: {}", e))),
            ConfigFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("YAML error: {}", e))),
        }
    }
}

/// Read and parse a configuration file
pub fn load_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::FileError(format!("{}: {}", path.display(), e)))?;
    format.parse(&content)
}

/// How checks are executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegateKind {
    /// One `sh -c` child per check
    #[default]
    Process,
    /// A long-running connector speaking the wire protocol
    Connector,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheduler tick period in milliseconds
    pub tick_interval_ms: u64,

    /// Maximum outstanding checks (`None` = unlimited)
    pub max_concurrent_checks: Option<usize>,

    /// Check timeout in seconds for checkables without their own
    pub default_check_timeout: u64,

    /// State reported for timed out service checks
    pub timeout_state: TimeoutState,

    /// Upper bound of the schedule jitter in seconds
    pub max_jitter: u64,

    /// Passive non-OK results become hard immediately
    pub passive_results_always_hard: bool,

    /// Process-level notification switch
    pub enable_notifications: bool,

    /// Process-level flap detection switch
    pub enable_flap_detection: bool,

    /// Flapping stops below this percent state change
    pub low_flap_threshold: f64,

    /// Flapping starts above this percent state change
    pub high_flap_threshold: f64,

    /// External command file, one command per line
    pub command_file: Option<PathBuf>,

    /// HTTP listen address (`None` disables the API)
    pub http_listen: Option<String>,

    pub delegate: DelegateKind,

    /// Connector command line when `delegate` is `connector`
    pub connector_command: Option<String>,

    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            max_concurrent_checks: Some(64),
            default_check_timeout: 60,
            timeout_state: TimeoutState::Critical,
            max_jitter: 30,
            passive_results_always_hard: false,
            enable_notifications: true,
            enable_flap_detection: true,
            low_flap_threshold: 20.0,
            high_flap_threshold: 30.0,
            command_file: None,
            http_listen: Some("127.0.0.1:9180".to_string()),
            delegate: DelegateKind::Process,
            connector_command: None,
            log_format: LogFormat::Json,
        }
    }
}

impl EngineConfig {
    /// Create a new config builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Load from a JSON, TOML or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: EngineConfig = load_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Override fields from `WATCHKEEPER_*` environment variables
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(value: Option<String>, current: T) -> T {
            value.and_then(|v| v.parse().ok()).unwrap_or(current)
        }

        self.tick_interval_ms = parsed(lookup("WATCHKEEPER_TICK_INTERVAL_MS"), self.tick_interval_ms);
        if let Some(value) = lookup("WATCHKEEPER_MAX_CONCURRENT_CHECKS") {
            self.max_concurrent_checks = match value.parse::<usize>() {
                Ok(0) => None,
                Ok(limit) => Some(limit),
                Err(_) => self.max_concurrent_checks,
            };
        }
        self.default_check_timeout = parsed(
            lookup("WATCHKEEPER_DEFAULT_CHECK_TIMEOUT"),
            self.default_check_timeout,
        );
        self.max_jitter = parsed(lookup("WATCHKEEPER_MAX_JITTER"), self.max_jitter);
        self.passive_results_always_hard = parsed(
            lookup("WATCHKEEPER_PASSIVE_RESULTS_ALWAYS_HARD"),
            self.passive_results_always_hard,
        );
        self.enable_notifications = parsed(
            lookup("WATCHKEEPER_ENABLE_NOTIFICATIONS"),
            self.enable_notifications,
        );
        self.enable_flap_detection = parsed(
            lookup("WATCHKEEPER_ENABLE_FLAP_DETECTION"),
            self.enable_flap_detection,
        );
        if let Some(path) = lookup("WATCHKEEPER_COMMAND_FILE") {
            self.command_file = Some(PathBuf::from(path));
        }
        if let Some(listen) = lookup("WATCHKEEPER_HTTP_LISTEN") {
            self.http_listen = if listen.is_empty() { None } else { Some(listen) };
        }
        if let Some(command) = lookup("WATCHKEEPER_CONNECTOR_COMMAND") {
            self.connector_command = Some(command);
            self.delegate = DelegateKind::Connector;
        }
        match lookup("WATCHKEEPER_LOG_FORMAT").as_deref() {
            Some("pretty") => self.log_format = LogFormat::Pretty,
            Some("json") => self.log_format = LogFormat::Json,
            _ => {}
        }
        self
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::invalid("tick_interval_ms", "must be positive"));
        }
        if self.default_check_timeout == 0 {
            return Err(ConfigError::invalid("default_check_timeout", "must be positive"));
        }
        if self.low_flap_threshold > self.high_flap_threshold {
            return Err(ConfigError::invalid(
                "low_flap_threshold",
                "must not exceed high_flap_threshold",
            ));
        }
        if self.delegate == DelegateKind::Connector && self.connector_command.is_none() {
            return Err(ConfigError::invalid(
                "connector_command",
                "required when delegate is connector",
            ));
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_checks: self.max_concurrent_checks,
            max_jitter: self.max_jitter,
            default_check_timeout: self.default_check_timeout,
            timeout_state: self.timeout_state,
        }
    }

    pub fn state_machine_options(&self) -> StateMachineOptions {
        StateMachineOptions {
            passive_results_always_hard: self.passive_results_always_hard,
        }
    }
}

/// Builder for EngineConfig
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn tick_interval_ms(mut self, millis: u64) -> Self {
        self.config.tick_interval_ms = millis;
        self
    }

    pub fn max_concurrent_checks(mut self, limit: Option<usize>) -> Self {
        self.config.max_concurrent_checks = limit;
        self
    }

    pub fn default_check_timeout(mut self, seconds: u64) -> Self {
        self.config.default_check_timeout = seconds;
        self
    }

    pub fn timeout_state(mut self, state: TimeoutState) -> Self {
        self.config.timeout_state = state;
        self
    }

    pub fn max_jitter(mut self, seconds: u64) -> Self {
        self.config.max_jitter = seconds;
        self
    }

    pub fn passive_results_always_hard(mut self, enabled: bool) -> Self {
        self.config.passive_results_always_hard = enabled;
        self
    }

    pub fn enable_notifications(mut self, enabled: bool) -> Self {
        self.config.enable_notifications = enabled;
        self
    }

    pub fn enable_flap_detection(mut self, enabled: bool) -> Self {
        self.config.enable_flap_detection = enabled;
        self
    }

    pub fn flap_thresholds(mut self, low: f64, high: f64) -> Self {
        self.config.low_flap_threshold = low;
        self.config.high_flap_threshold = high;
        self
    }

    pub fn command_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.command_file = Some(path.into());
        self
    }

    pub fn http_listen(mut self, listen: Option<String>) -> Self {
        self.config.http_listen = listen;
        self
    }

    pub fn connector(mut self, command: impl Into<String>) -> Self {
        self.config.delegate = DelegateKind::Connector;
        self.config.connector_command = Some(command.into());
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log_format = format;
        self
    }

    /// Build the configuration
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

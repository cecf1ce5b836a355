use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::logging::LoggingConfig;
use crate::response_format::ResponseFormat;
use crate::session::{FileSession, MemorySession, Session};

pub const DEFAULT_MAX_TURNS: usize = 10;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// What the runner writes back to the session store after a successful loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPersistence {
    /// Only the messages supplied by the caller and produced during the run.
    #[default]
    Delta,
    /// The whole history, including what was loaded from the store. Duplicates previously stored
    /// messages on every run.
    FullHistory,
}

/// Per-run execution limits and generation overrides.
///
/// `max_turns == 0` means unlimited and `timeout == Duration::ZERO` means no deadline. The
/// `Option` fields fall back to the active agent's defaults when `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub max_turns: usize,
    pub timeout: Duration,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub parallel_tool_calls: Option<bool>,
    pub response_format: Option<ResponseFormat>,
    /// Raises per-turn and per-tool logging from DEBUG to INFO.
    pub debug: bool,
    pub session_persistence: SessionPersistence,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            timeout: DEFAULT_TIMEOUT,
            ..Self::unset()
        }
    }
}

impl RunConfig {
    /// Every field at its "not set" value; the starting point for an override overlay.
    pub fn unset() -> Self {
        Self {
            max_turns: 0,
            timeout: Duration::ZERO,
            temperature: None,
            max_tokens: None,
            parallel_tool_calls: None,
            response_format: None,
            debug: false,
            session_persistence: SessionPersistence::Delta,
        }
    }

    /// Returns a copy of `self` with every set field of `overrides` applied.
    ///
    /// | field | override wins when |
    /// |---|---|
    /// | `max_turns`, `timeout` | greater than zero |
    /// | `temperature`, `max_tokens`, `parallel_tool_calls`, `response_format` | `Some` |
    /// | `debug` | `true` |
    /// | `session_persistence` | not `Delta` |
    pub fn merge(&self, overrides: &RunConfig) -> RunConfig {
        let mut merged = self.clone();
        if overrides.max_turns > 0 {
            merged.max_turns = overrides.max_turns;
        }
        if !overrides.timeout.is_zero() {
            merged.timeout = overrides.timeout;
        }
        if overrides.temperature.is_some() {
            merged.temperature = overrides.temperature;
        }
        if overrides.max_tokens.is_some() {
            merged.max_tokens = overrides.max_tokens;
        }
        if overrides.parallel_tool_calls.is_some() {
            merged.parallel_tool_calls = overrides.parallel_tool_calls;
        }
        if overrides.response_format.is_some() {
            merged.response_format = overrides.response_format.clone();
        }
        if overrides.debug {
            merged.debug = true;
        }
        if overrides.session_persistence != SessionPersistence::Delta {
            merged.session_persistence = overrides.session_persistence;
        }
        merged
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = Some(enabled);
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_session_persistence(mut self, persistence: SessionPersistence) -> Self {
        self.session_persistence = persistence;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSettings {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            organization: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    crate::agent::DEFAULT_MODEL.into()
}

fn default_request_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSettings {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub session_persistence: SessionPersistence,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            timeout_secs: default_timeout_secs(),
            debug: false,
            session_persistence: SessionPersistence::Delta,
        }
    }
}

fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl RunSettings {
    pub fn to_run_config(&self) -> RunConfig {
        RunConfig {
            max_turns: self.max_turns,
            timeout: Duration::from_secs(self.timeout_secs),
            debug: self.debug,
            session_persistence: self.session_persistence,
            ..RunConfig::unset()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    #[serde(default)]
    pub backend: SessionBackend,
    #[serde(default = "default_session_directory")]
    pub directory: PathBuf,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            backend: SessionBackend::default(),
            directory: default_session_directory(),
        }
    }
}

fn default_session_directory() -> PathBuf {
    PathBuf::from("sessions")
}

impl SessionSettings {
    pub fn open(&self) -> Result<Arc<dyn Session>> {
        match self.backend {
            SessionBackend::Memory => Ok(Arc::new(MemorySession::new())),
            SessionBackend::File => {
                let store = FileSession::new(&self.directory).map_err(|err| {
                    AgentError::Config(format!(
                        "failed to create session directory {}: {err}",
                        self.directory.display()
                    ))
                })?;
                Ok(Arc::new(store))
            }
        }
    }
}

/// Process-level settings loaded from TOML, with `TURNSTILE_*` environment overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            AgentError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|err| AgentError::Config(format!("failed to parse configuration: {err}")))
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Defaults plus environment overrides, for processes without a config file.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(provider) = env::var("TURNSTILE_PROVIDER") {
            self.model.provider = provider;
        }
        if let Ok(model) = env::var("TURNSTILE_MODEL") {
            self.model.model = model;
        }
        if let Ok(key) = env::var("TURNSTILE_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Ok(url) = env::var("TURNSTILE_BASE_URL") {
            self.model.base_url = Some(url);
        }
        if let Ok(org) = env::var("TURNSTILE_ORGANIZATION") {
            self.model.organization = Some(org);
        }
        if let Some(secs) = parse_env("TURNSTILE_REQUEST_TIMEOUT_SECS")? {
            self.model.request_timeout_secs = secs;
        }
        if let Some(turns) = parse_env("TURNSTILE_MAX_TURNS")? {
            self.run.max_turns = turns;
        }
        if let Some(secs) = parse_env("TURNSTILE_TIMEOUT_SECS")? {
            self.run.timeout_secs = secs;
        }
        if let Some(debug) = parse_env("TURNSTILE_DEBUG")? {
            self.run.debug = debug;
        }
        if let Ok(backend) = env::var("TURNSTILE_SESSION_BACKEND") {
            self.session.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => SessionBackend::Memory,
                "file" => SessionBackend::File,
                other => {
                    return Err(AgentError::Config(format!(
                        "TURNSTILE_SESSION_BACKEND: unknown backend `{other}`"
                    )))
                }
            };
        }
        if let Ok(dir) = env::var("TURNSTILE_SESSION_DIR") {
            self.session.directory = PathBuf::from(dir);
        }
        if let Ok(level) = env::var("TURNSTILE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = parse_env("TURNSTILE_LOG_JSON")? {
            self.logging.json = json;
        }
        Ok(())
    }
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| AgentError::Config(format!("{name}: invalid value `{raw}`: {err}"))),
        Err(_) => Ok(None),
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flows::RouterFallbackPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "vitalis.toml";
pub const ENV_PREFIX: &str = "VITALIS_";
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3600;

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub datasets: DatasetConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_steps: u32,
    pub request_timeout_secs: u64,
    pub router_fallback: RouterFallbackPolicy,
    pub router_parse_attempts: u32,
    pub max_tool_output_chars: usize,
}

#[derive(Clone, Debug)]
pub struct DatasetConfig {
    pub health_path: Option<PathBuf>,
    pub activity_path: Option<PathBuf>,
    pub mock_patients: usize,
    pub mock_seed: u64,
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
pub enum LlmProvider {
    Groq,
    OpenAi,
    Ollama,
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
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub max_steps: Option<u32>,
    pub health_path: Option<PathBuf>,
    pub activity_path: Option<PathBuf>,
    pub server_port: Option<u16>,
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

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Groq,
            api_key: None,
            base_url: None,
            model: "openai/gpt-oss-20b".to_string(),
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 25,
            request_timeout_secs: 180,
            router_fallback: RouterFallbackPolicy::Adaptive,
            router_parse_attempts: 2,
            max_tool_output_chars: 4000,
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self { health_path: None, activity_path: None, mock_patients: 2000, mock_seed: 42 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1".to_string(), port: 8000, graceful_shutdown_secs: 15 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl LlmConfig {
    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    /// Checked when a language model is actually needed, so offline commands
    /// such as `script` and `schema` work without credentials.
    pub fn ensure_credentials(&self) -> Result<(), ConfigError> {
        if !self.provider.requires_api_key() {
            return Ok(());
        }
        let missing = self
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(format!(
                "llm.api_key is required for the {} provider (set VITALIS_LLM_API_KEY)",
                self.provider.as_str()
            )));
        }
        Ok(())
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected groq|openai|ollama)"
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_steps) = agent.max_steps {
                self.agent.max_steps = max_steps;
            }
            if let Some(request_timeout_secs) = agent.request_timeout_secs {
                self.agent.request_timeout_secs = request_timeout_secs;
            }
            if let Some(router_fallback) = agent.router_fallback {
                self.agent.router_fallback = router_fallback;
            }
            if let Some(router_parse_attempts) = agent.router_parse_attempts {
                self.agent.router_parse_attempts = router_parse_attempts;
            }
            if let Some(max_tool_output_chars) = agent.max_tool_output_chars {
                self.agent.max_tool_output_chars = max_tool_output_chars;
            }
        }

        if let Some(datasets) = patch.datasets {
            if let Some(health_path) = datasets.health_path {
                self.datasets.health_path = Some(health_path);
            }
            if let Some(activity_path) = datasets.activity_path {
                self.datasets.activity_path = Some(activity_path);
            }
            if let Some(mock_patients) = datasets.mock_patients {
                self.datasets.mock_patients = mock_patients;
            }
            if let Some(mock_seed) = datasets.mock_seed {
                self.datasets.mock_seed = mock_seed;
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
        if let Some(value) = read_env("VITALIS_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let api_key = read_env("VITALIS_LLM_API_KEY").or_else(|| read_env("GROQ_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("VITALIS_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("VITALIS_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("VITALIS_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("VITALIS_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("VITALIS_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("VITALIS_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("VITALIS_AGENT_MAX_STEPS") {
            self.agent.max_steps = parse_u32("VITALIS_AGENT_MAX_STEPS", &value)?;
        }
        if let Some(value) = read_env("VITALIS_AGENT_REQUEST_TIMEOUT_SECS") {
            self.agent.request_timeout_secs =
                parse_u64("VITALIS_AGENT_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("VITALIS_AGENT_ROUTER_FALLBACK") {
            self.agent.router_fallback = value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "VITALIS_AGENT_ROUTER_FALLBACK".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = read_env("VITALIS_AGENT_ROUTER_PARSE_ATTEMPTS") {
            self.agent.router_parse_attempts =
                parse_u32("VITALIS_AGENT_ROUTER_PARSE_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("VITALIS_AGENT_MAX_TOOL_OUTPUT_CHARS") {
            self.agent.max_tool_output_chars =
                parse_usize("VITALIS_AGENT_MAX_TOOL_OUTPUT_CHARS", &value)?;
        }

        if let Some(value) = read_env("VITALIS_DATASETS_HEALTH_PATH") {
            self.datasets.health_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("VITALIS_DATASETS_ACTIVITY_PATH") {
            self.datasets.activity_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("VITALIS_DATASETS_MOCK_PATIENTS") {
            self.datasets.mock_patients = parse_usize("VITALIS_DATASETS_MOCK_PATIENTS", &value)?;
        }
        if let Some(value) = read_env("VITALIS_DATASETS_MOCK_SEED") {
            self.datasets.mock_seed = parse_u64("VITALIS_DATASETS_MOCK_SEED", &value)?;
        }

        if let Some(value) = read_env("VITALIS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("VITALIS_SERVER_PORT") {
            self.server.port = parse_u16("VITALIS_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("VITALIS_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("VITALIS_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("VITALIS_LOGGING_LEVEL").or_else(|| read_env("VITALIS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("VITALIS_LOGGING_FORMAT").or_else(|| read_env("VITALIS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(max_steps) = overrides.max_steps {
            self.agent.max_steps = max_steps;
        }
        if let Some(health_path) = overrides.health_path {
            self.datasets.health_path = Some(health_path);
        }
        if let Some(activity_path) = overrides.activity_path {
            self.datasets.activity_path = Some(activity_path);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_datasets(&self.datasets)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
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

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    let base_url = llm.effective_base_url();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_steps == 0 || agent.max_steps > 500 {
        return Err(ConfigError::Validation(
            "agent.max_steps must be in range 1..=500".to_string(),
        ));
    }
    if agent.request_timeout_secs == 0 || agent.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
        return Err(ConfigError::Validation(format!(
            "agent.request_timeout_secs must be in range 1..={MAX_REQUEST_TIMEOUT_SECS}"
        )));
    }
    if agent.router_parse_attempts == 0 {
        return Err(ConfigError::Validation(
            "agent.router_parse_attempts must be at least 1".to_string(),
        ));
    }
    if agent.max_tool_output_chars == 0 {
        return Err(ConfigError::Validation(
            "agent.max_tool_output_chars must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_datasets(datasets: &DatasetConfig) -> Result<(), ConfigError> {
    match (&datasets.health_path, &datasets.activity_path) {
        (Some(_), None) | (None, Some(_)) => Err(ConfigError::Validation(
            "datasets.health_path and datasets.activity_path must be set together".to_string(),
        )),
        (None, None) if datasets.mock_patients == 0 => Err(ConfigError::Validation(
            "datasets.mock_patients must be greater than zero".to_string(),
        )),
        _ => Ok(()),
    }
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
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    datasets: Option<DatasetPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_steps: Option<u32>,
    request_timeout_secs: Option<u64>,
    router_fallback: Option<RouterFallbackPolicy>,
    router_parse_attempts: Option<u32>,
    max_tool_output_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DatasetPatch {
    health_path: Option<PathBuf>,
    activity_path: Option<PathBuf>,
    mock_patients: Option<usize>,
    mock_seed: Option<u64>,
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

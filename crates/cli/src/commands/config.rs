use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use vitalis_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};

use crate::commands::{CommandResult, EXIT_CONFIG};

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    CommandResult::raw(lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_secret(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let path = |value: &Option<PathBuf>| {
        value.as_ref().map(|path| path.display().to_string()).unwrap_or_else(|| "<mock>".to_string())
    };

    vec![
        Field {
            key: "llm.provider",
            value: config.llm.provider.as_str().to_string(),
            env_keys: &["VITALIS_LLM_PROVIDER"],
        },
        Field {
            key: "llm.api_key",
            value: api_key,
            env_keys: &["VITALIS_LLM_API_KEY", "GROQ_API_KEY"],
        },
        Field {
            key: "llm.base_url",
            value: config.llm.effective_base_url().to_string(),
            env_keys: &["VITALIS_LLM_BASE_URL"],
        },
        Field { key: "llm.model", value: config.llm.model.clone(), env_keys: &["VITALIS_LLM_MODEL"] },
        Field {
            key: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: &["VITALIS_LLM_TIMEOUT_SECS"],
        },
        Field {
            key: "llm.max_retries",
            value: config.llm.max_retries.to_string(),
            env_keys: &["VITALIS_LLM_MAX_RETRIES"],
        },
        Field {
            key: "agent.max_steps",
            value: config.agent.max_steps.to_string(),
            env_keys: &["VITALIS_AGENT_MAX_STEPS"],
        },
        Field {
            key: "agent.request_timeout_secs",
            value: config.agent.request_timeout_secs.to_string(),
            env_keys: &["VITALIS_AGENT_REQUEST_TIMEOUT_SECS"],
        },
        Field {
            key: "agent.router_fallback",
            value: config.agent.router_fallback.as_str().to_string(),
            env_keys: &["VITALIS_AGENT_ROUTER_FALLBACK"],
        },
        Field {
            key: "agent.router_parse_attempts",
            value: config.agent.router_parse_attempts.to_string(),
            env_keys: &["VITALIS_AGENT_ROUTER_PARSE_ATTEMPTS"],
        },
        Field {
            key: "agent.max_tool_output_chars",
            value: config.agent.max_tool_output_chars.to_string(),
            env_keys: &["VITALIS_AGENT_MAX_TOOL_OUTPUT_CHARS"],
        },
        Field {
            key: "datasets.health_path",
            value: path(&config.datasets.health_path),
            env_keys: &["VITALIS_DATASETS_HEALTH_PATH"],
        },
        Field {
            key: "datasets.activity_path",
            value: path(&config.datasets.activity_path),
            env_keys: &["VITALIS_DATASETS_ACTIVITY_PATH"],
        },
        Field {
            key: "datasets.mock_patients",
            value: config.datasets.mock_patients.to_string(),
            env_keys: &["VITALIS_DATASETS_MOCK_PATIENTS"],
        },
        Field {
            key: "datasets.mock_seed",
            value: config.datasets.mock_seed.to_string(),
            env_keys: &["VITALIS_DATASETS_MOCK_SEED"],
        },
        Field {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["VITALIS_SERVER_BIND_ADDRESS"],
        },
        Field {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["VITALIS_SERVER_PORT"],
        },
        Field {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["VITALIS_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["VITALIS_LOGGING_LEVEL", "VITALIS_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            env_keys: &["VITALIS_LOGGING_FORMAT", "VITALIS_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a short provider prefix such as `gsk_` and hides the rest.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once(['_', '-']) {
        if prefix.len() <= 4 {
            return format!("{prefix}_***");
        }
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_secret};

    #[test]
    fn secrets_keep_only_a_short_prefix() {
        assert_eq!(redact_secret("gsk_abcdef123456"), "gsk_***");
        assert_eq!(redact_secret("sk-proj-abcdef"), "sk_***");
        assert_eq!(redact_secret("plainsecretvalue"), "<redacted>");
        assert_eq!(redact_secret("   "), "<empty>");
    }

    #[test]
    fn dotted_paths_are_resolved_in_the_file_document() {
        let doc: toml::Value = "[agent]\nmax_steps = 10\n".parse().expect("toml");
        assert!(contains_path(&doc, "agent.max_steps"));
        assert!(!contains_path(&doc, "agent.router_fallback"));
    }
}

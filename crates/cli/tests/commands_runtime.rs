use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use tempfile::TempDir;
use vitalis_cli::commands::{ask, config, doctor, schema, script};

#[test]
fn script_runs_over_mock_datasets() {
    with_env(&[("VITALIS_DATASETS_MOCK_PATIENTS", "50")], || {
        let result = script::run("health | count");
        assert_eq!(result.exit_code, 0, "expected script success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "script");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "50");
    });
}

#[test]
fn script_reads_configured_csv_files() {
    let dir = TempDir::new().expect("temp dir");
    let health_path = dir.path().join("health.csv");
    let activity_path = dir.path().join("activity.csv");
    fs::write(
        &health_path,
        "Patient_Number,Smoking,Chronic_kidney_disease\n1,1,1\n2,1,0\n3,0,1\n4,1,1\n",
    )
    .expect("write health");
    fs::write(&activity_path, "Patient_Number,Day_Number,Physical_activity\n1,1,3000\n")
        .expect("write activity");

    let health = health_path.display().to_string();
    let activity = activity_path.display().to_string();
    with_env(
        &[
            ("VITALIS_DATASETS_HEALTH_PATH", health.as_str()),
            ("VITALIS_DATASETS_ACTIVITY_PATH", activity.as_str()),
        ],
        || {
            let result =
                script::run("health | where Smoking == 1 and Chronic_kidney_disease == 1 | count");
            assert_eq!(result.exit_code, 0, "{}", result.output);
            assert_eq!(parse_payload(&result.output)["message"], "2");
        },
    );
}

#[test]
fn script_reports_analysis_errors() {
    with_env(&[("VITALIS_DATASETS_MOCK_PATIENTS", "10")], || {
        let result = script::run("health | where Weight > 3 | count");
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "analysis_error");
        assert!(payload["message"].as_str().unwrap_or_default().contains("Weight"));
    });
}

#[test]
fn script_reports_missing_dataset_files() {
    with_env(
        &[
            ("VITALIS_DATASETS_HEALTH_PATH", "/nonexistent/health.csv"),
            ("VITALIS_DATASETS_ACTIVITY_PATH", "/nonexistent/activity.csv"),
        ],
        || {
            let result = script::run("health | count");
            assert_eq!(result.exit_code, 3);
            assert_eq!(parse_payload(&result.output)["error_class"], "dataset_load");
        },
    );
}

#[test]
fn ask_rejects_blank_queries() {
    with_env(&[], || {
        let result = ask::run("   ", None);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn ask_requires_credentials_for_hosted_providers() {
    with_env(&[("VITALIS_LLM_PROVIDER", "openai"), ("VITALIS_DATASETS_MOCK_PATIENTS", "10")], || {
        let result = ask::run("How many smokers are there?", None);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("llm.api_key"));
    });
}

#[test]
fn ask_validates_step_budget_override() {
    with_env(&[], || {
        let result = ask::run("How many smokers are there?", Some(0));
        assert_eq!(result.exit_code, 2);
        assert!(parse_payload(&result.output)["message"]
            .as_str()
            .unwrap_or_default()
            .contains("agent.max_steps"));
    });
}

#[test]
fn doctor_passes_for_local_provider_with_mock_datasets() {
    with_env(&[("VITALIS_LLM_PROVIDER", "ollama"), ("VITALIS_DATASETS_MOCK_PATIENTS", "10")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks");
        assert_eq!(checks.len(), 3);
        assert!(checks[2]["details"]
            .as_str()
            .unwrap_or_default()
            .contains("10 health rows, 100 activity rows"));
    });
}

#[test]
fn doctor_flags_missing_credentials() {
    with_env(&[("VITALIS_DATASETS_MOCK_PATIENTS", "10")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("- [fail] llm_credentials"));
        assert!(result.output.contains("- [ok] dataset_readiness"));
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("VITALIS_AGENT_MAX_STEPS", "0")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

#[test]
fn config_attributes_sources_and_redacts_api_key() {
    with_env(&[("VITALIS_LLM_API_KEY", "gsk_supersecretvalue"), ("VITALIS_AGENT_MAX_STEPS", "12")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("- llm.api_key = gsk_*** (source: env (VITALIS_LLM_API_KEY))"));
        assert!(result.output.contains("- agent.max_steps = 12 (source: env (VITALIS_AGENT_MAX_STEPS))"));
        assert!(result.output.contains("- server.port = 8000 (source: default)"));
        assert!(!result.output.contains("supersecretvalue"));
    });
}

#[test]
fn schema_describes_both_tables() {
    let result = schema::run();
    assert_eq!(result.exit_code, 0);
    assert!(result.output.contains("TABLE 1: health"));
    assert!(result.output.contains("Physical_activity"));
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "GROQ_API_KEY",
        "VITALIS_LLM_PROVIDER",
        "VITALIS_LLM_API_KEY",
        "VITALIS_LLM_BASE_URL",
        "VITALIS_LLM_MODEL",
        "VITALIS_LLM_TIMEOUT_SECS",
        "VITALIS_LLM_MAX_RETRIES",
        "VITALIS_AGENT_MAX_STEPS",
        "VITALIS_AGENT_REQUEST_TIMEOUT_SECS",
        "VITALIS_AGENT_ROUTER_FALLBACK",
        "VITALIS_AGENT_ROUTER_PARSE_ATTEMPTS",
        "VITALIS_AGENT_MAX_TOOL_OUTPUT_CHARS",
        "VITALIS_DATASETS_HEALTH_PATH",
        "VITALIS_DATASETS_ACTIVITY_PATH",
        "VITALIS_DATASETS_MOCK_PATIENTS",
        "VITALIS_DATASETS_MOCK_SEED",
        "VITALIS_SERVER_BIND_ADDRESS",
        "VITALIS_SERVER_PORT",
        "VITALIS_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "VITALIS_LOGGING_LEVEL",
        "VITALIS_LOGGING_FORMAT",
        "VITALIS_LOG_LEVEL",
        "VITALIS_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}

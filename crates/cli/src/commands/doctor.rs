use serde::Serialize;
use vitalis_core::config::{AppConfig, LoadOptions};
use vitalis_core::dataset::Datasets;

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_OK, EXIT_RUNTIME};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = exit_code(&report);

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_credentials(&config));
            checks.push(check_datasets(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(skipped("llm_credentials"));
            checks.push(skipped("dataset_readiness"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: "skipped because configuration did not load".to_string(),
    }
}

fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    match config.llm.ensure_credentials() {
        Ok(()) => DoctorCheck {
            name: "llm_credentials",
            status: CheckStatus::Pass,
            details: format!(
                "{} provider at {} with model `{}`",
                config.llm.provider.as_str(),
                config.llm.effective_base_url(),
                config.llm.model
            ),
        },
        Err(error) => {
            DoctorCheck { name: "llm_credentials", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn check_datasets(config: &AppConfig) -> DoctorCheck {
    match Datasets::load(&config.datasets) {
        Ok(datasets) => {
            let source = if config.datasets.health_path.is_some() { "csv" } else { "mock" };
            DoctorCheck {
                name: "dataset_readiness",
                status: CheckStatus::Pass,
                details: format!(
                    "{source} datasets loaded: {} health rows, {} activity rows",
                    datasets.health.len(),
                    datasets.activity.len()
                ),
            }
        }
        Err(error) => {
            DoctorCheck { name: "dataset_readiness", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn exit_code(report: &DoctorReport) -> u8 {
    let failed = |name: &str| {
        report.checks.iter().any(|check| check.name == name && check.status == CheckStatus::Fail)
    };
    if failed("config_validation") || failed("llm_credentials") {
        EXIT_CONFIG
    } else if failed("dataset_readiness") {
        EXIT_RUNTIME
    } else {
        EXIT_OK
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

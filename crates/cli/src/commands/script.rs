use vitalis_core::analysis::run_script;
use vitalis_core::config::ConfigOverrides;

use crate::commands::{load_config, load_datasets, CommandResult, EXIT_RUNTIME};

const COMMAND: &str = "script";

/// Runs an analysis script over the configured datasets without a language model.
pub fn run(code: &str) -> CommandResult {
    let config = match load_config(COMMAND, ConfigOverrides::default()) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let datasets = match load_datasets(COMMAND, &config) {
        Ok(datasets) => datasets,
        Err(failure) => return failure,
    };

    match run_script(code, &datasets) {
        Ok(output) => CommandResult::success(COMMAND, output),
        Err(error) => CommandResult::failure(COMMAND, "analysis_error", error.to_string(), EXIT_RUNTIME),
    }
}

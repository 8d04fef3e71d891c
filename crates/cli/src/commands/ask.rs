use std::sync::Arc;

use vitalis_agent::{build_runtime, BuildError};
use vitalis_core::config::ConfigOverrides;

use crate::commands::{load_config, load_datasets, CommandResult, EXIT_CONFIG, EXIT_RUNTIME};

const COMMAND: &str = "ask";

/// Runs one query through the full agent and prints the response as JSON.
pub fn run(query: &str, max_steps: Option<u32>) -> CommandResult {
    if query.trim().is_empty() {
        return CommandResult::failure(COMMAND, "invalid_input", "query must not be empty", EXIT_CONFIG);
    }

    let config = match load_config(COMMAND, ConfigOverrides { max_steps, ..ConfigOverrides::default() }) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let datasets = match load_datasets(COMMAND, &config) {
        Ok(datasets) => Arc::new(datasets),
        Err(failure) => return failure,
    };

    let runtime = match build_runtime(&config, datasets) {
        Ok(runtime) => runtime,
        Err(BuildError::Config(error)) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), EXIT_CONFIG);
        }
        Err(error) => {
            return CommandResult::failure(COMMAND, "runtime_init", error.to_string(), EXIT_RUNTIME);
        }
    };

    let executor = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(executor) => executor,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    let response = executor.block_on(runtime.handle_query(query));
    match serde_json::to_string_pretty(&response) {
        Ok(output) => CommandResult::raw(output),
        Err(error) => CommandResult::failure(COMMAND, "serialization", error.to_string(), EXIT_RUNTIME),
    }
}

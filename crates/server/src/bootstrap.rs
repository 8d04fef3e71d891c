use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use vitalis_agent::{build_runtime, AgentRuntime, BuildError};
use vitalis_core::config::{AppConfig, ConfigError, LoadOptions};
use vitalis_core::dataset::{DatasetError, Datasets};

pub struct Application {
    pub config: AppConfig,
    pub datasets: Arc<Datasets>,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("dataset load failed: {0}")]
    Dataset(#[from] DatasetError),
    #[error("agent runtime setup failed: {0}")]
    Runtime(#[from] BuildError),
}

#[cfg(test)]
pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

/// Loads datasets and builds the runtime; nothing is served until both succeed.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        provider = config.llm.provider.as_str(),
        model = %config.llm.model,
        "starting application bootstrap"
    );

    let datasets = Arc::new(Datasets::load(&config.datasets)?);
    let runtime = Arc::new(build_runtime(&config, Arc::clone(&datasets))?);
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        max_steps = config.agent.max_steps,
        router_fallback = config.agent.router_fallback.as_str(),
        "agent runtime initialized"
    );

    Ok(Application { config, datasets, runtime })
}

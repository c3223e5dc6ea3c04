//! Configuration Loader
//!
//! Layers built-in defaults, an optional TOML file and `ORCHESTRATOR__*`
//! environment variables, then validates the result.

use config::{Config, Environment, File, FileFormat};
use std::env;
use tracing::debug;

use super::error::ConfigResult;
use super::OrchestratorConfig;

pub const DEFAULT_CONFIG_FILE: &str = "config/orchestrator";
pub const CONFIG_PATH_ENV: &str = "ORCHESTRATOR_CONFIG";
pub const ENV_PREFIX: &str = "ORCHESTRATOR";

/// Load from `$ORCHESTRATOR_CONFIG` (or `config/orchestrator.toml`) plus the environment
pub fn load() -> ConfigResult<OrchestratorConfig> {
    let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    load_path(&path)
}

/// Load a specific file (extension optional) with environment overrides on top
pub fn load_path(path: &str) -> ConfigResult<OrchestratorConfig> {
    debug!(config_path = %path, "Loading orchestrator configuration");

    let settings = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("credential_seeds"),
        )
        .build()?;

    finish(settings)
}

/// Load from an in-memory TOML document, without environment overrides
pub fn load_from_str(toml: &str) -> ConfigResult<OrchestratorConfig> {
    let settings = Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()?;
    finish(settings)
}

fn finish(settings: Config) -> ConfigResult<OrchestratorConfig> {
    let config: OrchestratorConfig = settings.try_deserialize()?;
    config.validate()?;
    debug!(
        workers = config.workers.len(),
        credential_seeds = config.credential_seeds.len(),
        batch_size = config.batching.batch_size,
        "Configuration loaded successfully"
    );
    Ok(config)
}

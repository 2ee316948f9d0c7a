//! Configuration lookup for the terminal client.
//!
//! The TOML file path comes from the first command-line argument, falling
//! back to `KINSHIP_CONFIG`. Without either, built-in defaults are used.

use std::path::{Path, PathBuf};

use anyhow::Context;
use kinship_hub_connection::HubConnectionConfig;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "KINSHIP_CONFIG";

/// Environment variable holding the bearer token.
pub const TOKEN_ENV: &str = "KINSHIP_TOKEN";

/// Picks the configuration path: the argument wins over the environment.
pub fn config_path(arg: Option<String>, env: Option<String>) -> Option<PathBuf> {
    arg.or(env)
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

/// Loads the configuration from `path`, or returns the defaults.
pub fn load(path: Option<&Path>) -> anyhow::Result<HubConnectionConfig> {
    let Some(path) = path else {
        tracing::debug!("no config file given, using defaults");
        return Ok(HubConnectionConfig::default());
    };

    let config = HubConnectionConfig::load(path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Reads the bearer token; an empty variable counts as signed out.
pub fn token_from_env() -> Option<String> {
    std::env::var(TOKEN_ENV)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

//! Relay configuration: built-in defaults, then the TOML file, then the
//! environment, then command-line flags.

pub mod data;
pub mod io;


use std::path::Path;
use std::str::FromStr;

pub use data::{path_display, Config, RelaySettings, SettingsOverrides};
pub use io::{default_config_path, ConfigError};

use crate::core::relay::GenerationParams;
use data::{DEFAULT_BASE_URL, DEFAULT_BIND, DEFAULT_PORT};

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_PORT: &str = "PORT";
pub const ENV_MODEL: &str = "AI_MODEL";
pub const ENV_TEMPERATURE: &str = "AI_TEMPERATURE";
pub const ENV_MAX_TOKENS: &str = "AI_MAX_TOKENS";
pub const ENV_TOP_P: &str = "AI_TOP_P";

/// Load the file at `path` (when given) and resolve it against the process
/// environment.
pub fn load_settings(
    path: Option<&Path>,
    overrides: &SettingsOverrides,
) -> Result<RelaySettings, ConfigError> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::default(),
    };
    resolve_settings(&config, |name| std::env::var(name).ok(), overrides)
}

/// Merge the layers. `env` looks up a variable by name; empty values count
/// as unset.
pub fn resolve_settings<E>(
    config: &Config,
    env: E,
    overrides: &SettingsOverrides,
) -> Result<RelaySettings, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let lookup = |name: &str| env(name).filter(|value| !value.trim().is_empty());
    let defaults = GenerationParams::default();

    let port = match overrides.port {
        Some(port) => port,
        None => parse_env(&lookup, ENV_PORT)?
            .or(config.port)
            .unwrap_or(DEFAULT_PORT),
    };
    let bind = overrides
        .bind
        .clone()
        .or_else(|| config.bind.clone())
        .unwrap_or_else(|| DEFAULT_BIND.to_string());
    let base_url = overrides
        .base_url
        .clone()
        .or_else(|| lookup(ENV_BASE_URL))
        .or_else(|| config.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let model = overrides
        .model
        .clone()
        .or_else(|| lookup(ENV_MODEL))
        .or_else(|| config.model.clone())
        .unwrap_or(defaults.model);

    let generation = GenerationParams {
        model,
        temperature: parse_env(&lookup, ENV_TEMPERATURE)?
            .or(config.temperature)
            .unwrap_or(defaults.temperature),
        max_tokens: parse_env(&lookup, ENV_MAX_TOKENS)?
            .or(config.max_tokens)
            .unwrap_or(defaults.max_tokens),
        top_p: parse_env(&lookup, ENV_TOP_P)?
            .or(config.top_p)
            .unwrap_or(defaults.top_p),
    };

    Ok(RelaySettings {
        bind,
        port,
        base_url,
        api_key: lookup(ENV_API_KEY),
        generation,
    })
}

fn parse_env<T, L>(lookup: &L, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { name, value }),
        None => Ok(None),
    }
}

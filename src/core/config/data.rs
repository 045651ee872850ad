use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::relay::GenerationParams;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// On-disk configuration. Every field is optional; unset fields fall through
/// to the environment and then to built-in defaults.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Port the relay listens on
    pub port: Option<u16>,
    /// Address the relay binds to
    pub bind: Option<String>,
    /// Base URL of the chat-completions provider, without the endpoint path
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// Values given on the command line; these win over everything else.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SettingsOverrides {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Fully resolved, immutable settings shared by every request.
#[derive(Clone, PartialEq)]
pub struct RelaySettings {
    pub bind: String,
    pub port: u16,
    pub base_url: String,
    pub api_key: Option<String>,
    pub generation: GenerationParams,
}

impl std::fmt::Debug for RelaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySettings")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("generation", &self.generation)
            .finish()
    }
}

pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

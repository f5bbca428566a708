//! Client configuration.
//!
//! Values are layered: built-in defaults, then the TOML config file, then
//! `FAIRCHAT__SECTION__KEY` environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const APP_NAME: &str = "fairchat";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "FAIRCHAT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub endpoints: EndpointsConfig,
    pub auth: AuthContext,
    pub chat: ChatConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Backend location and network timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the assistant backend.
    pub url: String,
    /// Seconds allowed for establishing a connection.
    pub connect_timeout_secs: u64,
    /// Seconds allowed for a single-shot request. Streams are not bounded.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
        }
    }
}

/// Paths of the backend endpoints.
///
/// `{session_id}` and `{model_id}` are substituted where they appear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub chat: String,
    pub chat_stream: String,
    pub analyze_model: String,
    pub analyze_model_stream: String,
    pub session_context: String,
    pub clear_session: String,
    pub model_github_url: String,
    pub health: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            chat: "/chat/send".to_string(),
            chat_stream: "/chat/send/stream".to_string(),
            analyze_model: "/chat/analyze-model".to_string(),
            analyze_model_stream: "/chat/analyze-model/stream".to_string(),
            session_context: "/chat/session/{session_id}/context".to_string(),
            clear_session: "/chat/clear-session/{session_id}".to_string(),
            model_github_url: "/chat/models/{model_id}/github-url".to_string(),
            health: "/health".to_string(),
        }
    }
}

/// Credentials and organization scope sent with every request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthContext {
    /// Bearer token.
    pub token: Option<String>,
    /// Organization the requests act on behalf of.
    pub organization_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Prefer streaming replies when the output can display them.
    pub streaming: bool,
    /// Scope key used for session ids when none is given.
    pub default_scope: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            streaming: true,
            default_scope: "assistant".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Query the server after code-analysis replies and overwrite the
    /// optimistic context flag with its answer.
    pub reconcile_context: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Load configuration from `path` (optional on disk) and the process
/// environment.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    load_layered(path, None)
}

/// Load configuration with an explicit environment map in place of the
/// process environment when `env_source` is set.
pub fn load_layered(
    path: &Path,
    env_source: Option<config::Map<String, String>>,
) -> Result<AppConfig, ConfigError> {
    let defaults = AppConfig::default();
    let built = Config::builder()
        .set_default("server.url", defaults.server.url)?
        .set_default("logging.level", defaults.logging.level)?
        .add_source(File::from(path).format(FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env_source),
        )
        .build()?;

    let config: AppConfig = built.try_deserialize()?;
    debug!("loaded config from {}", path.display());
    Ok(config)
}

/// Load the config at `path`, writing the defaults there first if the file
/// does not exist yet.
pub fn load_or_init_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        write_default_config(path)?;
    }
    load_config(path)
}

pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            action: "creating config directory",
            path: parent.display().to_string(),
            source,
        })?;
    }

    let toml = toml::to_string_pretty(&AppConfig::default())?;
    let mut body = default_config_header(path);
    body.push_str(&toml);
    fs::write(path, body).map_err(|source| ConfigError::Io {
        action: "writing config file",
        path: path.display().to_string(),
        source,
    })
}

fn default_config_header(path: &Path) -> String {
    let mut buffer = String::new();
    buffer.push_str("# Configuration for ");
    buffer.push_str(APP_NAME);
    buffer.push('\n');
    buffer.push_str("# File: ");
    buffer.push_str(&path.display().to_string());
    buffer.push_str("\n\n");
    buffer
}

/// Resolve the config file path, honouring an explicit override.
///
/// A directory override resolves to `config.toml` inside it.
pub fn resolve_config_path(override_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match override_path {
        Some(path) => {
            let expanded = expand_path(path)?;
            if expanded.is_dir() {
                Ok(expanded.join("config.toml"))
            } else {
                Ok(expanded)
            }
        }
        None => Ok(default_config_dir()?.join("config.toml")),
    }
}

fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let Some(text) = path.to_str() else {
        return Ok(path.to_path_buf());
    };
    let expanded = shellexpand::full(text).map_err(|err| ConfigError::Expand {
        path: text.to_string(),
        message: err.to_string(),
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}

pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(APP_NAME));
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

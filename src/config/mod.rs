//! Configuration management for pairline.
//!
//! Values come from `config.toml` in the user config directory and are then
//! overridden by `PAIRLINE_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Env var: defer project binding until `/api/initialize_project` is called.
pub const ENV_DEFER_PROJECT_INIT: &str = "PAIRLINE_DEFER_PROJECT_INIT";
/// Env var: project root used for sessions created before explicit initialization.
pub const ENV_PROJECT_PATH: &str = "PAIRLINE_PROJECT_PATH";
/// Env var: default model id.
pub const ENV_MODEL: &str = "PAIRLINE_MODEL";
/// Env var: bearer token required by the HTTP API.
pub const ENV_API_TOKEN: &str = "PAIRLINE_API_TOKEN";
/// Env var: data directory override (session snapshots live below it).
pub const ENV_DATA_DIR: &str = "PAIRLINE_DATA_DIR";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API configuration.
    pub api: ApiConfig,

    /// Project binding.
    pub project: ProjectConfig,

    /// Session store configuration.
    pub session: SessionConfig,

    /// Event stream configuration.
    pub stream: StreamConfig,

    /// Agent configuration.
    pub agent: AgentConfig,
}

impl Config {
    /// Load configuration from the default path, then apply env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            toml::from_str(&contents)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_DEFER_PROJECT_INIT) {
            self.project.defer_init = parse_flag(&value);
        }
        if let Some(path) = lookup(ENV_PROJECT_PATH).filter(|p| !p.is_empty()) {
            self.project.default_path = Some(PathBuf::from(path));
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|m| !m.is_empty()) {
            self.agent.model = model;
        }
        if let Some(token) = lookup(ENV_API_TOKEN).filter(|t| !t.is_empty()) {
            self.api.token = Some(token);
        }
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|d| !d.is_empty()) {
            self.session.data_dir = Some(PathBuf::from(dir));
        }
    }

    /// Get the configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the config directory path (`~/.config/pairline/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config_home).join("pairline"));
        }

        let base = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

        Ok(base.config_dir().join("pairline"))
    }

    /// Get the data directory path (`~/.local/share/pairline/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined.
    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.session.data_dir {
            return Ok(dir.clone());
        }

        let base = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("could not determine data directory"))?;

        Ok(base.data_dir().join("pairline"))
    }

    /// Directory holding one JSON snapshot per session.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined.
    pub fn sessions_dir(&self) -> anyhow::Result<PathBuf> {
        Ok(self.data_dir()?.join("sessions"))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Host to bind to.
    pub host: String,

    /// Port to bind to.
    pub port: u16,

    /// API token for authentication (optional, but required for remote access).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            token: None,
        }
    }
}

impl ApiConfig {
    /// Generate a new random API token.
    #[must_use]
    pub fn generate_token() -> String {
        use rand::Rng;
        let mut rng = rand::rng();
        let bytes: [u8; 32] = rng.random();
        format!("pl_{}", hex::encode(bytes))
    }
}

/// Project binding configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Wait for an explicit `initialize_project` before creating sessions.
    pub defer_init: bool,

    /// Project root for lazily created sessions. Defaults to the working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_path: Option<PathBuf>,
}

/// Session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Data directory override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Evict in-memory sessions idle for longer than this many seconds.
    pub idle_ttl_secs: u64,

    /// How often the eviction sweep runs, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            idle_ttl_secs: 60 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Event stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Idle seconds before the relay emits a keep-alive frame.
    pub keepalive_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { keepalive_secs: 30 }
    }
}

impl StreamConfig {
    #[must_use]
    pub const fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

/// Agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model used for new sessions.
    pub model: String,

    /// Maximum tokens in a response.
    pub max_tokens: u32,

    /// Models offered by `/api/get_available_models`.
    pub models: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-sonnet-4-5".to_string(),
            max_tokens: 8192,
            models: vec![
                "anthropic/claude-sonnet-4-5".to_string(),
                "anthropic/claude-opus-4-1".to_string(),
                "anthropic/claude-3-5-haiku-latest".to_string(),
                "openai/gpt-4o".to_string(),
                "openai/o3-mini".to_string(),
                "google/gemini-2.5-pro".to_string(),
                "groq/llama-3.3-70b-versatile".to_string(),
                "mistral/codestral-latest".to_string(),
            ],
        }
    }
}

//! Client configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{AgendaError, AgendaResult};

static DEFAULT_API_URL: &str = "http://127.0.0.1:8080";
static DEFAULT_REQUEST_TIMEOUT: &str = "10s";
static DEFAULT_SESSION_FILE: &str = "~/.config/agenda/session.toml";

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout() -> String {
    DEFAULT_REQUEST_TIMEOUT.to_string()
}

fn default_session_file() -> PathBuf {
    PathBuf::from(DEFAULT_SESSION_FILE)
}

fn default_notification_capacity() -> usize {
    256
}

fn default_headcount_concurrency() -> usize {
    4
}

/// Configuration at ~/.config/agenda/config.toml, overridable with
/// `AGENDA_*` environment variables.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AgendaConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// humantime duration, e.g. "10s" or "1m 30s"
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    /// Where the auth token and user id are persisted
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,

    /// Buffered notifications per subscriber before it starts lagging
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    /// Parallel attendance-count requests when refreshing many cards
    #[serde(default = "default_headcount_concurrency")]
    pub headcount_concurrency: usize,
}

impl Default for AgendaConfig {
    fn default() -> Self {
        AgendaConfig {
            api_url: default_api_url(),
            request_timeout: default_request_timeout(),
            session_file: default_session_file(),
            notification_capacity: default_notification_capacity(),
            headcount_concurrency: default_headcount_concurrency(),
        }
    }
}

impl AgendaConfig {
    pub fn config_path() -> AgendaResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AgendaError::Config("Could not determine config directory".into()))?
            .join("agenda");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, writing a commented template first if
    /// no config file exists yet.
    pub fn load() -> AgendaResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> AgendaResult<Self> {
        Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("AGENDA"))
            .build()
            .map_err(|e| AgendaError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AgendaError::Config(e.to_string()))
    }

    pub fn request_timeout(&self) -> AgendaResult<Duration> {
        humantime::parse_duration(&self.request_timeout).map_err(|e| {
            AgendaError::Config(format!(
                "Invalid request_timeout '{}': {}",
                self.request_timeout, e
            ))
        })
    }

    /// Session file path with `~` expanded.
    pub fn session_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.session_file.to_string_lossy()).into_owned();
        PathBuf::from(expanded)
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> AgendaResult<()> {
        let contents = format!(
            "\
# agenda configuration

# Backend base URL:
# api_url = \"{}\"

# Per-request timeout:
# request_timeout = \"{}\"

# Where the login session is kept:
# session_file = \"{}\"

# Buffered change notifications per subscriber:
# notification_capacity = {}

# Parallel attendance-count requests:
# headcount_concurrency = {}
",
            DEFAULT_API_URL,
            DEFAULT_REQUEST_TIMEOUT,
            DEFAULT_SESSION_FILE,
            default_notification_capacity(),
            default_headcount_concurrency()
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AgendaError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| AgendaError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

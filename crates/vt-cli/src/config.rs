//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::ensure;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use vt_core::SchedulerConfig;

/// Where events are read from and aggregates written to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Local `SQLite` database at `database_path`.
    #[default]
    Sqlite,
    /// The activity HTTP API at `api_base_url`.
    Api,
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: Backend,

    /// Path to the database file.
    pub database_path: PathBuf,

    /// Root of the activity API, e.g. `http://localhost:5000`.
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Bearer token sent to the activity API.
    #[serde(default)]
    pub api_token: Option<String>,

    pub request_timeout_secs: u64,
    pub continuous_interval_secs: u64,
    pub monthly_interval_secs: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("backend", &self.backend)
            .field("database_path", &self.database_path)
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("continuous_interval_secs", &self.continuous_interval_secs)
            .field("monthly_interval_secs", &self.monthly_interval_secs)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        let scheduler = SchedulerConfig::default();
        Self {
            backend: Backend::default(),
            database_path: data_dir.join("vt.db"),
            api_base_url: None,
            api_token: None,
            request_timeout_secs: vt_api::DEFAULT_TIMEOUT.as_secs(),
            continuous_interval_secs: scheduler.continuous_interval.as_secs(),
            monthly_interval_secs: scheduler.monthly_interval.as_secs(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (VT_*)
        figment = figment.merge(Env::prefixed("VT_"));

        figment.extract()
    }

    /// Tick intervals for the watcher loops.
    pub fn scheduler_config(&self) -> anyhow::Result<SchedulerConfig> {
        ensure!(
            self.continuous_interval_secs > 0,
            "continuous_interval_secs must be positive"
        );
        ensure!(
            self.monthly_interval_secs > 0,
            "monthly_interval_secs must be positive"
        );
        Ok(SchedulerConfig {
            continuous_interval: Duration::from_secs(self.continuous_interval_secs),
            monthly_interval: Duration::from_secs(self.monthly_interval_secs),
        })
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Returns the platform-specific config directory for vt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("vt"))
}

/// Returns the platform-specific data directory for vt.
///
/// On Linux: `~/.local/share/vt`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("vt"))
}

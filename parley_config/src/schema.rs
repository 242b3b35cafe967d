use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const CONFIG_DIR: &str = "parley";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub manager: ManagerSettings,
    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    #[serde(default = "DatabaseConfig::default_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
        }
    }
}

impl DatabaseConfig {
    fn default_url() -> String {
        dirs::home_dir().map_or_else(
            || "sqlite://parley.db?mode=rwc".to_string(),
            |home| {
                format!(
                    "sqlite://{}?mode=rwc",
                    home.join(CONFIG_DIR).join("parley.db").display()
                )
            },
        )
    }

    /// The URL with any password replaced, for display.
    #[must_use]
    pub fn masked_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return self.url.clone();
        };
        let Some((credentials, host)) = rest.rsplit_once('@') else {
            return self.url.clone();
        };
        match credentials.split_once(':') {
            Some((user, _)) => format!("{scheme}://{user}:****@{host}"),
            None => self.url.clone(),
        }
    }
}

/// Conversation manager tuning.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    #[serde(default = "ManagerSettings::default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "ManagerSettings::default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// How long locks of finished conversations linger
    #[serde(default = "ManagerSettings::default_lock_grace_secs")]
    pub lock_grace_secs: u64,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: Self::default_idle_timeout_secs(),
            sweep_interval_secs: Self::default_sweep_interval_secs(),
            lock_grace_secs: Self::default_lock_grace_secs(),
        }
    }
}

impl ManagerSettings {
    const fn default_idle_timeout_secs() -> u64 {
        1800
    }

    const fn default_sweep_interval_secs() -> u64 {
        60
    }

    const fn default_lock_grace_secs() -> u64 {
        300
    }

    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    #[must_use]
    pub const fn lock_grace(&self) -> Duration {
        Duration::from_secs(self.lock_grace_secs)
    }
}

/// Retry behaviour for store operations.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    #[serde(default = "StoreSettings::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "StoreSettings::default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "StoreSettings::default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            initial_backoff_ms: Self::default_initial_backoff_ms(),
            max_backoff_ms: Self::default_max_backoff_ms(),
        }
    }
}

impl StoreSettings {
    const fn default_max_attempts() -> u32 {
        4
    }

    const fn default_initial_backoff_ms() -> u64 {
        50
    }

    const fn default_max_backoff_ms() -> u64 {
        2000
    }

    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Config {
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?
            .join(CONFIG_DIR))
    }

    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found at: {}. Please run 'parley init' to create config.",
                config_path.display()
            );
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config at {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.trim().is_empty() {
            anyhow::bail!("database.url must not be empty");
        }
        if self.manager.idle_timeout_secs == 0 {
            anyhow::bail!("manager.idle_timeout_secs must be positive");
        }
        if self.manager.sweep_interval_secs == 0 {
            anyhow::bail!("manager.sweep_interval_secs must be positive");
        }
        if self.store.max_attempts == 0 {
            anyhow::bail!("store.max_attempts must be at least 1");
        }
        if self.store.initial_backoff_ms > self.store.max_backoff_ms {
            anyhow::bail!("store.initial_backoff_ms exceeds store.max_backoff_ms");
        }
        Ok(())
    }

    pub fn ensure_config_dir() -> anyhow::Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }

    /// Write the default config to `~/parley/config.json` and return its path.
    pub fn create_config() -> anyhow::Result<PathBuf> {
        let config_path = Self::ensure_config_dir()?.join(CONFIG_FILE);
        Self::create_config_at(&config_path)?;
        Ok(config_path)
    }

    pub fn create_config_at(path: &Path) -> anyhow::Result<()> {
        if path.exists() {
            anyhow::bail!(
                "Config file already exists at: {}. Please edit it directly.",
                path.display()
            );
        }

        let template = serde_json::to_string_pretty(&Self::default())?;
        std::fs::write(path, template)?;
        Ok(())
    }
}

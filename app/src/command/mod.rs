//! Static strategy pattern for CLI commands.
//!
//! Each command is a separate strategy with its own input type, dispatched
//! statically from `main`.

use chrono::{DateTime, NaiveDate, Utc};
use parley_config::Config;
use parley_conversation::{ConversationManager, ManagerConfig, ModuleRegistry};
use parley_store::{RetryPolicy, SqlStore};
use std::path::Path;
use tracing::info;

mod demo;
mod info;
mod init;
mod serve;
mod show;
mod stats;
mod sweep;
mod version;

pub use demo::{DemoInput, DemoStrategy};
pub use info::InfoStrategy;
pub use init::InitStrategy;
pub use serve::ServeStrategy;
pub use show::{ShowInput, ShowStrategy};
pub use stats::{StatsInput, StatsStrategy};
pub use sweep::{SweepInput, SweepStrategy};
pub use version::VersionStrategy;

/// Core trait defining the contract for all command strategies.
pub trait CommandStrategy: Send + Sync + 'static {
    /// The input type this strategy accepts.
    type Input;

    /// Execute the command with the given input.
    async fn execute(&self, input: Self::Input) -> anyhow::Result<()>;
}

/// Open the configured store, creating the database file's directory if needed.
async fn open_store(config: &Config) -> anyhow::Result<SqlStore> {
    let url = &config.database.url;
    if let Some(dir) = sqlite_file(url)
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        std::fs::create_dir_all(dir)?;
    }

    let retry = RetryPolicy {
        max_attempts: config.store.max_attempts,
        initial_delay: config.store.initial_backoff(),
        max_delay: config.store.max_backoff(),
    };
    SqlStore::connect(url, retry).await
}

fn sqlite_file(url: &str) -> Option<&Path> {
    let rest = url.strip_prefix("sqlite://")?;
    let path = rest.split_once('?').map_or(rest, |(path, _)| path);
    if path.is_empty() || path.contains(":memory:") {
        None
    } else {
        Some(Path::new(path))
    }
}

/// Build a manager over the configured store.
fn build_manager(
    config: &Config,
    store: SqlStore,
    modules: ModuleRegistry,
) -> anyhow::Result<ConversationManager<SqlStore>> {
    let lock_grace = chrono::Duration::from_std(config.manager.lock_grace())?;
    let manager_config = ManagerConfig::default().with_lock_grace(lock_grace);
    info!(
        "Manager ready: idle timeout {}s, lock grace {}s",
        config.manager.idle_timeout_secs, config.manager.lock_grace_secs
    );
    Ok(ConversationManager::new(store, modules, manager_config))
}

/// Midnight UTC at the start of a `YYYY-MM-DD` date.
fn parse_day(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("Invalid date '{raw}' (expected YYYY-MM-DD): {e}"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| anyhow::anyhow!("Invalid date '{raw}'"))
}

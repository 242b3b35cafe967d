use parley_config::Config;
use parley_conversation::{ModuleRegistry, SweeperConfig};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use super::{build_manager, open_store};

/// Strategy for running the background timeout sweeper until Ctrl-C.
#[derive(Debug, Clone, Copy)]
pub struct ServeStrategy;

impl super::CommandStrategy for ServeStrategy {
    type Input = ();

    async fn execute(&self, _input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load()?;
        let store = open_store(&config).await?;
        let manager = Arc::new(build_manager(&config, store, ModuleRegistry::new())?);

        let sweeper = SweeperConfig {
            interval: config.manager.sweep_interval(),
            idle_timeout: chrono::Duration::from_std(config.manager.idle_timeout())?,
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Arc::clone(&manager).spawn_sweeper(sweeper, shutdown_rx);

        info!("Serving; press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        info!("Shutdown requested");

        shutdown_tx.send(true)?;
        let stats = handle.await?;
        println!(
            "Sweeper ran {} cycle(s): {} timed out, {} skipped, {} error(s), {} lock(s) evicted",
            stats.cycles, stats.timed_out, stats.skipped, stats.errors, stats.evicted_locks
        );
        Ok(())
    }
}

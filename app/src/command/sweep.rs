use parley_config::Config;
use parley_conversation::ModuleRegistry;
use tracing::info;

use super::{build_manager, open_store};

#[derive(Debug, Clone)]
pub struct SweepInput {
    pub threshold_secs: Option<u64>,
}

/// Strategy for running a single timeout sweep.
#[derive(Debug, Clone, Copy)]
pub struct SweepStrategy;

impl super::CommandStrategy for SweepStrategy {
    type Input = SweepInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load()?;
        let threshold_secs = input
            .threshold_secs
            .unwrap_or(config.manager.idle_timeout_secs);
        let threshold = chrono::Duration::seconds(i64::try_from(threshold_secs)?);

        let store = open_store(&config).await?;
        let manager = build_manager(&config, store, ModuleRegistry::new())?;

        info!("Sweeping conversations idle for more than {threshold_secs}s");
        let report = manager.sweep_timeouts(threshold).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

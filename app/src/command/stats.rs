use parley_config::Config;
use parley_conversation::ModuleRegistry;
use parley_core::TimeRange;

use super::{build_manager, open_store, parse_day};

#[derive(Debug, Clone)]
pub struct StatsInput {
    pub since: Option<String>,
    pub until: Option<String>,
}

/// Strategy for printing analytics as JSON.
#[derive(Debug, Clone, Copy)]
pub struct StatsStrategy;

impl super::CommandStrategy for StatsStrategy {
    type Input = StatsInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let range = TimeRange {
            since: input.since.as_deref().map(parse_day).transpose()?,
            until: input.until.as_deref().map(parse_day).transpose()?,
        };

        let config = Config::load()?;
        let store = open_store(&config).await?;
        let manager = build_manager(&config, store, ModuleRegistry::new())?;

        let report = manager.get_analytics(&range).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

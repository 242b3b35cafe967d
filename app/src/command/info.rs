use parley_config::Config;
use parley_core::{ConversationFilter, ConversationStatus, ConversationStore};
use tracing::info;

use super::open_store;

/// Strategy for displaying configuration and store status.
#[derive(Debug, Clone, Copy)]
pub struct InfoStrategy;

impl super::CommandStrategy for InfoStrategy {
    type Input = ();

    async fn execute(&self, _input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load()?;

        println!("=== parley Configuration ===\n");

        println!("Database:");
        println!("  URL: {}", config.database.masked_url());

        info!("Testing database connection");
        match open_store(&config).await {
            Ok(store) => {
                println!("  Status: Connected");
                let active = store
                    .list_conversations(
                        &ConversationFilter::default().with_status(ConversationStatus::Active),
                    )
                    .await?;
                println!("  Active Conversations: {}", active.len());
            }
            Err(e) => {
                println!("  Status: Connection failed");
                println!("  Error: {e}");
            }
        }
        println!();

        println!("Manager:");
        println!("  Idle Timeout: {}s", config.manager.idle_timeout_secs);
        println!("  Sweep Interval: {}s", config.manager.sweep_interval_secs);
        println!("  Lock Grace: {}s", config.manager.lock_grace_secs);
        println!();

        println!("Store Retry:");
        println!("  Max Attempts: {}", config.store.max_attempts);
        println!("  Initial Backoff: {}ms", config.store.initial_backoff_ms);
        println!("  Max Backoff: {}ms", config.store.max_backoff_ms);

        Ok(())
    }
}

use parley_config::Config;

/// Strategy for initializing the configuration.
///
/// Creates the default configuration file at `~/parley/config.json`.
#[derive(Debug, Clone, Copy)]
pub struct InitStrategy;

impl super::CommandStrategy for InitStrategy {
    type Input = ();

    async fn execute(&self, _input: Self::Input) -> anyhow::Result<()> {
        let config_path = Config::create_config()?;
        let config = Config::default();

        println!("✅ Created config file at: {}", config_path.display());
        println!();
        println!("📝 Next steps:");
        println!("   1. Point database.url at your store (default: {})", config.database.url);
        println!("   2. Run 'parley demo' to try a conversation");
        println!("   3. Run 'parley serve' to keep idle conversations timing out");
        println!();
        println!("🔧 Configuration options:");
        println!("   - manager.idle_timeout_secs: Idle time before a conversation times out");
        println!("   - manager.sweep_interval_secs: Time between timeout sweeps");
        println!("   - store.max_attempts: Attempts per store operation on transient errors");
        println!();
        Ok(())
    }
}

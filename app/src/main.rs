#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod command;
mod modules;

use command::{
    CommandStrategy, DemoInput, DemoStrategy, InfoStrategy, InitStrategy, ServeStrategy,
    ShowInput, ShowStrategy, StatsInput, StatsStrategy, SweepInput, SweepStrategy,
    VersionStrategy,
};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Conversation orchestration between participant modules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Init,
    /// Show configuration and store status
    Info,
    /// Show version
    Version,
    /// Print a conversation and its messages
    Show {
        /// Conversation id
        id: Uuid,

        /// Maximum number of messages to print
        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        /// Number of messages to skip
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
    },
    /// Print conversation analytics as JSON
    Stats {
        /// Only conversations started on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Only conversations started before this date (YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,
    },
    /// Run one timeout sweep
    Sweep {
        /// Idle threshold in seconds (defaults to manager.idle_timeout_secs)
        #[arg(long)]
        threshold_secs: Option<u64>,
    },
    /// Run a conversation between two built-in demo modules
    Demo {
        /// Number of counter exchanges
        #[arg(short, long, default_value_t = 3)]
        turns: u32,

        /// Use a throwaway in-memory store
        #[arg(long)]
        in_memory: bool,
    },
    /// Run the timeout sweeper until Ctrl-C
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => InitStrategy.execute(()).await,
        Commands::Info => InfoStrategy.execute(()).await,
        Commands::Version => VersionStrategy.execute(()).await,
        Commands::Show { id, limit, offset } => {
            ShowStrategy
                .execute(ShowInput { id, limit, offset })
                .await
        }
        Commands::Stats { since, until } => {
            StatsStrategy.execute(StatsInput { since, until }).await
        }
        Commands::Sweep { threshold_secs } => {
            SweepStrategy.execute(SweepInput { threshold_secs }).await
        }
        Commands::Demo { turns, in_memory } => {
            DemoStrategy.execute(DemoInput { turns, in_memory }).await
        }
        Commands::Serve => ServeStrategy.execute(()).await,
    }
}

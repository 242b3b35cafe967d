//! Background timeout sweep.

use parley_core::ConversationStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, trace};

use crate::manager::{ConversationManager, SweepReport};

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between sweep passes
    pub interval: Duration,
    /// Conversations idle for longer than this are timed out
    pub idle_timeout: chrono::Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            idle_timeout: chrono::Duration::minutes(30),
        }
    }
}

/// Totals accumulated over the sweeper's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweeperStats {
    pub cycles: u64,
    pub timed_out: u64,
    pub skipped: u64,
    /// Failed passes plus candidates that could not be expired
    pub errors: u64,
    pub evicted_locks: u64,
}

impl SweeperStats {
    fn record(&mut self, report: &SweepReport) {
        self.timed_out += report.timed_out as u64;
        self.skipped += report.skipped as u64;
        self.errors += report.failed as u64;
        self.evicted_locks += report.evicted_locks as u64;
    }
}

impl<S> ConversationManager<S>
where
    S: ConversationStore + 'static,
{
    /// Run [`ConversationManager::sweep_timeouts`] every `config.interval`
    /// until `shutdown` reads `true`.
    ///
    /// The first pass runs immediately unless `shutdown` is already `true`.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        config: SweeperConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<SweeperStats> {
        tokio::spawn(async move {
            let mut stats = SweeperStats::default();
            let mut ticker = interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                "Timeout sweeper started (interval {}s, idle timeout {}s)",
                config.interval.as_secs(),
                config.idle_timeout.num_seconds()
            );

            // A receiver that already reads `true` never sweeps.
            while !*shutdown.borrow_and_update() {
                tokio::select! {
                    changed = shutdown.changed() => {
                        // A dropped sender also means shut down.
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        stats.cycles += 1;
                        match self.sweep_timeouts(config.idle_timeout).await {
                            Ok(report) => stats.record(&report),
                            Err(e) => {
                                error!("Timeout sweep failed: {e}");
                                stats.errors += 1;
                            }
                        }
                        trace!("Sweep cycle {} done", stats.cycles);
                    }
                }
            }

            info!(
                "Timeout sweeper stopped after {} cycle(s): {} timed out, {} error(s)",
                stats.cycles, stats.timed_out, stats.errors
            );
            stats
        })
    }
}

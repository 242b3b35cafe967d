//! Conversation analytics.

use parley_core::{
    Conversation, ConversationFilter, ConversationStatus, ConversationStore, ModuleId, StoreError,
    TimeRange,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-module participation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModuleActivity {
    /// Conversations the module opened
    pub initiated: u64,
    /// Conversations the module took part in, including those it opened
    pub participated: u64,
}

/// Summary over a set of conversations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub timeout: u64,
    pub active: u64,
    pub average_turns: f64,
    /// Mean of `last_activity - started_at` over terminal conversations only
    pub average_duration_seconds: f64,
    pub modules: BTreeMap<ModuleId, ModuleActivity>,
}

impl AnalyticsReport {
    pub fn from_conversations<'a>(conversations: impl IntoIterator<Item = &'a Conversation>) -> Self {
        let mut report = Self::default();
        let mut turns = 0u64;
        let mut terminal = 0u64;
        let mut duration = 0.0f64;

        for conversation in conversations {
            report.total += 1;
            turns += conversation.turn_count;
            match conversation.status {
                ConversationStatus::Active => report.active += 1,
                ConversationStatus::Completed => report.completed += 1,
                ConversationStatus::Failed => report.failed += 1,
                ConversationStatus::Timeout => report.timeout += 1,
            }
            if conversation.is_terminal() {
                terminal += 1;
                duration += conversation.duration_seconds();
            }

            report
                .modules
                .entry(conversation.initiator.clone())
                .or_default()
                .initiated += 1;
            for module in &conversation.participants {
                report.modules.entry(module.clone()).or_default().participated += 1;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let turns = turns as f64;
        report.average_turns = mean(turns, report.total);
        report.average_duration_seconds = mean(duration, terminal);
        report
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(sum: f64, count: u64) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Build a report for conversations started within `range`.
pub async fn summarize<S>(store: &S, range: &TimeRange) -> Result<AnalyticsReport, StoreError>
where
    S: ConversationStore + ?Sized,
{
    let filter = ConversationFilter::default().started_in(*range);
    let conversations = store.list_conversations(&filter).await?;
    Ok(AnalyticsReport::from_conversations(&conversations))
}

/// Reads conversations from a store and summarises them.
pub struct AnalyticsAggregator<S> {
    store: S,
}

impl<S> AnalyticsAggregator<S>
where
    S: ConversationStore,
{
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn report(&self, range: &TimeRange) -> Result<AnalyticsReport, StoreError> {
        summarize(&self.store, range).await
    }

    /// Report restricted to conversations `module` took part in.
    pub async fn module_report(
        &self,
        module: &ModuleId,
        range: &TimeRange,
    ) -> Result<AnalyticsReport, StoreError> {
        let conversations = self.store.query_by_participant(module, range).await?;
        Ok(AnalyticsReport::from_conversations(&conversations))
    }
}

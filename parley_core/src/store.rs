//! Persistent store contract.
//!
//! A store keeps the append-only message log and the mutable conversation
//! rows. It knows nothing about the lifecycle: status checks belong to the
//! manager. The one invariant a store does enforce is the turn sequence,
//! because it is the only place that can keep the message count and
//! `turn_count` in step.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{Conversation, ConversationStatus, Message, ModuleId, StoreError};

/// Half-open range `[since, until)` over `started_at`. Missing bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeRange {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            since: None,
            until: None,
        }
    }

    #[must_use]
    pub const fn between(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            until: Some(until),
        }
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.since.is_none_or(|since| at >= since) && self.until.is_none_or(|until| at < until)
    }
}

/// Selection criteria for [`ConversationStore::list_conversations`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationFilter {
    pub status: Option<ConversationStatus>,
    pub participant: Option<ModuleId>,
    pub started: TimeRange,
    /// Only conversations whose last activity is strictly before this instant
    pub idle_before: Option<DateTime<Utc>>,
}

impl ConversationFilter {
    #[must_use]
    pub fn with_status(mut self, status: ConversationStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_participant(mut self, module: ModuleId) -> Self {
        self.participant = Some(module);
        self
    }

    #[must_use]
    pub const fn started_in(mut self, range: TimeRange) -> Self {
        self.started = range;
        self
    }

    #[must_use]
    pub const fn idle_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.idle_before = Some(cutoff);
        self
    }

    #[must_use]
    pub fn matches(&self, conversation: &Conversation) -> bool {
        self.status.is_none_or(|s| conversation.status == s)
            && self
                .participant
                .as_ref()
                .is_none_or(|m| conversation.is_participant(m))
            && self.started.contains(conversation.started_at)
            && self
                .idle_before
                .is_none_or(|cutoff| conversation.last_activity < cutoff)
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert a new conversation together with its opening turn.
    async fn create_conversation(
        &self,
        conversation: &Conversation,
        first: &Message,
    ) -> Result<(), StoreError>;

    /// Append `message` and write `conversation` in one atomic step.
    ///
    /// `message.turn_number` must be the stored `turn_count + 1`, and
    /// `conversation.turn_count` must equal it.
    async fn append_message(
        &self,
        message: &Message,
        conversation: &Conversation,
    ) -> Result<(), StoreError>;

    async fn upsert_conversation(&self, conversation: &Conversation) -> Result<(), StoreError>;

    async fn get_conversation(&self, id: &Uuid) -> Result<Option<Conversation>, StoreError>;

    /// Messages in turn order.
    async fn get_messages(
        &self,
        id: &Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError>;

    async fn count_messages(&self, id: &Uuid) -> Result<u64, StoreError>;

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>, StoreError>;

    /// Conversations `module` takes part in, started within `range`.
    async fn query_by_participant(
        &self,
        module: &ModuleId,
        range: &TimeRange,
    ) -> Result<Vec<Conversation>, StoreError> {
        let filter = ConversationFilter::default()
            .with_participant(module.clone())
            .started_in(*range);
        self.list_conversations(&filter).await
    }
}

#[async_trait]
impl<T: ConversationStore + ?Sized> ConversationStore for Arc<T> {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
        first: &Message,
    ) -> Result<(), StoreError> {
        (**self).create_conversation(conversation, first).await
    }

    async fn append_message(
        &self,
        message: &Message,
        conversation: &Conversation,
    ) -> Result<(), StoreError> {
        (**self).append_message(message, conversation).await
    }

    async fn upsert_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        (**self).upsert_conversation(conversation).await
    }

    async fn get_conversation(&self, id: &Uuid) -> Result<Option<Conversation>, StoreError> {
        (**self).get_conversation(id).await
    }

    async fn get_messages(
        &self,
        id: &Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError> {
        (**self).get_messages(id, limit, offset).await
    }

    async fn count_messages(&self, id: &Uuid) -> Result<u64, StoreError> {
        (**self).count_messages(id).await
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>, StoreError> {
        (**self).list_conversations(filter).await
    }

    async fn query_by_participant(
        &self,
        module: &ModuleId,
        range: &TimeRange,
    ) -> Result<Vec<Conversation>, StoreError> {
        (**self).query_by_participant(module, range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::BTreeSet;

    fn conversation_at(started_at: DateTime<Utc>) -> Conversation {
        Conversation::new(
            ModuleId::from("a"),
            BTreeSet::from([ModuleId::from("b")]),
            started_at,
        )
    }

    #[test]
    fn time_range_is_half_open() {
        let now = Utc::now();
        let range = TimeRange::between(now, now + Duration::hours(1));

        assert!(range.contains(now));
        assert!(range.contains(now + Duration::minutes(59)));
        assert!(!range.contains(now + Duration::hours(1)));
        assert!(!range.contains(now - Duration::seconds(1)));
        assert!(TimeRange::all().contains(now));
    }

    #[test]
    fn filter_combines_criteria() {
        let now = Utc::now();
        let conv = conversation_at(now);

        let filter = ConversationFilter::default()
            .with_status(ConversationStatus::Active)
            .with_participant(ModuleId::from("b"))
            .idle_before(now + Duration::seconds(1));
        assert!(filter.matches(&conv));

        let filter = ConversationFilter::default().with_participant(ModuleId::from("c"));
        assert!(!filter.matches(&conv));

        let filter = ConversationFilter::default().idle_before(now);
        assert!(!filter.matches(&conv));

        let filter = ConversationFilter::default().with_status(ConversationStatus::Failed);
        assert!(!filter.matches(&conv));
    }
}

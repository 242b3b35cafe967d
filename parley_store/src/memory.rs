use async_trait::async_trait;
use parley_core::{Conversation, ConversationFilter, ConversationStore, Message, StoreError};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug)]
struct Record {
    conversation: Conversation,
    messages: Vec<Message>,
}

/// Process-local store. Nothing survives a restart; meant for tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<Uuid, Record>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
        first: &Message,
    ) -> Result<(), StoreError> {
        let id = conversation.conversation_id;
        if first.turn_number != 1 || conversation.turn_count != 1 {
            return Err(StoreError::TurnOrderViolation {
                conversation_id: id,
                expected: 1,
                found: first.turn_number,
            });
        }

        let mut records = self.records.write().await;
        if let Some(record) = records.get(&id) {
            if record.messages.first().is_some_and(|m| m.message_id == first.message_id) {
                return Ok(());
            }
            return Err(StoreError::Backend(format!(
                "conversation {id} already exists"
            )));
        }
        records.insert(
            id,
            Record {
                conversation: conversation.clone(),
                messages: vec![first.clone()],
            },
        );
        Ok(())
    }

    async fn append_message(
        &self,
        message: &Message,
        conversation: &Conversation,
    ) -> Result<(), StoreError> {
        let id = message.conversation_id;
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        let expected = record.conversation.turn_count + 1;
        if message.turn_number + 1 == expected
            && record.messages.last().is_some_and(|m| m.message_id == message.message_id)
        {
            return Ok(());
        }
        if message.turn_number != expected || conversation.turn_count != message.turn_number {
            return Err(StoreError::TurnOrderViolation {
                conversation_id: id,
                expected,
                found: message.turn_number,
            });
        }

        record.messages.push(message.clone());
        record.conversation = conversation.clone();
        Ok(())
    }

    async fn upsert_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records
            .entry(conversation.conversation_id)
            .and_modify(|record| record.conversation = conversation.clone())
            .or_insert_with(|| Record {
                conversation: conversation.clone(),
                messages: Vec::new(),
            });
        Ok(())
    }

    async fn get_conversation(&self, id: &Uuid) -> Result<Option<Conversation>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(id).map(|r| r.conversation.clone()))
    }

    async fn get_messages(
        &self,
        id: &Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .get(id)
            .map(|r| r.messages.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn count_messages(&self, id: &Uuid) -> Result<u64, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .get(id)
            .map_or(0, |r| r.messages.len() as u64))
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>, StoreError> {
        let records = self.records.read().await;
        let mut conversations: Vec<Conversation> = records
            .values()
            .map(|r| &r.conversation)
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        conversations.sort_by_key(|c| (c.started_at, c.conversation_id));
        Ok(conversations)
    }
}

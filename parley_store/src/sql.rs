//! sea-orm backed store.
//!
//! Works with any backend sea-orm can connect to; SQLite is the default.
//! Every write runs in a single transaction, so a conversation row and its
//! messages never disagree about `turn_count`.

use async_trait::async_trait;
use parley_core::{Conversation, ConversationFilter, ConversationStore, Message, StoreError};
use parley_entities::{conversation_messages, conversations};
use sea_orm::sea_query::Index;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Schema,
    TransactionTrait,
};
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::convert;
use crate::retry::{RetryError, RetryPolicy};

fn is_already_exists_error(err: &DbErr) -> bool {
    let text = err.to_string();
    text.contains("already exists") || text.contains("Duplicate key name")
}

/// Failures worth another attempt: lost connections, pool exhaustion and
/// SQLite writer contention.
fn is_transient_db_error(err: &DbErr) -> bool {
    if matches!(err, DbErr::ConnectionAcquire(_) | DbErr::Conn(_)) {
        return true;
    }
    let text = err.to_string().to_lowercase();
    text.contains("database is locked")
        || text.contains("database table is locked")
        || text.contains("connection reset")
        || text.contains("timed out")
}

/// Error inside one attempt.
#[derive(Debug)]
enum AttemptError {
    Db(DbErr),
    Store(StoreError),
}

impl AttemptError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Db(e) => is_transient_db_error(e),
            Self::Store(_) => false,
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Db(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl From<DbErr> for AttemptError {
    fn from(e: DbErr) -> Self {
        Self::Db(e)
    }
}

impl From<StoreError> for AttemptError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<RetryError<AttemptError>> for StoreError {
    fn from(e: RetryError<AttemptError>) -> Self {
        match e {
            RetryError::Exhausted { attempts, last } => Self::Unavailable {
                attempts,
                message: last.to_string(),
            },
            RetryError::Permanent(AttemptError::Db(e)) => Self::Backend(e.to_string()),
            RetryError::Permanent(AttemptError::Store(e)) => e,
        }
    }
}

pub struct SqlStore {
    db: DatabaseConnection,
    retry: RetryPolicy,
}

impl SqlStore {
    /// Connect and create the schema if it is missing.
    pub async fn connect(database_url: &str, retry: RetryPolicy) -> anyhow::Result<Self> {
        info!("Connecting to conversation store: {}", database_url);

        let mut options = ConnectOptions::new(database_url.to_string());
        options.sqlx_logging(false);
        // Every connection to `:memory:` opens its own empty database.
        if database_url.contains(":memory:") {
            options.max_connections(1).min_connections(1);
        }

        let db = Database::connect(options).await?;
        let store = Self { db, retry };
        store.create_schema().await?;

        info!("Conversation store initialized");
        Ok(store)
    }

    /// A private in-memory SQLite database.
    pub async fn in_memory() -> anyhow::Result<Self> {
        Self::connect("sqlite::memory:", RetryPolicy::default()).await
    }

    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn create_schema(&self) -> anyhow::Result<()> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let turn_index = Index::create()
            .name("idx_conversation_messages_turn")
            .table(conversation_messages::Entity)
            .col(conversation_messages::Column::ConversationId)
            .col(conversation_messages::Column::TurnNumber)
            .unique()
            .to_owned();

        let statements = [
            backend.build(&schema.create_table_from_entity(conversations::Entity)),
            backend.build(&schema.create_table_from_entity(conversation_messages::Entity)),
            backend.build(&turn_index),
        ];

        for stmt in statements {
            match self.db.execute_unprepared(&stmt.to_string()).await {
                Ok(_) => {}
                Err(e) if is_already_exists_error(&e) => {
                    debug!("Schema object already exists, skipping creation");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn try_create(
        &self,
        conversation: &Conversation,
        first: &Message,
    ) -> Result<(), AttemptError> {
        let id = conversation.conversation_id;
        if first.turn_number != 1 || conversation.turn_count != 1 {
            return Err(StoreError::TurnOrderViolation {
                conversation_id: id,
                expected: 1,
                found: first.turn_number,
            }
            .into());
        }

        let txn = self.db.begin().await?;
        if conversation_messages::Entity::find_by_id(first.message_id)
            .one(&txn)
            .await?
            .is_some()
        {
            debug!("Conversation {id} already stored by an earlier attempt");
            return Ok(());
        }

        convert::conversation_to_active(conversation)?
            .insert(&txn)
            .await?;
        convert::message_to_active(first)?.insert(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn try_append(
        &self,
        message: &Message,
        conversation: &Conversation,
    ) -> Result<(), AttemptError> {
        let id = message.conversation_id;
        let txn = self.db.begin().await?;

        let stored = conversations::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        let stored_turns = u64::try_from(stored.turn_count).unwrap_or(0);
        let expected = stored_turns + 1;

        // A retry after a commit whose acknowledgement was lost.
        if message.turn_number == stored_turns
            && conversation_messages::Entity::find_by_id(message.message_id)
                .one(&txn)
                .await?
                .is_some()
        {
            debug!(
                "Turn {} of conversation {id} already stored by an earlier attempt",
                message.turn_number
            );
            return Ok(());
        }

        if message.turn_number != expected || conversation.turn_count != message.turn_number {
            return Err(StoreError::TurnOrderViolation {
                conversation_id: id,
                expected,
                found: message.turn_number,
            }
            .into());
        }

        convert::message_to_active(message)?.insert(&txn).await?;
        conversations::Entity::update(convert::conversation_to_active(conversation)?)
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn try_upsert(&self, conversation: &Conversation) -> Result<(), AttemptError> {
        let txn = self.db.begin().await?;
        let exists = conversations::Entity::find_by_id(conversation.conversation_id)
            .one(&txn)
            .await?
            .is_some();

        let active = convert::conversation_to_active(conversation)?;
        if exists {
            conversations::Entity::update(active).exec(&txn).await?;
        } else {
            active.insert(&txn).await?;
        }
        txn.commit().await?;
        Ok(())
    }

    async fn try_get(&self, id: Uuid) -> Result<Option<Conversation>, AttemptError> {
        let model = conversations::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(convert::conversation_from_model).transpose()?)
    }

    async fn try_messages(
        &self,
        id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, AttemptError> {
        let models = conversation_messages::Entity::find()
            .filter(conversation_messages::Column::ConversationId.eq(id))
            .order_by_asc(conversation_messages::Column::TurnNumber)
            .offset(convert::page_bound(offset))
            .limit(convert::page_bound(limit))
            .all(&self.db)
            .await?;

        Ok(models
            .into_iter()
            .map(convert::message_from_model)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn try_count(&self, id: Uuid) -> Result<u64, AttemptError> {
        Ok(conversation_messages::Entity::find()
            .filter(conversation_messages::Column::ConversationId.eq(id))
            .count(&self.db)
            .await?)
    }

    async fn try_list(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>, AttemptError> {
        let mut query = conversations::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(conversations::Column::Status.eq(status.as_str()));
        }
        if let Some(module) = &filter.participant {
            query = query
                .filter(conversations::Column::Participants.contains(convert::participant_needle(module)));
        }
        if let Some(since) = filter.started.since {
            query = query.filter(conversations::Column::StartedAt.gte(since.naive_utc()));
        }
        if let Some(until) = filter.started.until {
            query = query.filter(conversations::Column::StartedAt.lt(until.naive_utc()));
        }
        if let Some(cutoff) = filter.idle_before {
            query = query.filter(conversations::Column::LastActivity.lt(cutoff.naive_utc()));
        }

        let models = query
            .order_by_asc(conversations::Column::StartedAt)
            .order_by_asc(conversations::Column::ConversationId)
            .all(&self.db)
            .await?;

        let mut conversations = Vec::with_capacity(models.len());
        for model in models {
            let conversation = convert::conversation_from_model(model)?;
            // LIKE on the JSON column can over-match; the typed check is exact.
            if filter.matches(&conversation) {
                conversations.push(conversation);
            }
        }
        Ok(conversations)
    }
}

#[async_trait]
impl ConversationStore for SqlStore {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
        first: &Message,
    ) -> Result<(), StoreError> {
        self.retry
            .run(
                "create_conversation",
                || self.try_create(conversation, first),
                AttemptError::is_transient,
            )
            .await?;
        debug!("Stored conversation {}", conversation.conversation_id);
        Ok(())
    }

    async fn append_message(
        &self,
        message: &Message,
        conversation: &Conversation,
    ) -> Result<(), StoreError> {
        self.retry
            .run(
                "append_message",
                || self.try_append(message, conversation),
                AttemptError::is_transient,
            )
            .await?;
        debug!(
            "Stored turn {} of conversation {}",
            message.turn_number, message.conversation_id
        );
        Ok(())
    }

    async fn upsert_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        Ok(self
            .retry
            .run(
                "upsert_conversation",
                || self.try_upsert(conversation),
                AttemptError::is_transient,
            )
            .await?)
    }

    async fn get_conversation(&self, id: &Uuid) -> Result<Option<Conversation>, StoreError> {
        Ok(self
            .retry
            .run("get_conversation", || self.try_get(*id), AttemptError::is_transient)
            .await?)
    }

    async fn get_messages(
        &self,
        id: &Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .retry
            .run(
                "get_messages",
                || self.try_messages(*id, limit, offset),
                AttemptError::is_transient,
            )
            .await?)
    }

    async fn count_messages(&self, id: &Uuid) -> Result<u64, StoreError> {
        Ok(self
            .retry
            .run("count_messages", || self.try_count(*id), AttemptError::is_transient)
            .await?)
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>, StoreError> {
        Ok(self
            .retry
            .run(
                "list_conversations",
                || self.try_list(filter),
                AttemptError::is_transient,
            )
            .await?)
    }
}

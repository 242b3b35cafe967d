#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parley_conversation::{ConversationManager, ManagerConfig, ModuleRegistry};
use parley_core::{
    Clock, Conversation, ConversationFilter, ConversationStore, ManualClock, Message, ParticipantModule,
    ProcessInput, ProcessResult, StoreError,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use uuid::Uuid;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

/// Answers `{"task": "greet"}` with `{"greeting": "hello"}`; consumes anything else.
pub struct Greeter;

#[async_trait]
impl ParticipantModule for Greeter {
    async fn process(&self, input: ProcessInput) -> anyhow::Result<ProcessResult> {
        let context = input.context.with("greeted", true);
        if input.payload["task"] == "greet" {
            Ok(ProcessResult::reply(context, json!({"greeting": "hello"})))
        } else {
            Ok(ProcessResult::silent(context))
        }
    }
}

/// Never replies; counts deliveries in the context.
pub struct Sink;

#[async_trait]
impl ParticipantModule for Sink {
    async fn process(&self, input: ProcessInput) -> anyhow::Result<ProcessResult> {
        let received = input
            .context
            .get("received")
            .and_then(parley_core::ContextValue::as_integer)
            .unwrap_or(0);
        Ok(ProcessResult::silent(
            input.context.with("received", received + 1),
        ))
    }
}

/// Replies with the payload it was given.
pub struct Echo;

#[async_trait]
impl ParticipantModule for Echo {
    async fn process(&self, input: ProcessInput) -> anyhow::Result<ProcessResult> {
        Ok(ProcessResult::reply(input.context, input.payload))
    }
}

pub struct Broken;

#[async_trait]
impl ParticipantModule for Broken {
    async fn process(&self, _input: ProcessInput) -> anyhow::Result<ProcessResult> {
        anyhow::bail!("model backend refused the request")
    }
}

/// Registry used by every manager test:
/// `client` and `sink` consume, `greeter` greets, `echo` echoes, `broken` fails.
pub fn modules() -> ModuleRegistry {
    let mut modules = ModuleRegistry::new();
    modules.register("client", Arc::new(Sink));
    modules.register("sink", Arc::new(Sink));
    modules.register("greeter", Arc::new(Greeter));
    modules.register("echo", Arc::new(Echo));
    modules.register("broken", Arc::new(Broken));
    modules
}

pub fn manager<S: ConversationStore>(store: S, clock: &Arc<ManualClock>) -> ConversationManager<S> {
    let config = ManagerConfig::default().with_lock_grace(Duration::zero());
    let clock: Arc<dyn Clock> = clock.clone();
    ConversationManager::new(store, modules(), config).with_clock(clock)
}

/// Store wrapper whose writes can be switched off.
pub struct FlakyStore<S> {
    pub inner: S,
    failing: AtomicBool,
}

impl<S> FlakyStore<S> {
    pub const fn new(inner: S) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable {
                attempts: 4,
                message: "database is locked".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<S: ConversationStore> ConversationStore for FlakyStore<S> {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
        first: &Message,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.create_conversation(conversation, first).await
    }

    async fn append_message(
        &self,
        message: &Message,
        conversation: &Conversation,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.append_message(message, conversation).await
    }

    async fn upsert_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        self.check()?;
        self.inner.upsert_conversation(conversation).await
    }

    async fn get_conversation(&self, id: &Uuid) -> Result<Option<Conversation>, StoreError> {
        self.inner.get_conversation(id).await
    }

    async fn get_messages(
        &self,
        id: &Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError> {
        self.inner.get_messages(id, limit, offset).await
    }

    async fn count_messages(&self, id: &Uuid) -> Result<u64, StoreError> {
        self.inner.count_messages(id).await
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>, StoreError> {
        self.inner.list_conversations(filter).await
    }
}

/// Store wrapper that lets a test pause an append and observe sweep listings.
pub struct GatedStore<S> {
    pub inner: S,
    armed: AtomicBool,
    /// Signalled when an armed append starts waiting
    pub appending: Notify,
    /// Releases the waiting append
    pub gate: Notify,
    /// Signalled after every listing
    pub listed: Notify,
}

impl<S> GatedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            appending: Notify::new(),
            gate: Notify::new(),
            listed: Notify::new(),
        }
    }

    /// Make the next append wait for [`GatedStore::gate`].
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: ConversationStore> ConversationStore for GatedStore<S> {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
        first: &Message,
    ) -> Result<(), StoreError> {
        self.inner.create_conversation(conversation, first).await
    }

    async fn append_message(
        &self,
        message: &Message,
        conversation: &Conversation,
    ) -> Result<(), StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.appending.notify_one();
            self.gate.notified().await;
        }
        self.inner.append_message(message, conversation).await
    }

    async fn upsert_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        self.inner.upsert_conversation(conversation).await
    }

    async fn get_conversation(&self, id: &Uuid) -> Result<Option<Conversation>, StoreError> {
        self.inner.get_conversation(id).await
    }

    async fn get_messages(
        &self,
        id: &Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError> {
        self.inner.get_messages(id, limit, offset).await
    }

    async fn count_messages(&self, id: &Uuid) -> Result<u64, StoreError> {
        self.inner.count_messages(id).await
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>, StoreError> {
        let listed = self.inner.list_conversations(filter).await;
        self.listed.notify_one();
        listed
    }
}

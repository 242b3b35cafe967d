//! Conversation manager.
//!
//! The `ConversationManager` is the entry point for opening conversations,
//! routing turns between participant modules, ending conversations and
//! expiring idle ones. Every mutating operation on a conversation runs under
//! that conversation's lock; operations on different conversations never
//! wait on each other.

use chrono::Duration;
use parley_core::{
    Clock, Conversation, ConversationFilter, ConversationStatus, ConversationStore, Message,
    MessageDraft, ModuleId, ProcessInput, StoreError, SystemClock, TimeRange,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analytics::{self, AnalyticsReport};
use crate::error::ConversationError;
use crate::locks::{ConversationGuard, LockRegistry};
use crate::registry::ModuleRegistry;
use crate::state::{self, StateError, Transition};

/// Configuration for conversation management.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How long the lock of a finished conversation is kept before eviction
    pub lock_grace: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            lock_grace: Duration::minutes(5),
        }
    }
}

impl ManagerConfig {
    #[must_use]
    pub const fn with_lock_grace(mut self, grace: Duration) -> Self {
        self.lock_grace = grace;
        self
    }
}

/// Request to open a conversation.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub initiator: ModuleId,
    pub target: ModuleId,
    pub payload: Value,
    /// Participants beyond the initiator and the target
    pub others: BTreeSet<ModuleId>,
}

impl NewConversation {
    #[must_use]
    pub fn new(initiator: impl Into<ModuleId>, target: impl Into<ModuleId>, payload: Value) -> Self {
        Self {
            initiator: initiator.into(),
            target: target.into(),
            payload,
            others: BTreeSet::new(),
        }
    }

    /// Add a participant for multi-party conversations.
    #[must_use]
    pub fn with_participant(mut self, module: impl Into<ModuleId>) -> Self {
        self.others.insert(module.into());
        self
    }

    fn validate(&self) -> Result<(), ConversationError> {
        if self.initiator == self.target {
            return Err(ConversationError::InvalidRequest(format!(
                "initiator and target are both {}",
                self.initiator
            )));
        }
        if self.payload.is_null() {
            return Err(ConversationError::InvalidRequest(
                "initial payload must not be null".to_string(),
            ));
        }
        Ok(())
    }
}

/// How a conversation is being ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    Completed,
    Failed(String),
}

/// Result of [`ConversationManager::create_conversation`].
#[derive(Debug, Clone, Serialize)]
pub struct ConversationOpened {
    pub conversation_id: Uuid,
    /// Turn 1
    pub opening: Message,
    /// The target's answer to turn 1, if it gave one
    pub reply: Option<Message>,
}

/// Result of [`ConversationManager::route_message`].
#[derive(Debug, Clone, Serialize)]
pub struct Delivery {
    /// The routed message as persisted
    pub message: Message,
    /// The target's answer, persisted as the following turn and pending
    /// until [`ConversationManager::forward_reply`] hands it over
    pub reply: Option<Message>,
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Conversations that looked idle when the pass started
    pub candidates: usize,
    pub timed_out: usize,
    /// Candidates that were no longer idle (or no longer active) under the lock
    pub skipped: usize,
    /// Candidates that could not be processed
    pub failed: usize,
    pub evicted_locks: usize,
}

/// Multi-party conversation manager.
pub struct ConversationManager<S = Arc<dyn ConversationStore>>
where
    S: ConversationStore,
{
    store: S,
    modules: ModuleRegistry,
    locks: LockRegistry,
    clock: Arc<dyn Clock>,
    config: ManagerConfig,
}

impl<S> ConversationManager<S>
where
    S: ConversationStore,
{
    /// Create a new conversation manager.
    pub fn new(store: S, modules: ModuleRegistry, config: ManagerConfig) -> Self {
        info!(
            "Creating conversation manager with {} participant module(s)",
            modules.len()
        );
        Self {
            store,
            modules,
            locks: LockRegistry::new(),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    #[must_use]
    pub const fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Open a conversation and deliver its first turn to the target.
    ///
    /// The conversation and turn 1 are durable before the target is called.
    /// If the target fails, the conversation is persisted as `Failed` and
    /// `ModuleUnavailable` is returned.
    pub async fn create_conversation(
        &self,
        request: NewConversation,
    ) -> Result<ConversationOpened, ConversationError> {
        request.validate()?;
        let NewConversation {
            initiator,
            target,
            payload,
            mut others,
        } = request;

        let now = self.clock.now();
        others.insert(target.clone());
        let mut conversation = Conversation::new(initiator.clone(), others, now);
        let id = conversation.conversation_id;
        let guard = self.locks.acquire(id).await;

        let (turn, at) =
            state::accept_turn(&mut conversation, now).map_err(|e| terminal(id, e))?;
        let opening = MessageDraft::new(id, initiator, target, payload).into_message(turn, at);

        if let Err(e) = self.store.create_conversation(&conversation, &opening).await {
            self.locks.retire(id, now);
            return Err(self.store_failure(e));
        }
        info!(
            "Created conversation {id}: {} -> {} ({} participants)",
            opening.source,
            opening.target,
            conversation.participants.len()
        );

        let reply = self.dispatch(&guard, conversation, &opening).await?;
        Ok(ConversationOpened {
            conversation_id: id,
            opening,
            reply,
        })
    }

    /// Persist `draft` as the next turn, deliver it, and persist the reply.
    pub async fn route_message(&self, draft: MessageDraft) -> Result<Delivery, ConversationError> {
        let id = draft.conversation_id;
        let guard = self.locks.acquire(id).await;
        let mut conversation = self.load(id).await?;

        if conversation.is_terminal() {
            return Err(ConversationError::ConversationTerminal {
                conversation_id: id,
                status: conversation.status,
            });
        }
        for module in [&draft.source, &draft.target] {
            if !conversation.is_participant(module) {
                return Err(ConversationError::InvalidParticipant {
                    conversation_id: id,
                    module: module.clone(),
                });
            }
        }

        let (turn, at) =
            state::accept_turn(&mut conversation, self.clock.now()).map_err(|e| terminal(id, e))?;
        let message = draft.into_message(turn, at);
        self.append(&message, &conversation).await?;
        debug!(
            "Accepted turn {turn} of conversation {id}: {} -> {}",
            message.source, message.target
        );

        let reply = self.dispatch(&guard, conversation, &message).await?;
        Ok(Delivery { message, reply })
    }

    /// Deliver the latest turn, a reply its target has not received yet.
    ///
    /// Nothing is appended for the forwarded turn; the target's own answer,
    /// if any, becomes the next turn as with [`Self::route_message`]. The
    /// reply is marked delivered before the target is called, so it is
    /// handed over at most once.
    pub async fn forward_reply(&self, id: Uuid) -> Result<Delivery, ConversationError> {
        let guard = self.locks.acquire(id).await;
        let mut conversation = self.load(id).await?;

        if conversation.is_terminal() {
            return Err(ConversationError::ConversationTerminal {
                conversation_id: id,
                status: conversation.status,
            });
        }
        if !conversation.reply_pending {
            return Err(ConversationError::NoPendingReply(id));
        }

        let message = self.latest_turn(&conversation).await?;
        conversation.reply_pending = false;
        self.store
            .upsert_conversation(&conversation)
            .await
            .map_err(|e| self.store_failure(e))?;
        debug!(
            "Forwarding turn {} of conversation {id}: {} -> {}",
            message.turn_number, message.source, message.target
        );

        let reply = self.dispatch(&guard, conversation, &message).await?;
        Ok(Delivery { message, reply })
    }

    /// End a conversation. Ending one that is already terminal is a no-op.
    pub async fn end_conversation(
        &self,
        id: Uuid,
        reason: EndReason,
    ) -> Result<ConversationStatus, ConversationError> {
        let _guard = self.locks.acquire(id).await;
        let mut conversation = self.load(id).await?;

        if conversation.is_terminal() {
            debug!(
                "Conversation {id} already ended as {}",
                conversation.status
            );
            return Ok(conversation.status);
        }

        let transition = match reason {
            EndReason::Completed => Transition::Complete,
            EndReason::Failed(reason) => Transition::Fail(reason),
        };
        state::apply(&mut conversation, transition).map_err(|e| terminal(id, e))?;
        self.store
            .upsert_conversation(&conversation)
            .await
            .map_err(|e| self.store_failure(e))?;
        self.locks.retire(id, self.clock.now());

        info!(
            "Ended conversation {id} as {} after {} turn(s)",
            conversation.status, conversation.turn_count
        );
        Ok(conversation.status)
    }

    /// Consistent snapshot straight from the store; takes no lock.
    pub async fn get_conversation_state(&self, id: Uuid) -> Result<Conversation, ConversationError> {
        self.store
            .get_conversation(&id)
            .await
            .map_err(|e| self.store_failure(e))?
            .ok_or(ConversationError::ConversationNotFound(id))
    }

    /// A page of the conversation's history in turn order.
    pub async fn get_messages(
        &self,
        id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, ConversationError> {
        self.get_conversation_state(id).await?;
        self.store
            .get_messages(&id, limit, offset)
            .await
            .map_err(|e| self.store_failure(e))
    }

    /// Move every conversation idle for longer than `threshold` to `Timeout`.
    ///
    /// Candidates are re-checked under their lock, so a turn that lands
    /// while the pass is running keeps its conversation alive.
    pub async fn sweep_timeouts(
        &self,
        threshold: Duration,
    ) -> Result<SweepReport, ConversationError> {
        let cutoff = self.clock.now() - threshold;
        let filter = ConversationFilter::default()
            .with_status(ConversationStatus::Active)
            .idle_before(cutoff);
        let candidates = self
            .store
            .list_conversations(&filter)
            .await
            .map_err(|e| self.store_failure(e))?;

        let mut report = SweepReport {
            candidates: candidates.len(),
            ..SweepReport::default()
        };

        for candidate in candidates {
            let id = candidate.conversation_id;
            match self.expire(id, threshold).await {
                Ok(true) => report.timed_out += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!("Failed to expire conversation {id}: {e}");
                    report.failed += 1;
                }
            }
        }

        report.evicted_locks = self
            .locks
            .evict_idle(self.clock.now(), self.config.lock_grace);

        if report.timed_out > 0 || report.failed > 0 {
            info!(
                "Timeout sweep: {} candidate(s), {} timed out, {} skipped, {} failed",
                report.candidates, report.timed_out, report.skipped, report.failed
            );
        } else {
            debug!("Timeout sweep found nothing to expire");
        }
        Ok(report)
    }

    /// Summary statistics for conversations started in `range`.
    pub async fn get_analytics(
        &self,
        range: &TimeRange,
    ) -> Result<AnalyticsReport, ConversationError> {
        analytics::summarize(&self.store, range)
            .await
            .map_err(|e| self.store_failure(e))
    }

    async fn expire(&self, id: Uuid, threshold: Duration) -> Result<bool, ConversationError> {
        let _guard = self.locks.acquire(id).await;
        let Some(mut conversation) = self
            .store
            .get_conversation(&id)
            .await
            .map_err(|e| self.store_failure(e))?
        else {
            return Ok(false);
        };

        let now = self.clock.now();
        if conversation.is_terminal() || !conversation.is_idle(now, threshold) {
            debug!("Conversation {id} is no longer idle, skipping");
            return Ok(false);
        }

        let reason = format!("idle for more than {}s", threshold.num_seconds());
        state::apply(&mut conversation, Transition::Timeout(reason))
            .map_err(|e| terminal(id, e))?;
        self.store
            .upsert_conversation(&conversation)
            .await
            .map_err(|e| self.store_failure(e))?;
        self.locks.retire(id, now);

        info!(
            "Conversation {id} timed out after {} turn(s)",
            conversation.turn_count
        );
        Ok(true)
    }

    async fn load(&self, id: Uuid) -> Result<Conversation, ConversationError> {
        match self.store.get_conversation(&id).await {
            Ok(Some(conversation)) => {
                if conversation.is_terminal() {
                    self.locks.retire(id, self.clock.now());
                }
                Ok(conversation)
            }
            Ok(None) => {
                self.locks.retire(id, self.clock.now());
                Err(ConversationError::ConversationNotFound(id))
            }
            Err(e) => Err(self.store_failure(e)),
        }
    }

    async fn latest_turn(&self, conversation: &Conversation) -> Result<Message, ConversationError> {
        let id = conversation.conversation_id;
        let turn = conversation.turn_count;
        let offset = usize::try_from(turn.saturating_sub(1)).unwrap_or(usize::MAX);
        let latest = self
            .store
            .get_messages(&id, 1, offset)
            .await
            .map_err(|e| self.store_failure(e))?
            .into_iter()
            .next()
            .filter(|message| message.turn_number == turn);

        latest.ok_or_else(|| {
            self.store_failure(StoreError::Corrupt {
                conversation_id: id,
                message: format!("turn {turn} is missing from the log"),
            })
        })
    }

    async fn append(
        &self,
        message: &Message,
        conversation: &Conversation,
    ) -> Result<(), ConversationError> {
        self.store
            .append_message(message, conversation)
            .await
            .map_err(|e| self.store_failure(e))
    }

    /// Deliver `message` to its target and persist what comes back.
    async fn dispatch(
        &self,
        guard: &ConversationGuard,
        mut conversation: Conversation,
        message: &Message,
    ) -> Result<Option<Message>, ConversationError> {
        let id = conversation.conversation_id;
        debug_assert_eq!(guard.conversation_id(), id);

        let input = ProcessInput {
            conversation_id: id,
            turn_number: message.turn_number,
            source: message.source.clone(),
            context: conversation.context.clone(),
            payload: message.content.clone(),
        };
        let outcome = match self.modules.get(&message.target) {
            Some(module) => module.process(input).await,
            None => Err(anyhow::anyhow!(
                "module {} is not registered",
                message.target
            )),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                return Err(self
                    .fail_module(conversation, &message.target, format!("{e:#}"))
                    .await);
            }
        };

        let context_changed = result.context != conversation.context;
        conversation.context = result.context;

        let Some(payload) = result.payload else {
            if context_changed {
                self.store
                    .upsert_conversation(&conversation)
                    .await
                    .map_err(|e| self.store_failure(e))?;
            }
            debug!(
                "Module {} consumed turn {} of conversation {id} without replying",
                message.target, message.turn_number
            );
            return Ok(None);
        };

        let (turn, at) =
            state::accept_turn(&mut conversation, self.clock.now()).map_err(|e| terminal(id, e))?;
        conversation.reply_pending = true;
        let reply =
            MessageDraft::new(id, message.target.clone(), message.source.clone(), payload)
                .into_message(turn, at);
        self.append(&reply, &conversation).await?;
        debug!(
            "Accepted reply turn {turn} of conversation {id}: {} -> {}",
            reply.source, reply.target
        );
        Ok(Some(reply))
    }

    /// Record a module failure durably and build the error for the caller.
    async fn fail_module(
        &self,
        mut conversation: Conversation,
        module: &ModuleId,
        reason: String,
    ) -> ConversationError {
        let id = conversation.conversation_id;
        warn!("Module {module} failed in conversation {id}: {reason}");

        let transition = Transition::Fail(format!("module {module} failed: {reason}"));
        if let Err(e) = state::apply(&mut conversation, transition) {
            return terminal(id, e);
        }
        if let Err(e) = self.store.upsert_conversation(&conversation).await {
            return self.store_failure(e);
        }
        self.locks.retire(id, self.clock.now());

        ConversationError::ModuleUnavailable {
            conversation_id: id,
            module: module.clone(),
            reason,
        }
    }

    /// Map a store error for the caller.
    ///
    /// A turn-order violation means two writers got past the same lock,
    /// which is a bug in this crate; abort instead of returning.
    fn store_failure(&self, e: StoreError) -> ConversationError {
        if e.is_turn_order_violation() {
            error!("Conversation lock invariant broken: {e}");
            panic!("{e}");
        }
        warn!(
            "Store operation failed ({} lock(s) registered): {e}",
            self.locks.len()
        );
        ConversationError::StoreUnavailable(e)
    }
}

fn terminal(conversation_id: Uuid, e: StateError) -> ConversationError {
    ConversationError::ConversationTerminal {
        conversation_id,
        status: e.from,
    }
}

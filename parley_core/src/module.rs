use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Context, ModuleId};

/// What a module receives for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInput {
    pub conversation_id: Uuid,
    /// Turn number of the message being delivered
    pub turn_number: u64,
    /// Module that sent the message
    pub source: ModuleId,
    /// Context accumulated so far
    pub context: Context,
    pub payload: Value,
}

/// What a module hands back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResult {
    /// Replaces the conversation context
    pub context: Context,
    /// Reply sent back to the source as the next turn. `None` consumes the
    /// turn without answering.
    pub payload: Option<Value>,
}

impl ProcessResult {
    #[must_use]
    pub const fn reply(context: Context, payload: Value) -> Self {
        Self {
            context,
            payload: Some(payload),
        }
    }

    #[must_use]
    pub const fn silent(context: Context) -> Self {
        Self {
            context,
            payload: None,
        }
    }
}

/// A unit the manager can route messages to.
///
/// The call may block for as long as the module needs. The manager holds
/// the conversation's lock for the duration and never retries.
#[async_trait]
pub trait ParticipantModule: Send + Sync {
    async fn process(&self, input: ProcessInput) -> anyhow::Result<ProcessResult>;
}

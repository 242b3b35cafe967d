use thiserror::Error;
use uuid::Uuid;

/// Errors returned by a [`ConversationStore`](crate::ConversationStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Still failing after the store's own retries.
    #[error("store unavailable after {attempts} attempt(s): {message}")]
    Unavailable { attempts: u32, message: String },

    /// A non-transient backend error.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A row that could not be decoded back into the domain model.
    #[error("corrupt record for conversation {conversation_id}: {message}")]
    Corrupt {
        conversation_id: Uuid,
        message: String,
    },

    #[error("conversation not found in store: {0}")]
    NotFound(Uuid),

    /// The message does not continue the stored turn sequence.
    #[error(
        "turn order violation in conversation {conversation_id}: expected turn {expected}, got {found}"
    )]
    TurnOrderViolation {
        conversation_id: Uuid,
        expected: u64,
        found: u64,
    },
}

impl StoreError {
    #[must_use]
    pub const fn is_turn_order_violation(&self) -> bool {
        matches!(self, Self::TurnOrderViolation { .. })
    }
}

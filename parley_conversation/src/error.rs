use parley_core::{ConversationStatus, ModuleId, StoreError};
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the conversation manager.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("conversation not found: {0}")]
    ConversationNotFound(Uuid),

    #[error("conversation {conversation_id} is {status} and accepts no further changes")]
    ConversationTerminal {
        conversation_id: Uuid,
        status: ConversationStatus,
    },

    #[error("module {module} is not a participant of conversation {conversation_id}")]
    InvalidParticipant {
        conversation_id: Uuid,
        module: ModuleId,
    },

    #[error("conversation {0} has no undelivered reply")]
    NoPendingReply(Uuid),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The target module failed; the conversation is now `Failed`.
    #[error("module {module} unavailable in conversation {conversation_id}: {reason}")]
    ModuleUnavailable {
        conversation_id: Uuid,
        module: ModuleId,
        reason: String,
    },

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl ConversationError {
    /// Expected outcomes that leave no trace in the store.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::ConversationNotFound(_)
                | Self::ConversationTerminal { .. }
                | Self::InvalidParticipant { .. }
                | Self::NoPendingReply(_)
                | Self::InvalidRequest(_)
        )
    }
}

//! Conversation lifecycle.
//!
//! ```text
//!            accept
//!           ┌──────┐
//!           ▼      │
//!         ACTIVE ──┘
//!        /   |   \
//! complete  fail  timeout
//!      ▼     ▼      ▼
//! COMPLETED FAILED TIMEOUT
//! ```
//!
//! All three right-hand states are terminal. Stores never look at the
//! status; this module is the only place that changes it.

use chrono::{DateTime, Utc};
use parley_core::{Conversation, ConversationStatus};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A message was accepted at the given instant.
    Accept(DateTime<Utc>),
    /// Explicit successful end.
    Complete,
    /// Explicit failure or unrecoverable routing error.
    Fail(String),
    /// Idle past the threshold; only the sweep issues this.
    Timeout(String),
}

impl Transition {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Accept(_) => "accept",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Timeout(_) => "timeout",
        }
    }

    #[must_use]
    pub const fn target(&self) -> ConversationStatus {
        match self {
            Self::Accept(_) => ConversationStatus::Active,
            Self::Complete => ConversationStatus::Completed,
            Self::Fail(_) => ConversationStatus::Failed,
            Self::Timeout(_) => ConversationStatus::Timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {transition} a conversation in status {from}")]
pub struct StateError {
    pub from: ConversationStatus,
    pub transition: &'static str,
}

/// Apply `transition` to `conversation` in place.
///
/// On error the conversation is left untouched.
pub fn apply(conversation: &mut Conversation, transition: Transition) -> Result<(), StateError> {
    if conversation.status.is_terminal() {
        return Err(StateError {
            from: conversation.status,
            transition: transition.name(),
        });
    }

    conversation.status = transition.target();
    match transition {
        Transition::Accept(at) => {
            conversation.turn_count += 1;
            conversation.last_activity = at.max(conversation.last_activity);
            conversation.reply_pending = false;
        }
        Transition::Complete => {}
        Transition::Fail(reason) | Transition::Timeout(reason) => {
            conversation.status_reason = Some(reason);
        }
    }
    Ok(())
}

/// Accept one turn and return its number and timestamp.
///
/// The timestamp never goes backwards within a conversation, even if the
/// clock does.
pub fn accept_turn(
    conversation: &mut Conversation,
    at: DateTime<Utc>,
) -> Result<(u64, DateTime<Utc>), StateError> {
    apply(conversation, Transition::Accept(at))?;
    Ok((conversation.turn_count, conversation.last_activity))
}

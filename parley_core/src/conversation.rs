use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::Context;

/// Identifier of a participant module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Completed,
    Timeout,
    Failed,
}

impl ConversationStatus {
    pub const ALL: [Self; 4] = [Self::Active, Self::Completed, Self::Timeout, Self::Failed];

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Timeout => "timeout",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown conversation status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for ConversationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "timeout" => Ok(Self::Timeout),
            "failed" => Ok(Self::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A bounded, ordered exchange between a fixed set of modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: Uuid,
    /// Module that opened the conversation
    pub initiator: ModuleId,
    /// Modules allowed to send and receive; always contains the initiator
    pub participants: BTreeSet<ModuleId>,
    pub status: ConversationStatus,
    /// Number of accepted messages; equals the last persisted turn number
    pub turn_count: u64,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Context returned by the most recent module reply
    pub context: Context,
    /// The latest turn is a module reply its target has not received yet
    #[serde(default)]
    pub reply_pending: bool,
    /// Why the conversation reached its terminal status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
}

impl Conversation {
    /// A fresh, active conversation with no accepted turns.
    #[must_use]
    pub fn new(
        initiator: ModuleId,
        participants: BTreeSet<ModuleId>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut participants = participants;
        participants.insert(initiator.clone());
        Self {
            conversation_id: Uuid::now_v7(),
            initiator,
            participants,
            status: ConversationStatus::Active,
            turn_count: 0,
            started_at,
            last_activity: started_at,
            context: Context::new(),
            reply_pending: false,
            status_reason: None,
        }
    }

    #[must_use]
    pub fn is_participant(&self, module: &ModuleId) -> bool {
        self.participants.contains(module)
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Seconds between start and last activity.
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        let millis = (self.last_activity - self.started_at).num_milliseconds();
        #[allow(clippy::cast_precision_loss)]
        let seconds = millis as f64 / 1000.0;
        seconds
    }

    /// Whether the conversation has been idle for longer than `threshold` at `now`.
    #[must_use]
    pub fn is_idle(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now - self.last_activity > threshold
    }
}

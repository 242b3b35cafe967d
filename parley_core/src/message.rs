use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ModuleId;

/// One accepted turn of a conversation. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub turn_number: u64,
    pub source: ModuleId,
    pub target: ModuleId,
    /// Opaque payload
    pub content: Value,
    pub timestamp: DateTime<Utc>,
}

/// A message as submitted by a caller, before the manager assigns its turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub conversation_id: Uuid,
    pub source: ModuleId,
    pub target: ModuleId,
    pub content: Value,
}

impl MessageDraft {
    #[must_use]
    pub fn new(
        conversation_id: Uuid,
        source: impl Into<ModuleId>,
        target: impl Into<ModuleId>,
        content: Value,
    ) -> Self {
        Self {
            conversation_id,
            source: source.into(),
            target: target.into(),
            content,
        }
    }

    /// Seal the draft as turn `turn_number`.
    #[must_use]
    pub fn into_message(self, turn_number: u64, timestamp: DateTime<Utc>) -> Message {
        Message {
            message_id: Uuid::now_v7(),
            conversation_id: self.conversation_id,
            turn_number,
            source: self.source,
            target: self.target,
            content: self.content,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn draft_keeps_routing_fields() {
        let conv = Uuid::now_v7();
        let now = Utc::now();
        let msg = MessageDraft::new(conv, "ModuleB", "ModuleA", json!({"reply": "hi"}))
            .into_message(2, now);

        assert_eq!(msg.conversation_id, conv);
        assert_eq!(msg.turn_number, 2);
        assert_eq!(msg.source, ModuleId::from("ModuleB"));
        assert_eq!(msg.target, ModuleId::from("ModuleA"));
        assert_eq!(msg.content["reply"], "hi");
        assert_eq!(msg.timestamp, now);
    }
}

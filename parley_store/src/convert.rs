use parley_core::{Context, Conversation, Message, ModuleId, StoreError};
use parley_entities::{conversation_messages, conversations};
use sea_orm::Set;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Largest value the SQL side can hold for a count or turn number.
const SQL_MAX: u64 = i64::MAX.unsigned_abs();

fn corrupt(conversation_id: Uuid, message: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        conversation_id,
        message: message.into(),
    }
}

fn to_sql_count(n: u64, conversation_id: Uuid) -> Result<i64, StoreError> {
    i64::try_from(n).map_err(|_| corrupt(conversation_id, format!("count {n} out of range")))
}

fn from_sql_count(n: i64, conversation_id: Uuid) -> Result<u64, StoreError> {
    u64::try_from(n).map_err(|_| corrupt(conversation_id, format!("negative count {n}")))
}

/// Clamp a page bound to what SQL `LIMIT`/`OFFSET` accept.
pub fn page_bound(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(SQL_MAX).min(SQL_MAX)
}

/// The JSON fragment a module id appears as inside the `participants` column.
pub fn participant_needle(module: &ModuleId) -> String {
    serde_json::Value::String(module.to_string()).to_string()
}

pub fn conversation_from_model(m: conversations::Model) -> Result<Conversation, StoreError> {
    let id = m.conversation_id;
    let participants: BTreeSet<ModuleId> = serde_json::from_str(&m.participants)
        .map_err(|e| corrupt(id, format!("participants: {e}")))?;
    let status = m
        .status
        .parse()
        .map_err(|e| corrupt(id, format!("{e}")))?;
    let context =
        Context::from_json(&m.context).map_err(|e| corrupt(id, format!("context: {e}")))?;

    Ok(Conversation {
        conversation_id: id,
        initiator: ModuleId::from(m.initiator),
        participants,
        status,
        turn_count: from_sql_count(m.turn_count, id)?,
        started_at: m.started_at.and_utc(),
        last_activity: m.last_activity.and_utc(),
        context,
        reply_pending: m.reply_pending,
        status_reason: m.status_reason,
    })
}

pub fn conversation_to_active(c: &Conversation) -> Result<conversations::ActiveModel, StoreError> {
    let id = c.conversation_id;
    let participants = serde_json::to_string(&c.participants)
        .map_err(|e| corrupt(id, format!("participants: {e}")))?;
    let context = c
        .context
        .to_json()
        .map_err(|e| corrupt(id, format!("context: {e}")))?;

    Ok(conversations::ActiveModel {
        conversation_id: Set(id),
        initiator: Set(c.initiator.to_string()),
        participants: Set(participants),
        status: Set(c.status.as_str().to_string()),
        turn_count: Set(to_sql_count(c.turn_count, id)?),
        started_at: Set(c.started_at.naive_utc()),
        last_activity: Set(c.last_activity.naive_utc()),
        context: Set(context),
        reply_pending: Set(c.reply_pending),
        status_reason: Set(c.status_reason.clone()),
    })
}

pub fn message_from_model(m: conversation_messages::Model) -> Result<Message, StoreError> {
    let id = m.conversation_id;
    let content =
        serde_json::from_str(&m.content).map_err(|e| corrupt(id, format!("content: {e}")))?;

    Ok(Message {
        message_id: m.message_id,
        conversation_id: id,
        turn_number: from_sql_count(m.turn_number, id)?,
        source: ModuleId::from(m.source),
        target: ModuleId::from(m.target),
        content,
        timestamp: m.timestamp.and_utc(),
    })
}

pub fn message_to_active(m: &Message) -> Result<conversation_messages::ActiveModel, StoreError> {
    let id = m.conversation_id;
    Ok(conversation_messages::ActiveModel {
        message_id: Set(m.message_id),
        conversation_id: Set(id),
        turn_number: Set(to_sql_count(m.turn_number, id)?),
        source: Set(m.source.to_string()),
        target: Set(m.target.to_string()),
        content: Set(m.content.to_string()),
        timestamp: Set(m.timestamp.naive_utc()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn conversation_survives_model_conversion() {
        let mut conv = Conversation::new(
            ModuleId::from("a"),
            BTreeSet::from([ModuleId::from("b")]),
            Utc::now(),
        );
        conv.turn_count = 3;
        conv.context.insert("step", 2_i64);
        conv.reply_pending = true;

        let active = conversation_to_active(&conv).unwrap();
        let model = conversations::Model {
            conversation_id: active.conversation_id.unwrap(),
            initiator: active.initiator.unwrap(),
            participants: active.participants.unwrap(),
            status: active.status.unwrap(),
            turn_count: active.turn_count.unwrap(),
            started_at: active.started_at.unwrap(),
            last_activity: active.last_activity.unwrap(),
            context: active.context.unwrap(),
            reply_pending: active.reply_pending.unwrap(),
            status_reason: active.status_reason.unwrap(),
        };

        assert_eq!(conversation_from_model(model).unwrap(), conv);
    }

    #[test]
    fn bad_status_is_reported_as_corrupt() {
        let model = conversations::Model {
            conversation_id: Uuid::now_v7(),
            initiator: "a".to_string(),
            participants: r#"["a","b"]"#.to_string(),
            status: "paused".to_string(),
            turn_count: 1,
            started_at: Utc::now().naive_utc(),
            last_activity: Utc::now().naive_utc(),
            context: "{}".to_string(),
            reply_pending: false,
            status_reason: None,
        };

        assert!(matches!(
            conversation_from_model(model),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn message_content_is_json_text() {
        let msg = Message {
            message_id: Uuid::now_v7(),
            conversation_id: Uuid::now_v7(),
            turn_number: 1,
            source: ModuleId::from("a"),
            target: ModuleId::from("b"),
            content: json!({"task": "greet"}),
            timestamp: Utc::now(),
        };
        let active = message_to_active(&msg).unwrap();
        assert_eq!(active.content.unwrap(), r#"{"task":"greet"}"#);
    }

    #[test]
    fn needle_is_quoted() {
        assert_eq!(participant_needle(&ModuleId::from("ModuleA")), "\"ModuleA\"");
        assert_eq!(page_bound(usize::MAX), SQL_MAX);
    }
}

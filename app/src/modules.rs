//! Participant modules used by `parley demo`.

use async_trait::async_trait;
use parley_core::{ContextValue, ParticipantModule, ProcessInput, ProcessResult};
use serde_json::json;
use tracing::debug;

/// Replies to `{"count": n}` with `{"count": n + 1}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterModule;

#[async_trait]
impl ParticipantModule for CounterModule {
    async fn process(&self, input: ProcessInput) -> anyhow::Result<ProcessResult> {
        let count = input
            .payload
            .get("count")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| anyhow::anyhow!("expected an integer 'count' in {}", input.payload))?;
        let next = count + 1;
        debug!("Counter turn {}: {count} -> {next}", input.turn_number);

        let context = input.context.with("count", next);
        Ok(ProcessResult::reply(context, json!({ "count": next })))
    }
}

/// Records every count it sees without replying.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderModule;

#[async_trait]
impl ParticipantModule for RecorderModule {
    async fn process(&self, input: ProcessInput) -> anyhow::Result<ProcessResult> {
        let mut seen: Vec<ContextValue> = input
            .context
            .get("seen")
            .and_then(ContextValue::as_list)
            .map(<[ContextValue]>::to_vec)
            .unwrap_or_default();
        if let Some(count) = input.payload.get("count").and_then(serde_json::Value::as_i64) {
            seen.push(count.into());
        }

        let context = input.context.with("seen", ContextValue::List(seen));
        Ok(ProcessResult::silent(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{Context, ModuleId};
    use uuid::Uuid;

    fn input(payload: serde_json::Value, context: Context) -> ProcessInput {
        ProcessInput {
            conversation_id: Uuid::now_v7(),
            turn_number: 1,
            source: ModuleId::from("recorder"),
            context,
            payload,
        }
    }

    #[tokio::test]
    async fn counter_increments() {
        let result = CounterModule
            .process(input(json!({"count": 4}), Context::new()))
            .await
            .unwrap();
        assert_eq!(result.payload, Some(json!({"count": 5})));
        assert_eq!(result.context.get("count").and_then(ContextValue::as_integer), Some(5));
    }

    #[tokio::test]
    async fn counter_rejects_missing_count() {
        assert!(CounterModule
            .process(input(json!({"n": 1}), Context::new()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn recorder_appends_silently() {
        let context = Context::new().with("seen", vec![1_i64]);
        let result = RecorderModule
            .process(input(json!({"count": 2}), context))
            .await
            .unwrap();
        assert!(result.payload.is_none());
        let seen = result.context.get("seen").and_then(ContextValue::as_list).unwrap();
        assert_eq!(seen, &[ContextValue::Integer(1), ContextValue::Integer(2)]);
    }
}

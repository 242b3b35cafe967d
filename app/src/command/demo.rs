use parley_config::Config;
use parley_conversation::{EndReason, ModuleRegistry, NewConversation};
use parley_core::MessageDraft;
use parley_store::SqlStore;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::{build_manager, open_store};
use crate::modules::{CounterModule, RecorderModule};

#[derive(Debug, Clone)]
pub struct DemoInput {
    pub turns: u32,
    /// Use a throwaway in-memory store instead of the configured one
    pub in_memory: bool,
}

/// Strategy for running a counter conversation between two demo modules.
#[derive(Debug, Clone, Copy)]
pub struct DemoStrategy;

impl super::CommandStrategy for DemoStrategy {
    type Input = DemoInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let (config, store) = if input.in_memory {
            (Config::default(), SqlStore::in_memory().await?)
        } else {
            let config = Config::load()?;
            let store = open_store(&config).await?;
            (config, store)
        };

        let mut modules = ModuleRegistry::new();
        modules.register("counter", Arc::new(CounterModule));
        modules.register("recorder", Arc::new(RecorderModule));
        let manager = build_manager(&config, store, modules)?;

        let opened = manager
            .create_conversation(NewConversation::new("recorder", "counter", json!({"count": 0})))
            .await?;
        let id = opened.conversation_id;
        info!("Demo conversation {id} opened");

        let mut pending = opened.reply.is_some();
        let mut exchanges = 1;
        while pending {
            // Hand the counter's answer to the recorder.
            let answer = manager.forward_reply(id).await?.message;
            if exchanges >= input.turns {
                break;
            }
            let delivery = manager
                .route_message(MessageDraft::new(id, "recorder", "counter", answer.content))
                .await?;
            pending = delivery.reply.is_some();
            exchanges += 1;
        }

        let status = manager.end_conversation(id, EndReason::Completed).await?;
        let conversation = manager.get_conversation_state(id).await?;
        let messages = manager
            .get_messages(id, usize::try_from(conversation.turn_count)?, 0)
            .await?;

        println!("Conversation {id} ({status}, {} turns)", conversation.turn_count);
        for message in &messages {
            println!(
                "#{:<4} {} -> {}: {}",
                message.turn_number, message.source, message.target, message.content
            );
        }
        println!("Context: {}", conversation.context.to_json()?);
        Ok(())
    }
}

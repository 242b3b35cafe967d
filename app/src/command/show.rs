use parley_config::Config;
use parley_conversation::ModuleRegistry;
use uuid::Uuid;

use super::{build_manager, open_store};

#[derive(Debug, Clone)]
pub struct ShowInput {
    pub id: Uuid,
    pub limit: usize,
    pub offset: usize,
}

/// Strategy for printing one conversation with a page of its history.
#[derive(Debug, Clone, Copy)]
pub struct ShowStrategy;

impl super::CommandStrategy for ShowStrategy {
    type Input = ShowInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load()?;
        let store = open_store(&config).await?;
        let manager = build_manager(&config, store, ModuleRegistry::new())?;

        let conversation = manager.get_conversation_state(input.id).await?;
        let messages = manager
            .get_messages(input.id, input.limit, input.offset)
            .await?;

        println!("Conversation {}", conversation.conversation_id);
        println!("  Status: {}", conversation.status);
        if let Some(reason) = &conversation.status_reason {
            println!("  Reason: {reason}");
        }
        println!("  Initiator: {}", conversation.initiator);
        let participants: Vec<&str> = conversation
            .participants
            .iter()
            .map(parley_core::ModuleId::as_str)
            .collect();
        println!("  Participants: {}", participants.join(", "));
        println!("  Turns: {}", conversation.turn_count);
        println!("  Started: {}", conversation.started_at.to_rfc3339());
        println!("  Last Activity: {}", conversation.last_activity.to_rfc3339());
        if !conversation.context.is_empty() {
            println!("  Context: {}", conversation.context.to_json()?);
        }
        println!();

        for message in &messages {
            println!(
                "#{:<4} {} {} -> {}: {}",
                message.turn_number,
                message.timestamp.format("%Y-%m-%d %H:%M:%S"),
                message.source,
                message.target,
                message.content
            );
        }
        if messages.is_empty() {
            println!("(no messages in range)");
        }

        Ok(())
    }
}

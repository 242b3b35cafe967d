//! sea-orm entities for the conversation log.

pub mod conversation_messages;
pub mod conversations;

#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Shared vocabulary for the parley orchestration engine.
//!
//! Everything that more than one crate needs lives here: the conversation
//! and message model, the typed context carried across turns, the
//! participant module contract and the persistent store contract.

pub mod clock;
pub mod context;
pub mod conversation;
pub mod error;
pub mod message;
pub mod module;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{Context, ContextValue};
pub use conversation::{Conversation, ConversationStatus, ModuleId, ParseStatusError};
pub use error::StoreError;
pub use message::{Message, MessageDraft};
pub use module::{ParticipantModule, ProcessInput, ProcessResult};
pub use store::{ConversationFilter, ConversationStore, TimeRange};

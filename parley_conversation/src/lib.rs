#![warn(
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

//! Conversation orchestration between participant modules.
//!
//! The [`ConversationManager`] owns the lifecycle of every conversation:
//! it opens them, routes each turn to the target module and persists the
//! reply, ends them on request and times out the ones that go quiet.
//!
//! # Key Features
//! - Strict turn order per conversation, with no global lock
//! - Messages are durable before any module sees them
//! - Module failures end the conversation as `Failed` instead of leaving it hanging
//! - Background timeout sweep with graceful shutdown
//! - Analytics over any [`parley_core::ConversationStore`]

pub mod analytics;
pub mod error;
pub mod locks;
pub mod manager;
pub mod registry;
pub mod state;
pub mod sweeper;

pub use analytics::{AnalyticsAggregator, AnalyticsReport, ModuleActivity};
pub use error::ConversationError;
pub use locks::{ConversationGuard, LockRegistry};
pub use manager::{
    ConversationManager, ConversationOpened, Delivery, EndReason, ManagerConfig, NewConversation,
    SweepReport,
};
pub use registry::ModuleRegistry;
pub use state::{StateError, Transition};
pub use sweeper::{SweeperConfig, SweeperStats};

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

//! Conversation store backends.
//!
//! - [`SqlStore`]: sea-orm, SQLite by default
//! - [`InMemoryStore`]: process-local, for tests and demos
//!
//! Both implement [`parley_core::ConversationStore`] and pass the same
//! contract suite in `tests/store_contract.rs`.

mod convert;
mod memory;
mod retry;
mod sql;

pub use memory::InMemoryStore;
pub use retry::{RetryError, RetryPolicy};
pub use sql::SqlStore;

#![warn(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(clippy::missing_errors_doc)]

mod schema;

pub use schema::{Config, DatabaseConfig, ManagerSettings, StoreSettings};

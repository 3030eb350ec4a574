//! SQLite backend for the beads storage layer.

mod comments;
mod config;
mod dependencies;
mod import;
mod issues;
mod labels;
mod queries;
mod schema;
mod store;
mod transaction;

pub use store::SqliteStore;

pub(crate) use schema::DEFAULT_CONFIG;

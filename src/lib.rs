//! Shoplist server library.
//!
//! A small self-hosted backend for the shopping list: records in SQLite
//! behind a REST API, a WebSocket change feed per collection, and image
//! storage on disk.

pub mod config;
pub mod db;
pub mod server;

pub use config::{ConfigError, ConfigFile, ServerConfig};
pub use db::{init_db, SqliteStore};
pub use server::{router, AppState};

//! Data layer module
//!
//! Rows for profiles, comics, avatars and unlocked styles, persisted in SQLite.

mod database;
mod models;

pub use database::Database;
pub use models::*;

//! Reflex storage crate - SQLite persistence and an in-memory equivalent.
//!
//! Provides a WAL-mode SQLite database with migrations and two
//! implementations of the engine's storage collaborators: [`SqliteStore`]
//! for production and [`MemoryStore`] for tests.

pub mod db;
pub mod memory;
pub mod migrations;
pub mod store;

pub use db::Database;
pub use memory::MemoryStore;
pub use store::SqliteStore;

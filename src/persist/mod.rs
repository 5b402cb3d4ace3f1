//! Durable record stores.

/// SQLite implementation of [`crate::store::RecordStore`].
pub mod sqlite;

pub use sqlite::SqliteRecordStore;

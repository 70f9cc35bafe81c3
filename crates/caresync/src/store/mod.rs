//! Durable local storage.
//!
//! SQLite-backed keyed tables with JSON payloads. This is the leaf of the
//! consistency core: everything above it (offline writes, sync, stats) goes
//! through [`LocalStore`].

mod db;
mod error;
mod models;
mod repository;

pub use db::Database;
pub use error::{StorageError, StorageResult};
pub use models::{LocalRecord, NewRecord, Order, QueryOptions, RecordPatch, Table};
pub use repository::LocalStore;

//! Offline write service.
//!
//! Write-then-mark-unsynced semantics over the local store, read-back
//! queries, and the TTL'd knowledge cache.

mod models;
mod service;

pub use models::{
    MessageRole, NewAuditEntry, NewConversation, NewMessage, NewNotification, NewToolResult,
    StorageStats, UnsyncedSnapshot,
};
pub use service::OfflineWriteService;

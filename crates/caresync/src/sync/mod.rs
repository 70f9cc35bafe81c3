//! Background synchronization.

mod connectivity;
mod coordinator;

pub use connectivity::ConnectivityMonitor;
pub use coordinator::{SyncConfig, SyncCoordinator, SyncStatus};

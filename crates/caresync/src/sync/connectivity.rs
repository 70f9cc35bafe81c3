//! Connectivity signal shared between the host and the coordinator.

use tokio::sync::watch;
use tracing::info;

/// Process-wide online/offline signal.
///
/// The host application owns connectivity detection and reports transitions
/// here; the coordinator observes them through [`subscribe`].
///
/// [`subscribe`]: ConnectivityMonitor::subscribe
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Create a monitor with an initial state.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self { tx }
    }

    /// Report a connectivity change. Repeated reports of the same state are
    /// dropped so observers only see transitions.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(
                "connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
        }
    }

    /// Current state.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Observe connectivity transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

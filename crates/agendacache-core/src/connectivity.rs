//! Device connectivity signal.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::api::Backend;

/// Shared "is the backend reachable" flag.
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(reachable: bool) -> Self {
        let (tx, _rx) = watch::channel(reachable);
        Self { tx: Arc::new(tx) }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn is_reachable(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn set_reachable(&self, reachable: bool) {
        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != reachable;
            *current = reachable;
            changed
        });
        if changed {
            info!(reachable, "Connectivity changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Probe the backend and record the result.
    pub async fn probe(&self, backend: &dyn Backend) -> bool {
        let reachable = match backend.health().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Backend health probe failed");
                false
            }
        };
        self.set_reachable(reachable);
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_changes_only() {
        let connectivity = Connectivity::online();
        let mut rx = connectivity.subscribe();

        connectivity.set_reachable(true);
        assert!(!rx.has_changed().unwrap());

        connectivity.set_reachable(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
        assert!(!connectivity.is_reachable());
    }
}

//! Screen data loading: cache first, then live data, falling back to the
//! cache when the live fetch fails.
//!
//! Every screen follows the same sequence:
//! 1. `mount()` publishes whatever the cache holds
//! 2. if the backend is reachable, all live queries run concurrently
//! 3. on success the results are joined with the viewer's annotations,
//!    published, and written through to the cache
//! 4. on failure the cached snapshot is re-read and kept on screen
//!
//! `refresh()` repeats steps 2-4.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::api::{ApiError, Backend, ErrorKind};
use crate::auth::SessionContext;
use crate::cache::CacheManager;
use crate::connectivity::Connectivity;

pub mod agenda;
pub mod home;
pub mod profile;
pub mod refresh;

pub use agenda::AgendaScreen;
pub use home::{HomeScreen, HomeState};
pub use profile::{LiveFeed, ProfileScreen, PROFILE_FEED_INTERVAL};
pub use refresh::RefreshTask;

/// Where the data currently on screen came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Cache only; no live fetch has finished yet.
    Cache,
    /// Fresh from the backend.
    Network,
    /// Live fetch failed; showing the last cached snapshot.
    Fallback(ErrorKind),
    /// Backend unreachable; no fetch attempted.
    Offline,
}

impl DataSource {
    pub fn is_live(&self) -> bool {
        matches!(self, DataSource::Network)
    }
}

/// Liveness flag for one screen instance.
///
/// Clones share the flag. After `unmount()` in-flight loads still finish but
/// their results are not committed to the screen.
#[derive(Debug, Clone)]
pub struct ScreenScope {
    mounted: Arc<AtomicBool>,
}

impl Default for ScreenScope {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenScope {
    pub fn new() -> Self {
        Self {
            mounted: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::Release);
    }
}

/// Services every screen shares.
#[derive(Clone)]
pub struct SyncContext {
    pub cache: Arc<CacheManager>,
    pub backend: Arc<dyn Backend>,
    pub session: SessionContext,
    pub connectivity: Connectivity,
}

pub(crate) enum Live<T> {
    Fresh(T),
    Skipped,
    Failed(ErrorKind),
}

impl SyncContext {
    pub fn new(
        cache: Arc<CacheManager>,
        backend: Arc<dyn Backend>,
        session: SessionContext,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            cache,
            backend,
            session,
            connectivity,
        }
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Current user id; a missing session is an authorization failure.
    pub(crate) fn viewer_id(&self) -> Result<String, ApiError> {
        self.session.user_id().ok_or(ApiError::Unauthorized)
    }

    /// Log a failed fetch; authorization failures also end the session.
    pub(crate) fn report_failure(&self, screen: &str, error: &ApiError) -> ErrorKind {
        let kind = error.kind();
        match kind {
            ErrorKind::Authorization => {
                warn!(screen, error = %error, "Live fetch unauthorized, using cache");
                self.session.expire();
            }
            ErrorKind::Transient => {
                debug!(screen, error = %error, "Live fetch failed, using cache");
            }
            ErrorKind::Constraint | ErrorKind::Unknown => {
                warn!(screen, error = %error, "Live fetch failed, using cache");
            }
        }
        kind
    }

    /// Run a live fetch when the backend is reachable.
    pub(crate) async fn fetch_live<T, Fut>(&self, screen: &str, fetch: Fut) -> Live<T>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if !self.connectivity.is_reachable() {
            debug!(screen, "Offline, skipping live fetch");
            return Live::Skipped;
        }
        match fetch.await {
            Ok(data) => Live::Fresh(data),
            Err(e) => Live::Failed(self.report_failure(screen, &e)),
        }
    }
}

/// Log a failed cache write without failing the sync.
pub(crate) fn log_cache_write(what: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!(error = %e, "Failed to cache {}", what);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_clones_share_liveness() {
        let scope = ScreenScope::new();
        let held_by_task = scope.clone();
        assert!(held_by_task.is_mounted());

        scope.unmount();
        assert!(!held_by_task.is_mounted());
    }
}

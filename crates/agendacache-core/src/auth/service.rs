use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::{CredentialStore, Session, SessionContext, SessionData};
use crate::api::{ApiError, Backend};
use crate::cache::CacheManager;

/// Sign-in, sign-up, session restore and sign-out.
///
/// Keeps the on-disk session, the keychain and the shared `SessionContext`
/// in step.
pub struct AuthService {
    backend: Arc<dyn Backend>,
    context: SessionContext,
    store: Session,
    use_keychain: bool,
}

impl AuthService {
    pub fn new(backend: Arc<dyn Backend>, context: SessionContext, session_dir: PathBuf) -> Self {
        Self {
            backend,
            context,
            store: Session::new(session_dir),
            use_keychain: true,
        }
    }

    /// Keep the refresh token in the session file instead of the keychain.
    pub fn without_keychain(mut self) -> Self {
        self.use_keychain = false;
        self
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Restore the last session from disk, refreshing it when it is close to
    /// expiry. Returns whether a usable session is now active.
    pub async fn restore(&mut self) -> bool {
        match self.store.load() {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(error = %e, "Failed to load session, ignoring it");
                return false;
            }
        }

        let Some(data) = self.store.data.clone() else {
            return false;
        };

        if !data.needs_refresh() {
            debug!(minutes_left = data.minutes_until_expiry(), "Restored session");
            self.context.sign_in(data);
            return true;
        }

        let refresh_token = if !data.refresh_token.is_empty() {
            Some(data.refresh_token.clone())
        } else if self.use_keychain {
            match CredentialStore::get_refresh_token(&data.email) {
                Ok(token) => Some(token),
                Err(e) => {
                    debug!(error = %e, "No refresh token in keychain");
                    None
                }
            }
        } else {
            None
        };

        let Some(refresh_token) = refresh_token else {
            info!("Stored session expired and cannot be refreshed");
            return false;
        };

        match self.backend.refresh_session(&refresh_token).await {
            Ok(mut fresh) => {
                if fresh.email.is_empty() {
                    fresh.email = data.email;
                }
                self.remember(fresh);
                true
            }
            Err(e) => {
                warn!(error = %e, "Session refresh failed");
                false
            }
        }
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<SessionData, ApiError> {
        let data = self.backend.sign_in(email, password).await?;
        self.remember(data.clone());
        Ok(data)
    }

    /// Returns whether the new account is signed in right away.
    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<bool, ApiError> {
        match self.backend.sign_up(email, password, username).await? {
            Some(data) => {
                self.remember(data);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// End the session everywhere and wipe the offline cache.
    pub async fn sign_out(&mut self, cache: &CacheManager) -> Result<()> {
        if self.context.is_signed_in() {
            if let Err(e) = self.backend.sign_out().await {
                warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
            }
        }

        let email = self
            .context
            .session()
            .or_else(|| self.store.data.clone())
            .map(|d| d.email);

        self.context.sign_out();
        self.store.clear()?;

        if self.use_keychain {
            if let Some(email) = email.filter(|e| !e.is_empty()) {
                if let Err(e) = CredentialStore::delete(&email) {
                    debug!(error = %e, "No keychain entry to delete");
                }
            }
        }

        cache.clear()?;
        info!("Signed out");
        Ok(())
    }

    fn remember(&mut self, data: SessionData) {
        let mut persisted = data.clone();
        if self.use_keychain && !data.refresh_token.is_empty() {
            match CredentialStore::store_refresh_token(&data.email, &data.refresh_token) {
                Ok(()) => persisted.refresh_token.clear(),
                Err(e) => warn!(error = %e, "Keychain unavailable, keeping refresh token on disk"),
            }
        }

        self.store.update(persisted);
        if let Err(e) = self.store.save() {
            warn!(error = %e, "Failed to save session");
        }
        self.context.sign_in(data);
    }
}

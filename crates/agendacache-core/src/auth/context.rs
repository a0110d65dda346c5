use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use super::SessionData;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    SignedOut,
    SignedIn(SessionData),
}

/// The single shared view of who is signed in.
///
/// Cloned into every screen and into the REST client; subscribers are
/// notified on sign-in, sign-out and forced expiry.
#[derive(Clone)]
pub struct SessionContext {
    tx: Arc<watch::Sender<AuthState>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::SignedOut);
        Self { tx: Arc::new(tx) }
    }

    pub fn signed_in(data: SessionData) -> Self {
        let context = Self::new();
        context.sign_in(data);
        context
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    pub fn session(&self) -> Option<SessionData> {
        match &*self.tx.borrow() {
            AuthState::SignedIn(data) => Some(data.clone()),
            AuthState::SignedOut => None,
        }
    }

    pub fn user_id(&self) -> Option<String> {
        match &*self.tx.borrow() {
            AuthState::SignedIn(data) => Some(data.user_id.clone()),
            AuthState::SignedOut => None,
        }
    }

    pub fn access_token(&self) -> Option<String> {
        match &*self.tx.borrow() {
            AuthState::SignedIn(data) => Some(data.access_token.clone()),
            AuthState::SignedOut => None,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(*self.tx.borrow(), AuthState::SignedIn(_))
    }

    pub fn sign_in(&self, data: SessionData) {
        info!(user_id = %data.user_id, "Signed in");
        self.tx.send_replace(AuthState::SignedIn(data));
    }

    pub fn sign_out(&self) {
        self.tx.send_if_modified(|state| {
            let was_signed_in = matches!(state, AuthState::SignedIn(_));
            *state = AuthState::SignedOut;
            was_signed_in
        });
    }

    /// Called when the backend rejects the session.
    pub fn expire(&self) {
        if self.is_signed_in() {
            info!("Session rejected by backend, signing out");
        }
        self.sign_out();
    }
}

//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `SessionContext`: the shared, subscribable sign-in state
//! - `Session`: the last session persisted to disk
//! - `CredentialStore`: refresh tokens in the OS keychain via keyring
//! - `AuthService`: sign-in, sign-up, restore and sign-out

pub mod context;
pub mod credentials;
pub mod service;
pub mod session;

pub use context::{AuthState, SessionContext};
pub use credentials::CredentialStore;
pub use service::AuthService;
pub use session::{Session, SessionData};

//! agendacache-core - client core for shared agendas.
//!
//! Screens show cached data immediately, then replace it with live data
//! from the backend and write that through to the cache. When the live
//! fetch fails the cached snapshot stays on screen.
//!
//! - `cache`: key-value snapshots of backend data, per-agenda bundles
//! - `sync`: one orchestrator per screen (home, agenda, profile)
//! - `actions`: validated writes that patch the cache on success
//! - `api`: the `Backend` trait and its REST implementation
//! - `auth`: session state, persistence and keychain
//! - `config`, `connectivity`: ambient services the CLI wires up

pub mod actions;
pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod models;
pub mod sync;

pub use actions::{ActionError, Actions, ValidationError};
pub use api::{ApiError, Backend, ErrorKind, RestClient};
pub use auth::{AuthService, AuthState, SessionContext, SessionData};
pub use cache::CacheManager;
pub use config::Config;
pub use connectivity::Connectivity;
pub use sync::{AgendaScreen, DataSource, HomeScreen, ProfileScreen, SyncContext};

//! Local caching module for offline data access.
//!
//! This module provides the `CacheManager` for storing and retrieving
//! snapshots of backend data. Values are stored as JSON strings in a
//! `KeyValueStore`; every write bumps a global last-sync timestamp.
//!
//! Cached data types include:
//! - Agendas the viewer belongs to
//! - Urgent and completed elements for the viewer
//! - The viewer's profile and a list of known profiles
//! - Per-agenda bundles, timestamped and pruned after 24 hours

pub mod agenda;
pub mod keys;
pub mod manager;
pub mod store;

pub use agenda::{AgendaCacheEntry, AGENDA_CACHE_MAX_AGE_HOURS};
pub use keys::{CacheKey, ValueShape, LAST_SYNC_KEY};
pub use manager::{age_display, CacheManager};
pub use store::{FileStore, KeyValueStore, MemoryStore};

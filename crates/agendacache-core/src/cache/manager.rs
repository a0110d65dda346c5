use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::keys::{default_for, CacheKey, LAST_SYNC_KEY};
use super::store::{FileStore, KeyValueStore, MemoryStore};
use crate::models::{Agenda, ElementView, Profile};

/// Humanized age of a timestamp relative to `now`.
pub fn age_display(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - at).num_minutes();
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        let remaining_mins = minutes % 60;
        if remaining_mins >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        let remaining_hours = (minutes % 1440) / 60;
        if remaining_hours >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

/// Typed access to the offline cache.
///
/// Reads never fail: absent and corrupt entries both resolve to the key's
/// default (`[]`, `{}` or `None`). Every successful write bumps the global
/// last-sync timestamp.
pub struct CacheManager {
    store: Box<dyn KeyValueStore>,
    /// Serializes read-modify-write cycles on shared entries.
    rmw: Mutex<()>,
}

impl CacheManager {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            rmw: Mutex::new(()),
        }
    }

    /// Cache backed by JSON files under `cache_dir`.
    pub fn open(cache_dir: PathBuf) -> Result<Self> {
        Ok(Self::new(FileStore::new(cache_dir)?))
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub(crate) fn lock_rmw(&self) -> Result<MutexGuard<'_, ()>> {
        self.rmw
            .lock()
            .map_err(|e| anyhow!("Cache write lock poisoned: {}", e))
    }

    // ===== Raw access =====

    /// Deserialize a key, logging and swallowing any failure.
    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get_raw(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read cache entry");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Corrupt cache entry, using default");
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let contents = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize cache entry: {}", key))?;
        self.store.set_raw(key, &contents)?;
        self.touch_last_sync();
        debug!(key, bytes = contents.len(), "Cache entry written");
        Ok(())
    }

    /// Best-effort bookkeeping; a failure here does not fail the write.
    fn touch_last_sync(&self) {
        let result = serde_json::to_string(&Utc::now())
            .map_err(anyhow::Error::from)
            .and_then(|stamp| self.store.set_raw(LAST_SYNC_KEY, &stamp));
        if let Err(e) = result {
            warn!(error = %e, "Failed to update last sync timestamp");
        }
    }

    /// Raw JSON for any key string, or that key's default.
    pub fn get_value(&self, key: &str) -> Value {
        self.read(key).unwrap_or_else(|| default_for(key))
    }

    pub fn set_value(&self, key: &str, value: &Value) -> Result<()> {
        self.write(key, value)
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: CacheKey, value: &T) -> Result<()> {
        self.write(key.as_str(), value)
    }

    /// List-shaped keys: never `None`, empty when absent or corrupt.
    pub fn get_list<T: DeserializeOwned>(&self, key: CacheKey) -> Vec<T> {
        self.read(key.as_str()).unwrap_or_default()
    }

    pub fn get_scalar<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        self.read::<Option<T>>(key.as_str()).flatten()
    }

    pub(crate) fn get_map<T: DeserializeOwned>(
        &self,
        key: CacheKey,
    ) -> std::collections::BTreeMap<String, T> {
        self.read(key.as_str()).unwrap_or_default()
    }

    pub fn remove(&self, key: CacheKey) -> Result<()> {
        self.store.remove(key.as_str())
    }

    /// Remove every known key, including the last-sync timestamp.
    pub fn clear(&self) -> Result<()> {
        for key in CacheKey::ALL {
            self.store.remove(key.as_str())?;
        }
        self.store.remove(LAST_SYNC_KEY)?;
        debug!("Cache cleared");
        Ok(())
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.read(LAST_SYNC_KEY)
    }

    pub fn last_sync_display(&self) -> String {
        self.last_sync()
            .map(|at| age_display(at, Utc::now()))
            .unwrap_or_else(|| "never".to_string())
    }

    // ===== Agendas =====

    pub fn load_agendas(&self) -> Vec<Agenda> {
        self.get_list(CacheKey::Agendas)
    }

    pub fn save_agendas(&self, agendas: &[Agenda]) -> Result<()> {
        self.set(CacheKey::Agendas, agendas)
    }

    /// Drop one agenda from the cached list, keeping the rest.
    pub fn remove_cached_agenda(&self, agenda_id: &str) -> Result<()> {
        let _guard = self.lock_rmw()?;
        let mut agendas = self.load_agendas();
        let before = agendas.len();
        agendas.retain(|a| a.id != agenda_id);
        if agendas.len() != before {
            self.save_agendas(&agendas)?;
        }
        Ok(())
    }

    /// Insert or replace one agenda in the cached list.
    pub fn upsert_cached_agenda(&self, agenda: &Agenda) -> Result<()> {
        let _guard = self.lock_rmw()?;
        let mut agendas = self.load_agendas();
        match agendas.iter_mut().find(|a| a.id == agenda.id) {
            Some(existing) => *existing = agenda.clone(),
            None => agendas.push(agenda.clone()),
        }
        self.save_agendas(&agendas)
    }

    // ===== Urgent / Completed elements =====

    pub fn load_urgent_elements(&self) -> Vec<ElementView> {
        self.get_list(CacheKey::UrgentElements)
    }

    pub fn save_urgent_elements(&self, elements: &[ElementView]) -> Result<()> {
        self.set(CacheKey::UrgentElements, elements)
    }

    pub fn load_completed_elements(&self) -> Vec<ElementView> {
        self.get_list(CacheKey::CompletedElements)
    }

    pub fn save_completed_elements(&self, elements: &[ElementView]) -> Result<()> {
        self.set(CacheKey::CompletedElements, elements)
    }

    // ===== Profiles =====

    pub fn load_user_profile(&self) -> Option<Profile> {
        self.get_scalar(CacheKey::UserProfile)
    }

    pub fn save_user_profile(&self, profile: &Profile) -> Result<()> {
        self.set(CacheKey::UserProfile, profile)
    }

    pub fn load_user_profiles(&self) -> Vec<Profile> {
        self.get_list(CacheKey::UserProfiles)
    }

    pub fn save_user_profiles(&self, profiles: &[Profile]) -> Result<()> {
        self.set(CacheKey::UserProfiles, profiles)
    }

    pub fn find_cached_profile(&self, user_id: &str) -> Option<Profile> {
        self.load_user_profiles().into_iter().find(|p| p.id == user_id)
    }

    /// Merge profiles into the cached list by id.
    pub fn upsert_user_profiles(&self, profiles: &[Profile]) -> Result<()> {
        let _guard = self.lock_rmw()?;
        let mut cached = self.load_user_profiles();
        for profile in profiles {
            match cached.iter_mut().find(|p| p.id == profile.id) {
                Some(existing) => *existing = profile.clone(),
                None => cached.push(profile.clone()),
            }
        }
        self.save_user_profiles(&cached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn profile(id: &str, name: &str) -> Profile {
        Profile {
            id: id.to_string(),
            username: name.to_string(),
            avatar_url: None,
            bio: None,
            credits: None,
        }
    }

    #[test]
    fn test_age_display() {
        let now = Utc::now();
        assert_eq!(age_display(now, now), "just now");
        assert_eq!(age_display(now + Duration::minutes(5), now), "just now");
        assert_eq!(age_display(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(age_display(now - Duration::minutes(90), now), "2h ago");
        assert_eq!(age_display(now - Duration::minutes(70), now), "1h ago");
        assert_eq!(age_display(now - Duration::hours(36), now), "2d ago");
        assert_eq!(age_display(now - Duration::hours(30), now), "1d ago");
    }

    #[test]
    fn test_list_keys_default_to_empty() {
        let cache = CacheManager::in_memory();
        assert!(cache.load_agendas().is_empty());
        assert!(cache.load_urgent_elements().is_empty());
        assert!(cache.load_completed_elements().is_empty());
        assert!(cache.load_user_profiles().is_empty());
        for key in ["agendas", "urgentElements", "completedElements", "userProfiles"] {
            assert_eq!(cache.get_value(key), json!([]));
        }
    }

    #[test]
    fn test_scalar_and_map_defaults() {
        let cache = CacheManager::in_memory();
        assert_eq!(cache.load_user_profile(), None);
        assert_eq!(cache.get_value("userProfile"), Value::Null);
        assert_eq!(cache.get_value("agendaData"), json!({}));
        assert_eq!(cache.get_value("unknownKey"), Value::Null);
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let cache = CacheManager::in_memory();
        let value = json!({"nested": [1, "two", {"three": null}], "flag": true});
        cache.set_value("anything", &value).unwrap();
        assert_eq!(cache.get_value("anything"), value);

        let list = json!([{"id": "a"}, {"id": "b"}]);
        cache.set_value("agendas", &list).unwrap();
        assert_eq!(cache.get_value("agendas"), list);
    }

    #[test]
    fn test_corrupt_entry_reads_as_default() {
        let store = MemoryStore::new();
        store.set_raw("agendas", "{not json").unwrap();
        store.set_raw("userProfile", "[[[").unwrap();
        store.set_raw("agendaData", "nope").unwrap();
        let cache = CacheManager::new(store);

        assert!(cache.load_agendas().is_empty());
        assert_eq!(cache.get_value("agendas"), json!([]));
        assert_eq!(cache.load_user_profile(), None);
        assert_eq!(cache.get_value("agendaData"), json!({}));
    }

    #[test]
    fn test_every_write_bumps_last_sync() {
        let cache = CacheManager::in_memory();
        assert_eq!(cache.last_sync(), None);
        assert_eq!(cache.last_sync_display(), "never");

        cache.set_value("unrelated", &json!(1)).unwrap();
        let first = cache.last_sync().expect("timestamp written");
        assert_eq!(cache.last_sync_display(), "just now");

        cache.save_user_profile(&profile("u1", "sam")).unwrap();
        let second = cache.last_sync().unwrap();
        assert!(second >= first);
    }

    #[test]
    fn test_clear_removes_known_keys() {
        let cache = CacheManager::in_memory();
        cache.save_user_profile(&profile("u1", "sam")).unwrap();
        cache.save_user_profiles(&[profile("u1", "sam")]).unwrap();

        cache.clear().unwrap();
        assert_eq!(cache.load_user_profile(), None);
        assert!(cache.load_user_profiles().is_empty());
        assert_eq!(cache.last_sync(), None);
    }

    #[test]
    fn test_upsert_user_profiles_merges_by_id() {
        let cache = CacheManager::in_memory();
        cache
            .save_user_profiles(&[profile("u1", "sam"), profile("u2", "alex")])
            .unwrap();
        cache
            .upsert_user_profiles(&[profile("u2", "alexis"), profile("u3", "kim")])
            .unwrap();

        let names: Vec<String> = cache
            .load_user_profiles()
            .into_iter()
            .map(|p| p.username)
            .collect();
        assert_eq!(names, vec!["sam", "alexis", "kim"]);
        assert_eq!(cache.find_cached_profile("u3").unwrap().username, "kim");
    }

    #[test]
    fn test_file_backed_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = CacheManager::open(dir.path().to_path_buf()).unwrap();
            cache.save_user_profile(&profile("u1", "sam")).unwrap();
        }
        let cache = CacheManager::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(cache.load_user_profile().unwrap().username, "sam");
    }
}

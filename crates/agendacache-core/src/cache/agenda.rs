//! Per-agenda bundles, cached under one map keyed by agenda id.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::keys::CacheKey;
use super::manager::CacheManager;
use crate::models::{sort_by_urgency, AgendaBundle, Annotation, ElementView};

/// Per-agenda entries older than this are dropped by a cleanup pass.
pub const AGENDA_CACHE_MAX_AGE_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgendaCacheEntry {
    pub data: AgendaBundle,
    pub timestamp: DateTime<Utc>,
}

impl AgendaCacheEntry {
    pub fn is_older_than(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        now - self.timestamp > max_age
    }
}

impl CacheManager {
    /// Entries that no longer deserialize are skipped and dropped on the
    /// next write.
    fn load_agenda_map(&self) -> BTreeMap<String, AgendaCacheEntry> {
        self.get_map::<Value>(CacheKey::AgendaData)
            .into_iter()
            .filter_map(|(id, raw)| match serde_json::from_value(raw) {
                Ok(entry) => Some((id, entry)),
                Err(e) => {
                    warn!(agenda_id = %id, error = %e, "Dropping corrupt agenda cache entry");
                    None
                }
            })
            .collect()
    }

    fn save_agenda_map(&self, map: &BTreeMap<String, AgendaCacheEntry>) -> Result<()> {
        self.set(CacheKey::AgendaData, map)
    }

    pub fn store_agenda_data(&self, agenda_id: &str, data: &AgendaBundle) -> Result<()> {
        self.store_agenda_data_at(agenda_id, data, Utc::now())
    }

    /// Same as `store_agenda_data` with an explicit timestamp.
    pub fn store_agenda_data_at(
        &self,
        agenda_id: &str,
        data: &AgendaBundle,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self.lock_rmw()?;
        let mut map = self.load_agenda_map();
        map.insert(
            agenda_id.to_string(),
            AgendaCacheEntry {
                data: data.clone(),
                timestamp,
            },
        );
        self.save_agenda_map(&map)
    }

    pub fn get_agenda_data(&self, agenda_id: &str) -> Option<AgendaBundle> {
        self.get_agenda_entry(agenda_id).map(|entry| entry.data)
    }

    pub fn get_agenda_entry(&self, agenda_id: &str) -> Option<AgendaCacheEntry> {
        self.load_agenda_map().remove(agenda_id)
    }

    /// Targeted removal, used when leaving or deleting an agenda.
    pub fn remove_agenda_data(&self, agenda_id: &str) -> Result<()> {
        let _guard = self.lock_rmw()?;
        let mut map = self.load_agenda_map();
        if map.remove(agenda_id).is_some() {
            self.save_agenda_map(&map)?;
        }
        Ok(())
    }

    /// Apply `f` to the first cached bundle for which it returns true, and
    /// persist that change. Returns whether any bundle was updated.
    pub fn update_agenda_data<F>(&self, mut f: F) -> Result<bool>
    where
        F: FnMut(&mut AgendaBundle) -> bool,
    {
        let _guard = self.lock_rmw()?;
        let mut map = self.load_agenda_map();
        let changed = map.values_mut().any(|entry| f(&mut entry.data));
        if changed {
            self.save_agenda_map(&map)?;
        }
        Ok(changed)
    }

    /// Drop an agenda from the cached list and its bundle.
    pub fn forget_agenda(&self, agenda_id: &str) -> Result<()> {
        self.remove_cached_agenda(agenda_id)?;
        self.remove_agenda_data(agenda_id)
    }

    /// Set or clear one of the viewer's annotations everywhere the element
    /// is cached: its agenda bundle and the home screen lists.
    pub fn apply_annotation(
        &self,
        element_id: &str,
        annotation: Annotation,
        on: bool,
    ) -> Result<()> {
        let _guard = self.lock_rmw()?;

        let mut map = self.load_agenda_map();
        let mut view = None;
        if let Some(entry) = map
            .values_mut()
            .find(|entry| entry.data.contains_element(element_id))
        {
            entry.data.set_annotation(element_id, annotation, on);
            view = entry.data.view_of(element_id);
            self.save_agenda_map(&map)?;
        }

        let mut urgent = self.load_urgent_elements();
        let mut completed = self.load_completed_elements();
        for item in urgent.iter_mut().chain(completed.iter_mut()) {
            if item.element.id == element_id {
                match annotation {
                    Annotation::Urgent => item.is_urgent = on,
                    Annotation::Completed => item.is_completed = on,
                }
            }
        }

        let target = match annotation {
            Annotation::Urgent => &mut urgent,
            Annotation::Completed => &mut completed,
        };
        if on {
            let present = target.iter().any(|item| item.element.id == element_id);
            match (present, view) {
                (false, Some(view)) => target.push(view),
                (false, None) => {
                    debug!(element_id, "Annotated element not cached, list left as is")
                }
                (true, _) => {}
            }
        } else {
            target.retain(|item| item.element.id != element_id);
        }

        sort_by_urgency(&mut urgent);
        sort_by_urgency(&mut completed);
        self.save_urgent_elements(&urgent)?;
        self.save_completed_elements(&completed)
    }

    /// Remove a deleted element from every cached view.
    pub fn forget_element(&self, element_id: &str) -> Result<()> {
        let _guard = self.lock_rmw()?;

        let mut map = self.load_agenda_map();
        let mut removed = false;
        for entry in map.values_mut() {
            removed |= entry.data.remove_element(element_id);
        }
        if removed {
            self.save_agenda_map(&map)?;
        }

        let keep = |item: &ElementView| item.element.id != element_id;
        let urgent: Vec<ElementView> = self.load_urgent_elements().into_iter().filter(keep).collect();
        let completed: Vec<ElementView> =
            self.load_completed_elements().into_iter().filter(keep).collect();
        self.save_urgent_elements(&urgent)?;
        self.save_completed_elements(&completed)
    }

    pub fn cached_agenda_ids(&self) -> Vec<String> {
        self.load_agenda_map().into_keys().collect()
    }

    /// Drop per-agenda entries older than 24 hours. Returns how many were
    /// removed.
    pub fn cleanup_old_cache(&self) -> Result<usize> {
        self.cleanup_old_cache_at(Utc::now())
    }

    pub fn cleanup_old_cache_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let max_age = Duration::hours(AGENDA_CACHE_MAX_AGE_HOURS);
        let _guard = self.lock_rmw()?;
        let mut map = self.load_agenda_map();
        let before = map.len();
        map.retain(|_, entry| !entry.is_older_than(max_age, now));
        let pruned = before - map.len();

        self.save_agenda_map(&map)?;
        debug!(pruned, kept = map.len(), "Agenda cache cleanup complete");
        Ok(pruned)
    }
}

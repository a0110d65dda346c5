//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the backend URL, its anonymous key and the last signed-in
//! account.
//!
//! Configuration is stored at `~/.config/agendacache/config.json`. The
//! `AGENDACACHE_URL`, `AGENDACACHE_ANON_KEY` and `AGENDACACHE_EMAIL`
//! environment variables override the file.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "agendacache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub backend_url: Option<String>,
    pub anon_key: Option<String>,
    pub last_email: Option<String>,
    #[serde(default)]
    pub last_user_id: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides from a variable lookup (normally `std::env::var`).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("AGENDACACHE_URL") {
            self.backend_url = Some(url);
        }
        if let Some(key) = lookup("AGENDACACHE_ANON_KEY") {
            self.anon_key = Some(key);
        }
        if let Some(email) = lookup("AGENDACACHE_EMAIL") {
            self.last_email = Some(email);
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
    }

    /// Backend URL and anonymous key, both required to talk to the server.
    pub fn backend(&self) -> Result<(&str, &str)> {
        let url = self
            .backend_url
            .as_deref()
            .ok_or_else(|| anyhow!("No backend URL configured (set AGENDACACHE_URL)"))?;
        let key = self
            .anon_key
            .as_deref()
            .ok_or_else(|| anyhow!("No anon key configured (set AGENDACACHE_ANON_KEY)"))?;
        Ok((url, key))
    }

    /// Root of all local state; the session file lives here.
    pub fn base_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Offline cache directory, scoped to the last signed-in user.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let mut path = self.base_dir()?;
        if let Some(ref user_id) = self.last_user_id {
            path = path.join(user_id);
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = Config {
            backend_url: Some("https://old.example.com".to_string()),
            ..Default::default()
        };
        config.apply_overrides(|name| match name {
            "AGENDACACHE_URL" => Some("https://new.example.com".to_string()),
            "AGENDACACHE_ANON_KEY" => Some("anon".to_string()),
            _ => None,
        });

        assert_eq!(config.backend().unwrap(), ("https://new.example.com", "anon"));
        assert_eq!(config.last_email, None);
    }

    #[test]
    fn test_backend_requires_url_and_key() {
        let config = Config::default();
        assert!(config.backend().is_err());
    }

    #[test]
    fn test_missing_fields_deserialize() {
        let config: Config = serde_json::from_str(r#"{"backend_url":"https://x"}"#).unwrap();
        assert_eq!(config.backend_url.as_deref(), Some("https://x"));
        assert_eq!(config.last_user_id, None);
    }
}

//! Application configuration management.
//!
//! The store project, its web API key, where the location seed files live
//! and the last used email are kept at `~/.config/voterbook/config.json`.
//! `VOTERBOOK_*` environment variables override the file.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::hierarchy::LocationSource;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "voterbook";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_PROJECT_ID: &str = "VOTERBOOK_PROJECT_ID";
pub const ENV_API_KEY: &str = "VOTERBOOK_API_KEY";
pub const ENV_LOCATIONS: &str = "VOTERBOOK_LOCATIONS";
pub const ENV_EMAIL: &str = "VOTERBOOK_EMAIL";
pub const ENV_PASSWORD: &str = "VOTERBOOK_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub project_id: Option<String>,
    pub api_key: Option<String>,
    /// Directory path or http(s) base URL of the location seed files.
    pub location_source: Option<String>,
    pub last_email: Option<String>,
    #[serde(default)]
    pub offline_mode: bool,
}

impl Config {
    /// Load the config file, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
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

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty(ENV_PROJECT_ID) {
            self.project_id = Some(v);
        }
        if let Some(v) = non_empty(ENV_API_KEY) {
            self.api_key = Some(v);
        }
        if let Some(v) = non_empty(ENV_LOCATIONS) {
            self.location_source = Some(v);
        }
        if let Some(v) = non_empty(ENV_EMAIL) {
            self.last_email = Some(v);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Project id and API key, or an error naming what is missing.
    pub fn store_credentials(&self) -> Result<(&str, &str)> {
        let project = self
            .project_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No project id configured (set {})", ENV_PROJECT_ID))?;
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No API key configured (set {})", ENV_API_KEY))?;
        Ok((project, key))
    }

    pub fn location_source(&self) -> Option<LocationSource> {
        self.location_source.as_deref().map(LocationSource::parse)
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;

        let mut path = cache_dir.join(APP_NAME);
        if let Some(ref project) = self.project_id {
            path = path.join(project);
        }
        Ok(path)
    }
}

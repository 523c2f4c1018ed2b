use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::crypto::CacheKey;
use crate::hierarchy::LocationHierarchy;
use crate::models::{AppUser, LocationNode, VoterData};

/// Consider cache stale after 1 hour.
const CACHE_STALE_MINUTES: i64 = 60;

const VOTERS: &str = "voters";
const USERS: &str = "users";
const LOCATIONS: &str = "locations";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Negative ages come from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

/// Location lists as cached on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationSnapshot {
    pub divisions: Vec<LocationNode>,
    pub districts: Vec<LocationNode>,
    pub upazilas: Vec<LocationNode>,
    pub unions: Vec<LocationNode>,
    pub villages: Vec<LocationNode>,
}

impl LocationSnapshot {
    pub fn from_hierarchy(hierarchy: &LocationHierarchy) -> Self {
        let [divisions, districts, upazilas, unions, villages] = hierarchy.levels();
        Self {
            divisions,
            districts,
            upazilas,
            unions,
            villages,
        }
    }

    pub fn into_hierarchy(self) -> LocationHierarchy {
        LocationHierarchy::from_levels([self.divisions, self.districts, self.upazilas, self.unions, self.villages])
    }
}

/// On-disk cache for one project.
///
/// Voter and user records hold personal data and are only written sealed;
/// without a key they are neither read nor written. Location seed data is
/// public and kept as plain JSON.
pub struct CacheManager {
    cache_dir: PathBuf,
    key: Option<CacheKey>,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir, key: None })
    }

    pub fn set_key(&mut self, key: CacheKey) {
        self.key = Some(key);
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    fn plain_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    fn sealed_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.bin", name))
    }

    fn load_plain<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let path = self.plain_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", name))?;

        Ok(Some(cached))
    }

    fn save_plain<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let contents = serde_json::to_string_pretty(&cached)?;
        std::fs::write(self.plain_path(name), contents)?;
        Ok(())
    }

    fn load_sealed<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let Some(ref key) = self.key else {
            return Ok(None);
        };
        let path = self.sealed_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let sealed = std::fs::read(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;
        let plain = key
            .open(&sealed)
            .with_context(|| format!("Failed to decrypt cache file: {}", name))?;
        let cached: CachedData<T> = serde_json::from_slice(&plain)
            .with_context(|| format!("Failed to parse cache file: {}", name))?;

        Ok(Some(cached))
    }

    fn save_sealed<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let Some(ref key) = self.key else {
            debug!(cache = name, "No cache key, skipping write");
            return Ok(());
        };
        let cached = CachedData::new(data);
        let plain = serde_json::to_vec(&cached)?;
        let sealed = key.seal(&plain)?;
        std::fs::write(self.sealed_path(name), sealed)?;
        Ok(())
    }

    // ===== Voters =====

    /// Voter ids are not part of the serialized record, so they travel
    /// alongside it.
    pub fn save_voters(&self, voters: &[VoterData]) -> Result<()> {
        let with_ids: Vec<(&str, &VoterData)> = voters.iter().map(|v| (v.id.as_str(), v)).collect();
        self.save_sealed(VOTERS, &with_ids)
    }

    pub fn load_voters(&self) -> Result<Option<CachedData<Vec<VoterData>>>> {
        let cached: Option<CachedData<Vec<(String, VoterData)>>> = self.load_sealed(VOTERS)?;
        Ok(cached.map(|c| CachedData {
            cached_at: c.cached_at,
            data: c
                .data
                .into_iter()
                .map(|(id, mut voter)| {
                    voter.id = id;
                    voter
                })
                .collect(),
        }))
    }

    // ===== Users =====

    pub fn load_users(&self) -> Result<Option<CachedData<Vec<AppUser>>>> {
        let cached: Option<CachedData<Vec<(String, AppUser)>>> = self.load_sealed(USERS)?;
        Ok(cached.map(|c| CachedData {
            cached_at: c.cached_at,
            data: c
                .data
                .into_iter()
                .map(|(uid, mut user)| {
                    user.uid = uid;
                    user
                })
                .collect(),
        }))
    }

    pub fn save_users(&self, users: &[AppUser]) -> Result<()> {
        let with_ids: Vec<(&str, &AppUser)> = users.iter().map(|u| (u.uid.as_str(), u)).collect();
        self.save_sealed(USERS, &with_ids)
    }

    // ===== Locations =====

    pub fn load_locations(&self) -> Result<Option<CachedData<LocationSnapshot>>> {
        self.load_plain(LOCATIONS)
    }

    pub fn save_locations(&self, hierarchy: &LocationHierarchy) -> Result<()> {
        self.save_plain(LOCATIONS, &LocationSnapshot::from_hierarchy(hierarchy))
    }

    // ===== Cache Age Information =====

    /// Helper to load cache and log errors without failing
    fn load_age<T>(&self, name: &str, loader: impl FnOnce() -> Result<Option<CachedData<T>>>) -> Option<String> {
        match loader() {
            Ok(Some(cached)) => Some(cached.age_display()),
            Ok(None) => None,
            Err(e) => {
                debug!(cache = name, error = %e, "Failed to load cache for age display");
                None
            }
        }
    }

    pub fn get_cache_ages(&self) -> CacheAges {
        CacheAges {
            voters: self.load_age(VOTERS, || self.load_voters()),
            users: self.load_age(USERS, || self.load_users()),
            locations: self.load_age(LOCATIONS, || self.load_locations()),
        }
    }

    /// True when voters are missing or older than the stale threshold.
    pub fn voters_stale(&self) -> bool {
        match self.load_voters() {
            Ok(Some(cached)) => cached.is_stale(),
            Ok(None) => true,
            Err(e) => {
                debug!(error = %e, "Failed to load voter cache for staleness check");
                true
            }
        }
    }

    /// Remove every cached file, including the salt.
    pub fn clear(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if path.is_file() && matches!(ext, Some("json") | Some("bin")) {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CacheAges {
    pub voters: Option<String>,
    pub users: Option<String>,
    pub locations: Option<String>,
}

impl CacheAges {
    pub fn voters_age(&self) -> String {
        self.voters.clone().unwrap_or_else(|| "never".to_string())
    }

    /// The first cache that has a value, voters first
    pub fn last_updated(&self) -> String {
        [&self.voters, &self.users, &self.locations]
            .into_iter()
            .flatten()
            .next()
            .cloned()
            .unwrap_or_else(|| "never".to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::test_support;
    use crate::models::{LocationLevel, LocationPath};
    use chrono::Duration;

    fn voter(id: &str, name: &str) -> VoterData {
        let mut v = VoterData::new(name, LocationPath::from_ids(&["6", "47", "367"]));
        v.id = id.to_string();
        v.phone = Some("01712345678".to_string());
        v
    }

    #[test]
    fn test_cached_data_age_display() {
        let mut cached = CachedData::new(vec![1]);
        assert_eq!(cached.age_display(), "just now");
        cached.cached_at = Utc::now() - Duration::minutes(95);
        assert_eq!(cached.age_display(), "2h ago");
        cached.cached_at = Utc::now() - Duration::hours(30);
        assert_eq!(cached.age_display(), "1d ago");
    }

    #[test]
    fn test_cached_data_is_stale() {
        let fresh = CachedData::new(vec![1]);
        assert!(!fresh.is_stale());

        let mut old = CachedData::new(vec![1]);
        old.cached_at = Utc::now() - Duration::minutes(61);
        assert!(old.is_stale());
    }

    #[test]
    fn test_voters_sealed_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        cache.set_key(CacheKey::for_dir(dir.path(), "pw").unwrap());

        cache.save_voters(&[voter("v1", "Rahim Uddin")]).unwrap();
        let raw = std::fs::read(dir.path().join("voters.bin")).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("Rahim"));

        let loaded = cache.load_voters().unwrap().unwrap();
        assert_eq!(loaded.data.len(), 1);
        assert_eq!(loaded.data[0].id, "v1");
        assert_eq!(loaded.data[0].voter_name, "Rahim Uddin");
    }

    #[test]
    fn test_voters_unreadable_with_other_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        cache.set_key(CacheKey::for_dir(dir.path(), "pw").unwrap());
        cache.save_voters(&[voter("v1", "Rahim Uddin")]).unwrap();

        let mut other = CacheManager::new(dir.path().to_path_buf()).unwrap();
        other.set_key(CacheKey::for_dir(dir.path(), "wrong").unwrap());
        assert!(other.load_voters().is_err());

        let keyless = CacheManager::new(dir.path().to_path_buf()).unwrap();
        assert!(keyless.load_voters().unwrap().is_none());
    }

    #[test]
    fn test_keyless_save_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        cache.save_voters(&[voter("v1", "Rahim Uddin")]).unwrap();
        assert!(!dir.path().join("voters.bin").exists());
        assert!(cache.voters_stale());
    }

    #[test]
    fn test_locations_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        cache.save_locations(&test_support::sample()).unwrap();

        let hierarchy = cache.load_locations().unwrap().unwrap().data.into_hierarchy();
        assert_eq!(hierarchy.name_of(LocationLevel::Upazila, "367"), Some("Dhamrai"));
        assert_eq!(hierarchy.get_children("3701", LocationLevel::Village).len(), 2);
        assert_eq!(cache.get_cache_ages().last_updated(), "just now");
    }

    #[test]
    fn test_cache_ages_last_updated_empty() {
        assert_eq!(CacheAges::default().last_updated(), "never");
    }
}

//! Local cache for offline access.
//!
//! `CacheManager` keeps the last fetched voters, users and location lists
//! for one project. Voter and user records are sealed with a key derived
//! from the account password; location lists are plain JSON. Cached data
//! is considered stale after 60 minutes.

pub mod crypto;
pub mod manager;

pub use crypto::{CacheKey, CryptoError};
pub use manager::{CacheAges, CacheManager, CachedData, LocationSnapshot};

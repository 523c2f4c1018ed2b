//! Voterbook core library.
//!
//! Location-scoped voter management for a party branch: the administrative
//! hierarchy, role-based access, the voter and user repositories over a
//! hosted document store, CSV import/export, and the local encrypted cache.
//! The terminal client in `voterbook-tui` is a thin layer over this crate.

pub mod access;
pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod export;
pub mod form;
pub mod hierarchy;
pub mod import;
pub mod models;
pub mod repository;
pub mod sms;
pub mod stats;
pub mod store;
pub mod utils;

pub use access::{AccessError, Principal};
pub use api::{ApiError, StoreClient};
pub use auth::{CredentialStore, Session, SessionData};
pub use cache::{CacheManager, CachedData};
pub use config::Config;
pub use export::ExportError;
pub use form::{FormError, VoterForm};
pub use hierarchy::{HierarchyError, LocationHierarchy, LocationSelection, LocationSource};
pub use import::ImportError;
pub use repository::{RepositoryError, UserRepository, VoterFilter, VoterRepository};
pub use sms::SmsCampaign;
pub use stats::VoterStats;
pub use store::{DocumentStore, MemoryStore};

/// Short Bengali message for the status bar, found by looking for a typed
/// library error anywhere in the chain.
pub fn user_message(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<FormError>() {
            return e.user_message();
        }
        if let Some(e) = cause.downcast_ref::<RepositoryError>() {
            return e.user_message();
        }
        if let Some(e) = cause.downcast_ref::<AccessError>() {
            return e.user_message();
        }
        if let Some(e) = cause.downcast_ref::<ImportError>() {
            return e.user_message();
        }
        if let Some(e) = cause.downcast_ref::<ApiError>() {
            return e.user_message();
        }
    }
    "কিছু একটা ভুল হয়েছে"
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_user_message_finds_typed_error() {
        let err: anyhow::Result<()> = Err(AccessError::NotApproved("a@example.com".into())).context("Loading voters");
        let err = err.unwrap_err();
        assert_eq!(user_message(&err), "আপনার অ্যাকাউন্ট এখনও অনুমোদিত হয়নি");
        assert_eq!(user_message(&anyhow::anyhow!("plain")), "কিছু একটা ভুল হয়েছে");
    }
}

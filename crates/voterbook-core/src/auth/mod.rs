//! Sessions and stored credentials.
//!
//! - `Session`: id/refresh token pair persisted in the cache directory
//! - `CredentialStore`: OS keychain storage for the account password
//!
//! Id tokens live for an hour and are refreshed five minutes before expiry.

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{Session, SessionData};

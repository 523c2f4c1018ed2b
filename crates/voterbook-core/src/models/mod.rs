//! Data models for voterbook entities.
//!
//! - `LocationLevel`, `LocationNode`, `LocationPath`: the five-level
//!   administrative hierarchy and partial id tuples into it
//! - `AppUser`, `Role`: documents in the `users` collection
//! - `VoterData`, `VoterPatch`: documents in the `voters` collection
//! - `VoterField`: voter columns as named in CSV files and reports

pub mod field;
pub mod location;
pub mod user;
pub mod voter;

pub use field::VoterField;
pub use location::{LocationLevel, LocationNode, LocationPath};
pub use user::{AppUser, Role};
pub use voter::{priority_rank, VoterData, VoterPatch, VoterSortColumn};

//! REST client for the hosted document store.
//!
//! `StoreClient` signs in against the identity service and sends bearer
//! authenticated requests to the store's documents API. Values cross the
//! wire in the store's typed encoding, handled by `codec`.

pub mod client;
pub mod codec;
pub mod error;

pub use client::StoreClient;
pub use error::ApiError;

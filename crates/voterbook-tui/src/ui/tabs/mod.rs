//! Tab-specific content rendering.

pub mod dashboard;
pub mod users;
pub mod voters;

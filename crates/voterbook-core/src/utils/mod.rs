//! Utility functions for string formatting and serde helpers.

pub mod format;
pub mod de;

// Re-export commonly used functions at module level
pub use format::{
    ascii_digit, cmp_ignore_case, contains_ignore_case, format_optional, format_phone, normalize_bd_mobile,
    truncate,
};
pub use de::{de_opt_string_or_number, de_string_or_number};

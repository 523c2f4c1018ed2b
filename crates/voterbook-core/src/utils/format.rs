use std::cmp::Ordering;

/// ASCII value of a Latin or Bengali (০-৯) digit.
pub fn ascii_digit(c: char) -> Option<char> {
    match c {
        '0'..='9' => Some(c),
        '০'..='৯' => char::from_digit(c as u32 - '০' as u32, 10),
        _ => None,
    }
}

/// Normalize a Bangladeshi mobile number to `+8801XXXXXXXXX`.
/// Accepts `01…`, `8801…` and `+8801…` in Latin or Bengali digits, with
/// any punctuation in between.
/// Returns None for anything that is not an 11-digit `01[3-9]` number.
pub fn normalize_bd_mobile(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter_map(ascii_digit).collect();

    let local = match digits.len() {
        11 => digits.as_str(),
        13 if digits.starts_with("88") => &digits[2..],
        _ => return None,
    };

    let bytes = local.as_bytes();
    if bytes[0] == b'0' && bytes[1] == b'1' && (b'3'..=b'9').contains(&bytes[2]) {
        Some(format!("+88{}", local))
    } else {
        None
    }
}

/// Format a phone number for display as `01XXX-XXXXXX`.
/// Returns the input unchanged if it is not a recognizable mobile number.
pub fn format_phone(phone: &str) -> String {
    match normalize_bd_mobile(phone) {
        Some(n) => format!("{}-{}", &n[3..8], &n[8..]),
        None => phone.to_string(),
    }
}

/// Truncate a string to a maximum number of characters, adding ellipsis if needed
pub fn truncate(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        s.to_string()
    } else if max_chars <= 3 {
        s.chars().take(max_chars).collect()
    } else {
        let truncated: String = s.chars().take(max_chars - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an optional string, returning a default if None
pub fn format_optional(value: &Option<String>, default: &str) -> String {
    value.as_deref().unwrap_or(default).to_string()
}

pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

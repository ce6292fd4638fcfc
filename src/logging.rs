//! Logging helpers
//!
//! Tag values may be up to 64 KiB and remote error bodies are unbounded, so
//! anything user-supplied is shortened before it reaches a log line.

/// Shorten `value` to at most `max_chars` characters, appending a marker
/// with the number of characters dropped.
///
/// # Example
/// ```
/// use tracking_server::logging::truncate_for_log;
///
/// assert_eq!(truncate_for_log("short", 10), "short");
/// assert_eq!(truncate_for_log("abcdefgh", 3), "abc...(5 more chars)");
/// ```
pub fn truncate_for_log(value: &str, max_chars: usize) -> String {
    let total = value.chars().count();
    if total <= max_chars {
        return value.to_string();
    }

    // Cut on a char boundary so multi-byte input never panics
    let cut = value
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(value.len());
    format!("{}...({} more chars)", &value[..cut], total - max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_value_unchanged() {
        assert_eq!(truncate_for_log("", 4), "");
        assert_eq!(truncate_for_log("abcd", 4), "abcd");
    }

    #[test]
    fn test_truncate_long_value() {
        let value = "x".repeat(100);
        assert_eq!(truncate_for_log(&value, 10), format!("{}...(90 more chars)", "x".repeat(10)));
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate_for_log("ключ-значение", 4), "ключ...(9 more chars)");
    }
}

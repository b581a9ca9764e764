/// Truncates to `max_chars` characters without appending a marker.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Truncates to `max_chars` characters and appends `...` when anything was cut.
pub fn truncate_for_slack(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = truncate_chars(value, max_chars);
    truncated.push_str("...");
    truncated
}

/// Truncates so the result, including a trailing `…`, is at most `max_chars` characters.
pub fn truncate_with_ellipsis(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = truncate_chars(value, max_chars.saturating_sub(1));
    truncated.push('…');
    truncated
}

pub fn truncate_for_error(value: &str, max_chars: usize) -> String {
    truncate_for_slack(value, max_chars)
}

/// Collapses every run of whitespace into a single space and trims the ends.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_truncate_for_slack_appends_marker_only_when_cut() {
        assert_eq!(truncate_for_slack("short", 10), "short");
        assert_eq!(truncate_for_slack("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn regression_truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_for_error("ééé", 2), "éé...");
    }

    #[test]
    fn unit_truncate_with_ellipsis_respects_limit() {
        assert_eq!(truncate_with_ellipsis("abcdef", 6), "abcdef");
        let cut = truncate_with_ellipsis("abcdefgh", 6);
        assert_eq!(cut, "abcde…");
        assert_eq!(cut.chars().count(), 6);
    }

    #[test]
    fn unit_collapse_whitespace_normalizes_runs() {
        assert_eq!(collapse_whitespace("  a \n\t b   c "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }
}

//! Thread references typed into slash commands or chat messages.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

const THREAD_TS_QUERY_KEY: &str = "thread_ts";

fn thread_ts_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\d{10}\.\d{6}$").ok())
        .as_ref()
}

fn permalink_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)/archives/([A-Z0-9]+)/p(\d{16})").ok())
        .as_ref()
}

/// Channel and thread identity extracted from user text. Either part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadReference {
    pub channel_id: Option<String>,
    pub thread_ts: Option<String>,
}

/// A fully resolved thread to operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedThread {
    pub channel_id: String,
    pub thread_ts: String,
}

impl ThreadReference {
    pub fn is_empty(&self) -> bool {
        self.channel_id.is_none() && self.thread_ts.is_none()
    }

    /// Fills missing parts from envelope defaults; `None` means the caller must ask the user.
    pub fn resolve(
        self,
        default_channel_id: Option<&str>,
        default_thread_ts: Option<&str>,
    ) -> Option<ResolvedThread> {
        let channel_id = self
            .channel_id
            .or_else(|| non_empty(default_channel_id))?;
        let thread_ts = self.thread_ts.or_else(|| non_empty(default_thread_ts))?;
        Some(ResolvedThread {
            channel_id,
            thread_ts,
        })
    }
}

pub fn is_thread_ts(value: &str) -> bool {
    thread_ts_pattern().is_some_and(|pattern| pattern.is_match(value))
}

/// Parses a bare `1234567890.123456` timestamp or a Slack permalink.
///
/// Slack wraps links as `<url>` or `<url|label>`; both are unwrapped first. A valid
/// `thread_ts` query parameter wins over the packed timestamp in the path.
pub fn parse_thread_reference(text: &str) -> ThreadReference {
    let trimmed = unwrap_slack_link(text.trim());
    if trimmed.is_empty() {
        return ThreadReference::default();
    }
    if is_thread_ts(trimmed) {
        return ThreadReference {
            channel_id: None,
            thread_ts: Some(trimmed.to_string()),
        };
    }

    let decoded = decode_permalink(trimmed);
    if let Ok(url) = Url::parse(trimmed) {
        let query_ts = url
            .query_pairs()
            .find(|(key, _)| key == THREAD_TS_QUERY_KEY)
            .map(|(_, value)| value.into_owned())
            .filter(|value| is_thread_ts(value));
        if let Some(thread_ts) = query_ts {
            return ThreadReference {
                channel_id: decoded.channel_id,
                thread_ts: Some(thread_ts),
            };
        }
    }
    decoded
}

fn decode_permalink(value: &str) -> ThreadReference {
    let Some(captures) = permalink_pattern().and_then(|pattern| pattern.captures(value)) else {
        return ThreadReference::default();
    };
    let channel_id = captures.get(1).map(|value| value.as_str().to_string());
    let thread_ts = captures.get(2).map(|packed| {
        let packed = packed.as_str();
        format!("{}.{}", &packed[..10], &packed[10..])
    });
    ThreadReference {
        channel_id,
        thread_ts,
    }
}

fn unwrap_slack_link(value: &str) -> &str {
    let Some(inner) = value
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
    else {
        return value;
    };
    inner.split('|').next().unwrap_or(inner).trim()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_bare_timestamp_is_thread_only() {
        let reference = parse_thread_reference("  1739999999.000100 ");
        assert_eq!(reference.thread_ts.as_deref(), Some("1739999999.000100"));
        assert_eq!(reference.channel_id, None);
    }

    #[test]
    fn unit_permalink_decodes_packed_timestamp() {
        let reference =
            parse_thread_reference("https://acme.slack.com/archives/C123ABC/p1739999999000100");
        assert_eq!(reference.channel_id.as_deref(), Some("C123ABC"));
        assert_eq!(reference.thread_ts.as_deref(), Some("1739999999.000100"));
    }

    #[test]
    fn unit_thread_ts_query_parameter_takes_precedence() {
        let reference = parse_thread_reference(
            "https://acme.slack.com/archives/C123ABC/p1739999999000200?thread_ts=1739999999.000100&cid=C123ABC",
        );
        assert_eq!(reference.channel_id.as_deref(), Some("C123ABC"));
        assert_eq!(reference.thread_ts.as_deref(), Some("1739999999.000100"));
    }

    #[test]
    fn regression_invalid_query_timestamp_falls_back_to_path() {
        let reference = parse_thread_reference(
            "https://acme.slack.com/archives/C123ABC/p1739999999000200?thread_ts=oops",
        );
        assert_eq!(reference.thread_ts.as_deref(), Some("1739999999.000200"));
    }

    #[test]
    fn regression_documented_reference_examples_parse_exactly() {
        assert_eq!(
            parse_thread_reference("1700000000.123456"),
            ThreadReference {
                channel_id: None,
                thread_ts: Some("1700000000.123456".to_string()),
            }
        );
        assert_eq!(
            parse_thread_reference(
                "https://x.slack.com/archives/C123456/p1739999999000100?thread_ts=1739999999.000100"
            ),
            ThreadReference {
                channel_id: Some("C123456".to_string()),
                thread_ts: Some("1739999999.000100".to_string()),
            }
        );
    }

    #[test]
    fn unit_slack_wrapped_links_are_unwrapped() {
        let reference = parse_thread_reference(
            "<https://acme.slack.com/archives/C123ABC/p1739999999000100|thread>",
        );
        assert_eq!(reference.channel_id.as_deref(), Some("C123ABC"));
        assert_eq!(reference.thread_ts.as_deref(), Some("1739999999.000100"));
    }

    #[test]
    fn unit_unrecognized_text_yields_empty_reference() {
        for text in ["", "   ", "summarize please", "123.456", "17399999990.000100"] {
            assert!(parse_thread_reference(text).is_empty(), "text {text:?}");
        }
    }

    #[test]
    fn functional_resolve_uses_defaults_only_for_missing_parts() {
        let resolved = parse_thread_reference("1739999999.000100")
            .resolve(Some("C_DEFAULT"), Some("1700000000.000001"))
            .expect("resolved");
        assert_eq!(resolved.channel_id, "C_DEFAULT");
        assert_eq!(resolved.thread_ts, "1739999999.000100");

        assert_eq!(
            parse_thread_reference("").resolve(Some("C_DEFAULT"), None),
            None
        );
        assert_eq!(
            parse_thread_reference("1739999999.000100").resolve(Some("  "), None),
            None
        );
    }
}

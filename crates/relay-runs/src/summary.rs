//! Deterministic thread summarization, Slack formatting, and summarizer selection.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use relay_core::{collapse_whitespace, truncate_with_ellipsis};
use serde::{Deserialize, Serialize};

use crate::capabilities::ThreadMessage;
use crate::generation::GenerationError;

pub const MAX_SUMMARY_ITEMS: usize = 5;
pub const MAX_SUMMARY_ITEM_CHARS: usize = 180;
const SUMMARY_TAIL_MESSAGES: usize = 5;
const SUMMARY_TAIL_CHARS: usize = 150;
pub const EMPTY_THREAD_SUMMARY: &str = "No thread content was available to summarize.";

fn decision_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)\b(decision|decided|approved|ship it|go ahead|agreed)\b").ok()
        })
        .as_ref()
}

fn blocker_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)\b(blocked|blocker|risk|issue|concern|dependency)\b").ok()
        })
        .as_ref()
}

fn next_action_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\b(todo|action|next step|follow up|owner)\b").ok())
        .as_ref()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSummaryInput {
    pub channel_id: String,
    pub thread_ts: String,
    pub messages: Vec<ThreadMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub summary: String,
    pub decisions: Vec<String>,
    pub blockers: Vec<String>,
    pub next_actions: Vec<String>,
}

/// Drops case-insensitive duplicates (after whitespace normalization) and empty items.
pub(crate) fn dedupe_items(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let key = collapse_whitespace(item).to_lowercase();
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

fn pick_matching(texts: &[String], pattern: Option<&Regex>) -> Vec<String> {
    let Some(pattern) = pattern else {
        return Vec::new();
    };
    let picked = texts
        .iter()
        .filter(|text| pattern.is_match(text))
        .map(|text| truncate_with_ellipsis(text, MAX_SUMMARY_ITEM_CHARS))
        .collect();
    dedupe_items(picked)
        .into_iter()
        .take(MAX_SUMMARY_ITEMS)
        .collect()
}

/// Keyword heuristic summary of a thread. Never fails.
pub fn summarize_thread(messages: &[ThreadMessage]) -> ThreadSummary {
    let texts = messages
        .iter()
        .map(|message| collapse_whitespace(&message.text))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>();

    let decisions = pick_matching(&texts, decision_pattern());
    let blockers = pick_matching(&texts, blocker_pattern());
    let next_actions = pick_matching(&texts, next_action_pattern());

    let tail = texts
        .iter()
        .skip(texts.len().saturating_sub(SUMMARY_TAIL_MESSAGES))
        .map(|text| truncate_with_ellipsis(text, SUMMARY_TAIL_CHARS))
        .collect::<Vec<_>>();
    let body = if tail.is_empty() {
        EMPTY_THREAD_SUMMARY.to_string()
    } else {
        tail.join(" ")
    };

    let mut prefix = Vec::new();
    if !decisions.is_empty() {
        prefix.push(format!("Decisions captured: {}.", decisions.len()));
    }
    if !blockers.is_empty() {
        prefix.push(format!("Blockers captured: {}.", blockers.len()));
    }
    if !next_actions.is_empty() {
        prefix.push(format!("Follow-ups captured: {}.", next_actions.len()));
    }
    let summary = if prefix.is_empty() {
        body
    } else {
        format!("{} {body}", prefix.join(" "))
    };

    ThreadSummary {
        summary,
        decisions,
        blockers,
        next_actions,
    }
}

fn push_section(lines: &mut Vec<String>, heading: &str, items: &[String]) {
    lines.push(String::new());
    lines.push(format!("*{heading}*"));
    if items.is_empty() {
        lines.push("• None captured".to_string());
    } else {
        lines.extend(items.iter().map(|item| format!("• {item}")));
    }
}

/// Renders a summary as Slack mrkdwn.
pub fn format_thread_summary_for_slack(summary: &ThreadSummary) -> String {
    let mut lines = vec!["*Thread Summary*".to_string(), summary.summary.clone()];
    push_section(&mut lines, "Decisions", &summary.decisions);
    push_section(&mut lines, "Blockers", &summary.blockers);
    push_section(&mut lines, "Next Actions", &summary.next_actions);
    lines.join("\n")
}

#[async_trait]
pub trait ThreadSummarizer: Send + Sync {
    async fn summarize(&self, input: &ThreadSummaryInput) -> Result<ThreadSummary, GenerationError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalThreadSummarizer;

#[async_trait]
impl ThreadSummarizer for LocalThreadSummarizer {
    async fn summarize(&self, input: &ThreadSummaryInput) -> Result<ThreadSummary, GenerationError> {
        Ok(summarize_thread(&input.messages))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryMode {
    Local,
    Enhanced,
    Fallback,
}

impl SummaryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Enhanced => "enhanced",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryResolution {
    pub summary: ThreadSummary,
    pub mode: SummaryMode,
    /// Set when the enhanced summarizer failed and the local heuristic was used.
    pub fallback_error: Option<String>,
}

/// Chooses between the optional enhanced summarizer and the local heuristic.
#[derive(Clone, Default)]
pub struct SummaryStrategy {
    enhanced: Option<Arc<dyn ThreadSummarizer>>,
}

impl SummaryStrategy {
    pub fn local_only() -> Self {
        Self { enhanced: None }
    }

    pub fn with_enhanced(summarizer: Arc<dyn ThreadSummarizer>) -> Self {
        Self {
            enhanced: Some(summarizer),
        }
    }

    pub fn has_enhanced(&self) -> bool {
        self.enhanced.is_some()
    }

    pub async fn summarize(&self, input: &ThreadSummaryInput) -> SummaryResolution {
        let Some(enhanced) = &self.enhanced else {
            return SummaryResolution {
                summary: summarize_thread(&input.messages),
                mode: SummaryMode::Local,
                fallback_error: None,
            };
        };

        match enhanced.summarize(input).await {
            Ok(summary) => SummaryResolution {
                summary,
                mode: SummaryMode::Enhanced,
                fallback_error: None,
            },
            Err(error) => SummaryResolution {
                summary: summarize_thread(&input.messages),
                mode: SummaryMode::Fallback,
                fallback_error: Some(error.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;

    fn message(ts: &str, text: &str) -> ThreadMessage {
        ThreadMessage {
            ts: ts.to_string(),
            user_id: Some("U1".to_string()),
            text: text.to_string(),
        }
    }

    #[test]
    fn unit_summarize_thread_extracts_keyword_sections() {
        let messages = vec![
            message("1.1", "We decided to ship on Friday"),
            message("1.2", "Blocked on the   billing dependency"),
            message("1.3", "TODO: Dana is the owner of the rollout doc"),
            message("1.4", "sounds good"),
        ];
        let summary = summarize_thread(&messages);
        assert_eq!(summary.decisions, vec!["We decided to ship on Friday"]);
        assert_eq!(summary.blockers, vec!["Blocked on the billing dependency"]);
        assert_eq!(
            summary.next_actions,
            vec!["TODO: Dana is the owner of the rollout doc"]
        );
        assert!(summary.summary.starts_with(
            "Decisions captured: 1. Blockers captured: 1. Follow-ups captured: 1. We decided"
        ));
        assert!(summary.summary.ends_with("sounds good"));
    }

    #[test]
    fn unit_summarize_thread_handles_empty_threads() {
        let summary = summarize_thread(&[message("1.1", "   "), message("1.2", "")]);
        assert_eq!(summary.summary, EMPTY_THREAD_SUMMARY);
        assert!(summary.decisions.is_empty());
        assert!(summary.blockers.is_empty());
        assert!(summary.next_actions.is_empty());
    }

    #[test]
    fn unit_keywords_require_word_boundaries() {
        let summary = summarize_thread(&[message("1.1", "the transaction tissue was fine")]);
        assert!(summary.next_actions.is_empty());
        assert!(summary.blockers.is_empty());
    }

    #[test]
    fn functional_sections_dedupe_and_cap_at_five() {
        let mut messages = vec![
            message("0.1", "Approved the plan"),
            message("0.2", "approved   THE plan"),
        ];
        for index in 0..8 {
            messages.push(message(&format!("1.{index}"), &format!("risk number {index}")));
        }
        let summary = summarize_thread(&messages);
        assert_eq!(summary.decisions, vec!["Approved the plan"]);
        assert_eq!(summary.blockers.len(), MAX_SUMMARY_ITEMS);
        assert_eq!(summary.blockers[0], "risk number 0");
    }

    #[test]
    fn functional_summary_uses_last_five_truncated_messages() {
        let long = "x".repeat(400);
        let mut messages = (0..6)
            .map(|index| message(&format!("1.{index}"), &format!("m{index}")))
            .collect::<Vec<_>>();
        messages.push(message("2.0", &long));
        let summary = summarize_thread(&messages);
        assert!(!summary.summary.contains("m0"));
        assert!(!summary.summary.contains("m1"));
        assert!(summary.summary.starts_with("m2 m3 m4 m5 "));
        let last = summary.summary.rsplit(' ').next().expect("last line");
        assert_eq!(last.chars().count(), 150);
        assert!(last.ends_with('…'));
    }

    #[test]
    fn regression_list_items_are_truncated_to_180_chars() {
        let text = format!("decision: {}", "y".repeat(300));
        let summary = summarize_thread(&[message("1.1", &text)]);
        assert_eq!(summary.decisions[0].chars().count(), MAX_SUMMARY_ITEM_CHARS);
    }

    #[test]
    fn unit_format_thread_summary_for_slack_renders_sections() {
        let rendered = format_thread_summary_for_slack(&ThreadSummary {
            summary: "Short summary.".to_string(),
            decisions: vec!["Ship it".to_string()],
            blockers: Vec::new(),
            next_actions: vec!["Write docs".to_string(), "Notify QA".to_string()],
        });
        assert_eq!(
            rendered,
            "*Thread Summary*\nShort summary.\n\n*Decisions*\n• Ship it\n\n*Blockers*\n• None captured\n\n*Next Actions*\n• Write docs\n• Notify QA"
        );
    }

    struct FailingSummarizer;

    #[async_trait]
    impl ThreadSummarizer for FailingSummarizer {
        async fn summarize(
            &self,
            _input: &ThreadSummaryInput,
        ) -> Result<ThreadSummary, GenerationError> {
            Err(GenerationError::InvalidJson)
        }
    }

    struct FixedSummarizer;

    #[async_trait]
    impl ThreadSummarizer for FixedSummarizer {
        async fn summarize(
            &self,
            _input: &ThreadSummaryInput,
        ) -> Result<ThreadSummary, GenerationError> {
            Ok(ThreadSummary {
                summary: "from model".to_string(),
                decisions: Vec::new(),
                blockers: Vec::new(),
                next_actions: Vec::new(),
            })
        }
    }

    fn input() -> ThreadSummaryInput {
        ThreadSummaryInput {
            channel_id: "C1".to_string(),
            thread_ts: "1.1".to_string(),
            messages: vec![message("1.1", "we agreed on the API")],
        }
    }

    #[tokio::test]
    async fn functional_strategy_falls_back_to_local_on_failure() {
        let resolution = SummaryStrategy::with_enhanced(Arc::new(FailingSummarizer))
            .summarize(&input())
            .await;
        assert_eq!(resolution.mode, SummaryMode::Fallback);
        assert_eq!(
            resolution.fallback_error.as_deref(),
            Some("model response was not valid JSON")
        );
        assert_eq!(resolution.summary.decisions, vec!["we agreed on the API"]);
    }

    #[tokio::test]
    async fn functional_strategy_prefers_enhanced_when_it_succeeds() {
        let resolution = SummaryStrategy::with_enhanced(Arc::new(FixedSummarizer))
            .summarize(&input())
            .await;
        assert_eq!(resolution.mode, SummaryMode::Enhanced);
        assert_eq!(resolution.summary.summary, "from model");

        let local = SummaryStrategy::local_only().summarize(&input()).await;
        assert_eq!(local.mode, SummaryMode::Local);
        assert!(local.fallback_error.is_none());
    }

    #[tokio::test]
    async fn unit_local_summarizer_matches_heuristic() {
        let input = input();
        let summary = LocalThreadSummarizer
            .summarize(&input)
            .await
            .expect("local summarizer never fails");
        assert_eq!(summary, summarize_thread(&input.messages));
    }
}

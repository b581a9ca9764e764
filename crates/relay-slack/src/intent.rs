//! Classifies assistant chat messages into one intent, evaluated once in a fixed order.

use std::sync::OnceLock;

use regex::Regex;
use relay_runs::{AssistantRequest, AssistantTopic};

use crate::reference::{parse_thread_reference, ThreadReference};

const HELP_PHRASES: [&str; 2] = ["help", "how do i use this assistant?"];

fn mention_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"<@[A-Z0-9]+(?:\|[^>]*)?>").ok())
        .as_ref()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantIntent {
    Help,
    Summarize(ThreadReference),
    Topic(AssistantTopic),
    FreeText(String),
}

impl AssistantIntent {
    /// Precedence: help, thread reference, exact topic keyword, free text.
    pub fn classify(raw_text: &str) -> Self {
        let text = strip_mentions(raw_text);
        if text.is_empty() || HELP_PHRASES.contains(&text.to_lowercase().as_str()) {
            return Self::Help;
        }
        if let Some(reference) = find_thread_reference(&text) {
            return Self::Summarize(reference);
        }
        if let Some(topic) = AssistantTopic::from_command(&text) {
            return Self::Topic(topic);
        }
        Self::FreeText(text)
    }

    /// The run request for intents answered by an `assistant_reply` run.
    pub fn assistant_request(&self) -> Option<AssistantRequest> {
        match self {
            Self::Help => Some(AssistantRequest::Help),
            Self::Topic(topic) => Some(AssistantRequest::Topic { topic: *topic }),
            Self::FreeText(text) => Some(AssistantRequest::FreeText { text: text.clone() }),
            Self::Summarize(_) => None,
        }
    }
}

/// Removes `<@U123>` mentions and collapses the remaining whitespace.
pub fn strip_mentions(text: &str) -> String {
    let without_mentions = match mention_pattern() {
        Some(pattern) => pattern.replace_all(text, " ").into_owned(),
        None => text.to_string(),
    };
    relay_core::collapse_whitespace(&without_mentions)
}

fn find_thread_reference(text: &str) -> Option<ThreadReference> {
    text.split_whitespace()
        .map(parse_thread_reference)
        .find(|reference| reference.thread_ts.is_some())
}

//! Model-backed summarizer and reply generator over an OpenAI-compatible chat endpoint.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::{collapse_whitespace, truncate_with_ellipsis};
use serde_json::{json, Map, Value};

use crate::assistant::{ReplyGenerator, ReplyInput};
use crate::generation::GenerationError;
use crate::summary::{
    dedupe_items, ThreadSummarizer, ThreadSummary, ThreadSummaryInput, EMPTY_THREAD_SUMMARY,
    MAX_SUMMARY_ITEMS, MAX_SUMMARY_ITEM_CHARS,
};

pub const DEFAULT_LLM_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_LLM_TIMEOUT_MS: u64 = 20_000;

const MAX_PROMPT_MESSAGES: usize = 120;
const MAX_PROMPT_MESSAGE_CHARS: usize = 500;
const MAX_HISTORY_MESSAGES: usize = 12;
const MAX_SUMMARY_CHARS: usize = 600;
const MAX_USER_TEXT_CHARS: usize = 2_000;
const MAX_REPLY_CHARS: usize = 4_000;

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiCompatConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub timeout_ms: u64,
    pub temperature: f32,
}

impl OpenAiCompatConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_LLM_API_BASE.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout_ms: DEFAULT_LLM_TIMEOUT_MS,
            temperature: 0.2,
        }
    }
}

/// Shared HTTP plumbing for the chat-completions endpoint.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatClient {
    pub fn new(config: OpenAiCompatConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            http,
            config: OpenAiCompatConfig {
                api_base: config.api_base.trim_end_matches('/').to_string(),
                api_key: config.api_key.trim().to_string(),
                ..config
            },
        })
    }

    async fn complete(&self, messages: Value) -> Result<String, GenerationError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.model,
                "temperature": self.config.temperature,
                "messages": messages,
            }))
            .send()
            .await
            .map_err(|error| GenerationError::Request(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: truncate_with_ellipsis(&collapse_whitespace(&body), 300),
            });
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(|error| GenerationError::Request(error.to_string()))?;
        let content = message_content(&payload);
        if content.trim().is_empty() {
            return Err(GenerationError::EmptyContent);
        }
        Ok(content)
    }
}

/// Reads `choices[0].message.content` as a string or a list of text parts.
fn message_content(payload: &Value) -> String {
    let content = &payload["choices"][0]["message"]["content"];
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

fn parse_json_object(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).ok()? {
        Value::Object(object) => Some(object),
        _ => None,
    }
}

/// Parses the whole response as a JSON object, else the span from the first `{` to the last `}`.
pub fn extract_first_json_object(raw: &str) -> Option<Map<String, Value>> {
    if let Some(object) = parse_json_object(raw) {
        return Some(object);
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_json_object(&raw[start..=end])
}

fn coerce_items(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    let items = items
        .iter()
        .filter_map(Value::as_str)
        .map(collapse_whitespace)
        .filter(|item| !item.is_empty())
        .map(|item| truncate_with_ellipsis(&item, MAX_SUMMARY_ITEM_CHARS))
        .collect();
    dedupe_items(items)
        .into_iter()
        .take(MAX_SUMMARY_ITEMS)
        .collect()
}

fn fallback_summary_text(input: &ThreadSummaryInput) -> String {
    let tail = input
        .messages
        .iter()
        .skip(input.messages.len().saturating_sub(3))
        .map(|message| collapse_whitespace(&message.text))
        .filter(|text| !text.is_empty())
        .map(|text| truncate_with_ellipsis(&text, MAX_SUMMARY_ITEM_CHARS))
        .collect::<Vec<_>>();
    if tail.is_empty() {
        EMPTY_THREAD_SUMMARY.to_string()
    } else {
        tail.join(" ")
    }
}

/// Coerces a model JSON object into a bounded summary.
pub fn coerce_summary(input: &ThreadSummaryInput, payload: &Map<String, Value>) -> ThreadSummary {
    let summary = payload
        .get("summary")
        .and_then(Value::as_str)
        .map(collapse_whitespace)
        .filter(|summary| !summary.is_empty())
        .map(|summary| truncate_with_ellipsis(&summary, MAX_SUMMARY_CHARS))
        .unwrap_or_else(|| fallback_summary_text(input));
    let next_actions = payload
        .get("next_actions")
        .or_else(|| payload.get("nextActions"));

    ThreadSummary {
        summary,
        decisions: coerce_items(payload.get("decisions")),
        blockers: coerce_items(payload.get("blockers")),
        next_actions: coerce_items(next_actions),
    }
}

fn summary_prompt(input: &ThreadSummaryInput) -> String {
    let transcript = input
        .messages
        .iter()
        .skip(input.messages.len().saturating_sub(MAX_PROMPT_MESSAGES))
        .enumerate()
        .map(|(index, message)| {
            let author = message
                .user_id
                .as_deref()
                .map(|user| format!("<{user}>"))
                .unwrap_or_else(|| "<unknown>".to_string());
            let text = truncate_with_ellipsis(
                &collapse_whitespace(&message.text),
                MAX_PROMPT_MESSAGE_CHARS,
            );
            format!("{}. [{}] {author} {text}", index + 1, message.ts)
        })
        .collect::<Vec<_>>();
    let transcript = if transcript.is_empty() {
        "No messages were provided.".to_string()
    } else {
        transcript.join("\n")
    };

    [
        "You summarize chat threads for engineering teams.".to_string(),
        "Return ONLY valid JSON (no markdown, no prose) with this exact shape:".to_string(),
        r#"{"summary":"string","decisions":["string"],"blockers":["string"],"next_actions":["string"]}"#
            .to_string(),
        "Rules:".to_string(),
        "- summary: 1-3 sentences".to_string(),
        "- decisions, blockers, next_actions: max 5 items each".to_string(),
        "- Keep each list item <= 180 characters".to_string(),
        "- If no items exist for a list, return []".to_string(),
        String::new(),
        format!("Thread channel: {}", input.channel_id),
        format!("Thread timestamp: {}", input.thread_ts),
        "Messages:".to_string(),
        transcript,
    ]
    .join("\n")
}

fn reply_system_prompt() -> &'static str {
    "You are Relay, an assistant embedded in a team's chat workspace.\n\
     Primary objectives:\n\
     1) Help the team decide what to build next.\n\
     2) Help the team expand assistant access across channels and tools incrementally.\n\
     Response style:\n\
     - Be concrete and implementation-focused.\n\
     - Use concise lists when helpful.\n\
     - If information is missing, ask 1-2 clarifying questions."
}

fn reply_history_context(input: &ReplyInput) -> String {
    let mut lines = vec![
        format!(
            "Source channel context: {}",
            input.context.source_channel_id.as_deref().unwrap_or("unknown")
        ),
        format!(
            "Workspace team id: {}",
            input.context.team_id.as_deref().unwrap_or("unknown")
        ),
    ];
    let recent = input
        .thread_messages
        .iter()
        .skip(input.thread_messages.len().saturating_sub(MAX_HISTORY_MESSAGES))
        .map(|message| {
            let actor = message
                .user_id
                .as_deref()
                .map(|user| format!("user:{user}"))
                .unwrap_or_else(|| "assistant".to_string());
            format!(
                "[{actor}] {}",
                truncate_with_ellipsis(&collapse_whitespace(&message.text), MAX_PROMPT_MESSAGE_CHARS)
            )
        })
        .collect::<Vec<_>>();
    if recent.is_empty() {
        lines.push("Recent thread messages: none".to_string());
    } else {
        lines.push("Recent thread messages:".to_string());
        lines.extend(recent);
    }
    lines.join("\n")
}

/// Thread summarizer that asks the model for a JSON summary.
#[derive(Clone)]
pub struct OpenAiCompatSummarizer {
    client: OpenAiCompatClient,
}

impl OpenAiCompatSummarizer {
    pub fn new(client: OpenAiCompatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ThreadSummarizer for OpenAiCompatSummarizer {
    async fn summarize(&self, input: &ThreadSummaryInput) -> Result<ThreadSummary, GenerationError> {
        let content = self
            .client
            .complete(json!([{ "role": "user", "content": summary_prompt(input) }]))
            .await?;
        let payload = extract_first_json_object(&content).ok_or(GenerationError::InvalidJson)?;
        Ok(coerce_summary(input, &payload))
    }
}

#[derive(Clone)]
pub struct OpenAiCompatReplyGenerator {
    client: OpenAiCompatClient,
}

impl OpenAiCompatReplyGenerator {
    pub fn new(client: OpenAiCompatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiCompatReplyGenerator {
    async fn generate_reply(&self, input: &ReplyInput) -> Result<String, GenerationError> {
        let content = self
            .client
            .complete(json!([
                { "role": "system", "content": reply_system_prompt() },
                { "role": "system", "content": reply_history_context(input) },
                {
                    "role": "user",
                    "content": truncate_with_ellipsis(input.text.trim(), MAX_USER_TEXT_CHARS),
                },
            ]))
            .await?;
        Ok(truncate_with_ellipsis(content.trim(), MAX_REPLY_CHARS))
    }
}

//! Slack Web API client: thread reads, threaded replies, and assistant thread setup.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use relay_core::truncate_for_error;
use relay_runs::{
    AssistantThreadDecorator, ReplyTarget, Responder, SuggestedPrompt, ThreadFetcher,
    ThreadMessage,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::retry::{
    is_retryable_slack_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    RETRY_ATTEMPT_HEADER,
};

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";
pub const DEFAULT_SLACK_REQUEST_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_SLACK_RETRY_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_SLACK_RETRY_BASE_DELAY_MS: u64 = 500;

const REPLIES_PAGE_LIMIT: usize = 200;
const MAX_REPLIES_PAGES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackApiClientConfig {
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl SlackApiClientConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_SLACK_API_BASE.to_string(),
            bot_token: bot_token.into(),
            request_timeout_ms: DEFAULT_SLACK_REQUEST_TIMEOUT_MS,
            retry_max_attempts: DEFAULT_SLACK_RETRY_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_SLACK_RETRY_BASE_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SlackRepliesResponse {
    ok: bool,
    #[serde(default)]
    messages: Vec<SlackReplyMessage>,
    response_metadata: Option<SlackResponseMetadata>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackReplyMessage {
    ts: Option<String>,
    user: Option<String>,
    bot_id: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackResponseMetadata {
    next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    channel: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackAckResponse {
    ok: bool,
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackPostedMessage {
    pub channel: String,
    pub ts: String,
}

#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl SlackApiClient {
    pub fn new(config: SlackApiClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("relay-slack"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.trim().to_string(),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    /// Reads every message of a thread (parent first), following `next_cursor`.
    pub async fn fetch_thread_messages(
        &self,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Vec<ThreadMessage>> {
        let endpoint = format!("{}/conversations.replies", self.api_base);
        let limit = REPLIES_PAGE_LIMIT.to_string();
        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_REPLIES_PAGES {
            let mut params = vec![
                ("channel", channel_id),
                ("ts", thread_ts),
                ("limit", limit.as_str()),
            ];
            if let Some(cursor) = cursor.as_deref() {
                params.push(("cursor", cursor));
            }
            let url = Url::parse_with_params(&endpoint, &params)
                .with_context(|| format!("invalid slack api base '{}'", self.api_base))?;

            let response: SlackRepliesResponse = self
                .request_json(
                    "conversations.replies",
                    || self.http.get(url.clone()).bearer_auth(&self.bot_token),
                )
                .await?;
            if !response.ok {
                bail!(
                    "slack conversations.replies failed: {}",
                    response
                        .error
                        .unwrap_or_else(|| "unknown error".to_string())
                );
            }

            messages.extend(response.messages.into_iter().filter_map(|message| {
                let ts = message.ts.filter(|value| !value.trim().is_empty())?;
                let text = message.text.filter(|value| !value.trim().is_empty())?;
                Some(ThreadMessage {
                    ts,
                    user_id: message.user.or(message.bot_id),
                    text,
                })
            }));

            cursor = response
                .response_metadata
                .and_then(|metadata| metadata.next_cursor)
                .filter(|value| !value.trim().is_empty());
            if cursor.is_none() {
                debug!(
                    channel_id,
                    thread_ts,
                    message_count = messages.len(),
                    "fetched slack thread"
                );
                return Ok(messages);
            }
        }

        bail!("slack conversations.replies exceeded {MAX_REPLIES_PAGES} pages")
    }

    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<SlackPostedMessage> {
        let mut payload = json!({
            "channel": channel,
            "text": text,
            "unfurl_links": false,
            "unfurl_media": false,
        });
        if let Some(thread_ts) = thread_ts.map(str::trim).filter(|value| !value.is_empty()) {
            payload["thread_ts"] = Value::String(thread_ts.to_string());
        }

        let response: SlackChatMessageResponse = self
            .request_json(
                "chat.postMessage",
                || {
                    self.http
                        .post(format!("{}/chat.postMessage", self.api_base))
                        .bearer_auth(&self.bot_token)
                        .json(&payload)
                },
            )
            .await?;

        if !response.ok {
            bail!(
                "slack chat.postMessage failed: {}",
                response
                    .error
                    .unwrap_or_else(|| "unknown error".to_string())
            );
        }

        Ok(SlackPostedMessage {
            channel: response.channel.unwrap_or_else(|| channel.to_string()),
            ts: response
                .ts
                .ok_or_else(|| anyhow!("slack chat.postMessage response missing ts"))?,
        })
    }

    pub async fn set_assistant_thread_title(
        &self,
        channel_id: &str,
        thread_ts: &str,
        title: &str,
    ) -> Result<()> {
        self.post_ack(
            "assistant.threads.setTitle",
            json!({ "channel_id": channel_id, "thread_ts": thread_ts, "title": title }),
        )
        .await
    }

    pub async fn set_assistant_thread_suggested_prompts(
        &self,
        channel_id: &str,
        thread_ts: &str,
        prompts: &[SuggestedPrompt],
    ) -> Result<()> {
        self.post_ack(
            "assistant.threads.setSuggestedPrompts",
            json!({ "channel_id": channel_id, "thread_ts": thread_ts, "prompts": prompts }),
        )
        .await
    }

    /// POSTs a JSON body to a Web API method whose only result is `ok`.
    async fn post_ack(&self, method: &str, payload: Value) -> Result<()> {
        let response: SlackAckResponse = self
            .request_json(method, || {
                self.http
                    .post(format!("{}/{method}", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
            })
            .await?;
        if !response.ok {
            bail!(
                "slack {method} failed: {}",
                response
                    .error
                    .unwrap_or_else(|| "unknown error".to_string())
            );
        }
        Ok(())
    }

    async fn request_json<T, F>(
        &self,
        operation: &str,
        mut builder: F,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder()
                .header(RETRY_ATTEMPT_HEADER, attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode slack {operation}"));
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts
                        && is_retryable_slack_status(status.as_u16())
                    {
                        debug!(operation, attempt, status = status.as_u16(), "retrying slack api call");
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    bail!(
                        "slack api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("slack api {operation} request failed"));
                }
            }
        }
    }
}

#[async_trait]
impl ThreadFetcher for SlackApiClient {
    async fn fetch_thread(&self, channel_id: &str, thread_ts: &str) -> Result<Vec<ThreadMessage>> {
        self.fetch_thread_messages(channel_id, thread_ts).await
    }
}

#[async_trait]
impl Responder for SlackApiClient {
    async fn post_reply(&self, target: &ReplyTarget, text: &str) -> Result<()> {
        self.post_message(&target.channel_id, text, target.thread_ts.as_deref())
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl AssistantThreadDecorator for SlackApiClient {
    async fn set_thread_title(&self, channel_id: &str, thread_ts: &str, title: &str) -> Result<()> {
        self.set_assistant_thread_title(channel_id, thread_ts, title)
            .await
    }

    async fn set_suggested_prompts(
        &self,
        channel_id: &str,
        thread_ts: &str,
        prompts: &[SuggestedPrompt],
    ) -> Result<()> {
        self.set_assistant_thread_suggested_prompts(channel_id, thread_ts, prompts)
            .await
    }
}

//! Outbound capabilities the executor depends on: reading a thread, posting a reply,
//! and decorating assistant threads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One message of a conversation thread, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub ts: String,
    pub user_id: Option<String>,
    pub text: String,
}

/// Where a reply is posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub channel_id: String,
    pub thread_ts: Option<String>,
}

#[async_trait]
pub trait ThreadFetcher: Send + Sync {
    async fn fetch_thread(
        &self,
        channel_id: &str,
        thread_ts: &str,
    ) -> anyhow::Result<Vec<ThreadMessage>>;
}

#[async_trait]
pub trait Responder: Send + Sync {
    async fn post_reply(&self, target: &ReplyTarget, text: &str) -> anyhow::Result<()>;
}

/// A clickable prompt shown at the top of an assistant thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedPrompt {
    pub title: String,
    pub message: String,
}

/// Sets the title and suggested prompts of an assistant thread.
#[async_trait]
pub trait AssistantThreadDecorator: Send + Sync {
    async fn set_thread_title(
        &self,
        channel_id: &str,
        thread_ts: &str,
        title: &str,
    ) -> anyhow::Result<()>;

    async fn set_suggested_prompts(
        &self,
        channel_id: &str,
        thread_ts: &str,
        prompts: &[SuggestedPrompt],
    ) -> anyhow::Result<()>;
}

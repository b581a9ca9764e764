//! Events API envelopes and the message events the assistant answers.

use relay_runs::AssistantContext;
use serde::Deserialize;
use serde_json::Value;

pub const URL_VERIFICATION: &str = "url_verification";
pub const EVENT_CALLBACK: &str = "event_callback";
pub const ASSISTANT_THREAD_STARTED: &str = "assistant_thread_started";
pub const ASSISTANT_THREAD_CONTEXT_CHANGED: &str = "assistant_thread_context_changed";

/// Subtypes that still carry user-authored text.
const TEXT_SUBTYPES: [&str; 2] = ["thread_broadcast", "file_share"];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SlackEnvelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub challenge: Option<String>,
    pub team_id: Option<String>,
    pub event_id: Option<String>,
    pub event: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AssistantThreadContext {
    pub channel_id: Option<String>,
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AssistantThread {
    pub user_id: Option<String>,
    pub channel_id: Option<String>,
    pub thread_ts: Option<String>,
    pub context: Option<AssistantThreadContext>,
}

/// The subset of an inner event the gateway reads. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub subtype: Option<String>,
    pub channel: Option<String>,
    pub channel_type: Option<String>,
    pub user: Option<String>,
    pub bot_id: Option<String>,
    pub text: Option<String>,
    pub ts: Option<String>,
    pub thread_ts: Option<String>,
    pub event_ts: Option<String>,
    pub team: Option<String>,
    pub assistant_thread: Option<AssistantThread>,
}

/// Assistant thread lifecycle events Slack sends outside of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantThreadLifecycle {
    Started,
    ContextChanged,
}

/// Channel and thread a reply is posted into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventThread {
    pub channel_id: String,
    pub thread_ts: String,
}

impl SlackEnvelope {
    pub fn parse(raw_body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw_body)
    }

    /// The inner event, when present and shaped like an object.
    pub fn slack_event(&self) -> Option<SlackEvent> {
        let event = self.event.as_ref()?;
        if !event.is_object() {
            return None;
        }
        serde_json::from_value(event.clone()).ok()
    }
}

impl SlackEvent {
    pub fn is_bot_message(&self) -> bool {
        self.bot_id.as_deref().is_some_and(|bot| !bot.is_empty())
            || self.subtype.as_deref() == Some("bot_message")
    }

    /// True for user-authored `app_mention` events and direct or group DM messages.
    pub fn is_actionable(&self) -> bool {
        if self.is_bot_message() {
            return false;
        }
        if let Some(subtype) = self.subtype.as_deref() {
            if !TEXT_SUBTYPES.contains(&subtype) {
                return false;
            }
        }
        match self.kind.as_str() {
            "app_mention" => true,
            "message" => matches!(self.channel_type.as_deref(), Some("im" | "mpim")),
            _ => false,
        }
    }

    pub fn assistant_thread_lifecycle(&self) -> Option<AssistantThreadLifecycle> {
        match self.kind.as_str() {
            ASSISTANT_THREAD_STARTED => Some(AssistantThreadLifecycle::Started),
            ASSISTANT_THREAD_CONTEXT_CHANGED => Some(AssistantThreadLifecycle::ContextChanged),
            _ => None,
        }
    }

    /// Slack user behind the event; thread lifecycle events carry it on the thread.
    pub fn actor_user_id(&self) -> Option<&str> {
        self.user
            .as_deref()
            .or_else(|| {
                self.assistant_thread
                    .as_ref()
                    .and_then(|thread| thread.user_id.as_deref())
            })
            .filter(|value| !value.trim().is_empty())
    }

    /// Timestamp of this event itself, unlike the thread it belongs to.
    pub fn own_ts(&self) -> Option<&str> {
        self.ts
            .as_deref()
            .or(self.event_ts.as_deref())
            .filter(|value| !value.trim().is_empty())
    }

    /// Assistant-thread coordinates win over the message's own channel and thread.
    pub fn reply_thread(&self) -> Option<EventThread> {
        let assistant = self.assistant_thread.as_ref();
        let channel_id = assistant
            .and_then(|thread| thread.channel_id.clone())
            .or_else(|| self.channel.clone())
            .filter(|value| !value.trim().is_empty())?;
        let thread_ts = assistant
            .and_then(|thread| thread.thread_ts.clone())
            .or_else(|| self.thread_ts.clone())
            .or_else(|| self.ts.clone())
            .filter(|value| !value.trim().is_empty())?;
        Some(EventThread {
            channel_id,
            thread_ts,
        })
    }

    pub fn assistant_context(&self, envelope_team_id: Option<&str>) -> AssistantContext {
        let context = self
            .assistant_thread
            .as_ref()
            .and_then(|thread| thread.context.as_ref());
        AssistantContext {
            source_channel_id: context.and_then(|context| context.channel_id.clone()),
            team_id: context
                .and_then(|context| context.team_id.clone())
                .or_else(|| self.team.clone())
                .or_else(|| envelope_team_id.map(str::to_string)),
        }
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

//! Slack transport for the relay gateway.
//!
//! Verifies signed requests, parses slash-command forms and Events API envelopes,
//! classifies assistant messages, and talks to the Slack Web API.

mod api_client;
mod command;
mod events;
mod intent;
mod reference;
mod retry;
mod signature;

pub use api_client::{
    SlackApiClient, SlackApiClientConfig, SlackPostedMessage, DEFAULT_SLACK_API_BASE,
    DEFAULT_SLACK_REQUEST_TIMEOUT_MS, DEFAULT_SLACK_RETRY_BASE_DELAY_MS,
    DEFAULT_SLACK_RETRY_MAX_ATTEMPTS,
};
pub use command::{command_id, SlashCommandForm};
pub use events::{
    AssistantThread, AssistantThreadContext, AssistantThreadLifecycle, EventThread,
    SlackEnvelope, SlackEvent, ASSISTANT_THREAD_CONTEXT_CHANGED, ASSISTANT_THREAD_STARTED,
    EVENT_CALLBACK, URL_VERIFICATION,
};
pub use intent::{strip_mentions, AssistantIntent};
pub use reference::{is_thread_ts, parse_thread_reference, ResolvedThread, ThreadReference};
pub use signature::{
    sign_slack_request, verify_slack_signature, SlackSignatureCheck,
    DEFAULT_SIGNATURE_TOLERANCE_SECONDS, SLACK_SIGNATURE_HEADER, SLACK_TIMESTAMP_HEADER,
};

#[cfg(test)]
mod tests;

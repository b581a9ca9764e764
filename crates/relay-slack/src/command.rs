//! Slash-command form bodies.

use sha2::{Digest, Sha256};
use url::form_urlencoded;

/// The `application/x-www-form-urlencoded` fields Slack posts for a slash command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlashCommandForm {
    pub team_id: Option<String>,
    pub team_domain: Option<String>,
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub command: Option<String>,
    pub text: Option<String>,
    pub response_url: Option<String>,
    pub trigger_id: Option<String>,
    pub thread_ts: Option<String>,
}

impl SlashCommandForm {
    /// Decodes the raw body. Unknown keys are ignored; the first occurrence of a key wins.
    pub fn parse(raw_body: &[u8]) -> Self {
        let mut form = Self::default();
        for (key, value) in form_urlencoded::parse(raw_body) {
            let slot = match key.as_ref() {
                "team_id" => &mut form.team_id,
                "team_domain" => &mut form.team_domain,
                "channel_id" => &mut form.channel_id,
                "channel_name" => &mut form.channel_name,
                "user_id" => &mut form.user_id,
                "user_name" => &mut form.user_name,
                "command" => &mut form.command,
                "text" => &mut form.text,
                "response_url" => &mut form.response_url,
                "trigger_id" => &mut form.trigger_id,
                "thread_ts" => &mut form.thread_ts,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        form
    }

    pub fn is_allowed(&self, allowed_commands: &[String]) -> bool {
        self.command
            .as_deref()
            .is_some_and(|command| allowed_commands.iter().any(|allowed| allowed == command))
    }
}

/// Stable id for a slash-command delivery; Slack retries resend the identical body.
pub fn command_id(raw_body: &[u8]) -> String {
    Sha256::digest(raw_body)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

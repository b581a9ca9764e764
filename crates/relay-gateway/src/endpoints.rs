//! Inbound route paths.

pub(crate) const SLACK_COMMANDS_ENDPOINT: &str = "/slack/commands";
pub(crate) const SLACK_EVENTS_ENDPOINT: &str = "/slack/events";
pub(crate) const HEALTHZ_ENDPOINT: &str = "/healthz";

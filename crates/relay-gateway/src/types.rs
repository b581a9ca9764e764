use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_core::Clock;
use relay_runs::{AssistantContextCache, DedupCache, RunLifecycleManager, WorkflowDispatcher};
use relay_slack::DEFAULT_SIGNATURE_TOLERANCE_SECONDS;
use serde::Serialize;

pub(crate) const MISSING_REFERENCE_TEXT: &str =
    "Please provide a Slack thread permalink or thread timestamp in the command text.";
pub(crate) const WORKSPACE_NOT_CONFIGURED_TEXT: &str =
    "Workspace is not configured. Set DEFAULT_WORKSPACE_ID or map this Slack team in the database.";
pub(crate) const QUEUED_TEXT: &str = "Queued. I will post a summary in this thread shortly.";
pub(crate) const ALREADY_QUEUED_TEXT: &str =
    "This request is already being handled. I will post the summary in the thread.";

/// Intake settings. Secrets are held here and never logged.
#[derive(Clone)]
pub struct GatewayConfig {
    pub signing_secret: String,
    pub allowed_commands: Vec<String>,
    pub default_workspace_id: Option<String>,
    pub signature_tolerance_seconds: u64,
}

impl GatewayConfig {
    pub fn new(signing_secret: impl Into<String>, allowed_commands: Vec<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            allowed_commands,
            default_workspace_id: None,
            signature_tolerance_seconds: DEFAULT_SIGNATURE_TOLERANCE_SECONDS,
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("signing_secret", &"<redacted>")
            .field("allowed_commands", &self.allowed_commands)
            .field("default_workspace_id", &self.default_workspace_id)
            .field("signature_tolerance_seconds", &self.signature_tolerance_seconds)
            .finish()
    }
}

/// Shared state behind every inbound route.
pub struct GatewayState {
    pub(crate) config: GatewayConfig,
    pub(crate) lifecycle: RunLifecycleManager,
    pub(crate) dedup: Arc<dyn DedupCache>,
    pub(crate) dispatcher: Arc<dyn WorkflowDispatcher>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) assistant_contexts: AssistantContextCache,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        lifecycle: RunLifecycleManager,
        dedup: Arc<dyn DedupCache>,
        dispatcher: Arc<dyn WorkflowDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            lifecycle,
            dedup,
            dispatcher,
            clock,
            assistant_contexts: AssistantContextCache::default(),
        }
    }
}

/// Immediate slash-command acknowledgement.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SlashCommandReply {
    response_type: &'static str,
    text: String,
}

impl SlashCommandReply {
    pub(crate) fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: "ephemeral",
            text: text.into(),
        }
    }
}

impl IntoResponse for SlashCommandReply {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntakeSurface {
    Command,
    Event,
}

/// Why an inbound request was not turned into a queued run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum IntakeRejection {
    Authentication,
    Parse(&'static str),
    UnsupportedCommand { allowed: Vec<String> },
    ReferenceResolution,
    WorkspaceResolution,
    Enqueue { surface: IntakeSurface, reason: String },
}

impl IntoResponse for IntakeRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Authentication => {
                (StatusCode::UNAUTHORIZED, "Invalid Slack signature").into_response()
            }
            Self::Parse(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::UnsupportedCommand { allowed } => SlashCommandReply::ephemeral(format!(
                "Unsupported command. Allowed: {}",
                allowed.join(", ")
            ))
            .into_response(),
            Self::ReferenceResolution => {
                SlashCommandReply::ephemeral(MISSING_REFERENCE_TEXT).into_response()
            }
            Self::WorkspaceResolution => {
                SlashCommandReply::ephemeral(WORKSPACE_NOT_CONFIGURED_TEXT).into_response()
            }
            Self::Enqueue {
                surface: IntakeSurface::Command,
                reason,
            } => SlashCommandReply::ephemeral(format!("Failed to queue summary: {reason}"))
                .into_response(),
            Self::Enqueue {
                surface: IntakeSurface::Event,
                ..
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to queue assistant event",
            )
                .into_response(),
        }
    }
}

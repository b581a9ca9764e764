//! Steps shared by the command and event intake paths.

use axum::http::HeaderMap;
use relay_runs::{DispatchError, JobPayload, LifecycleError, ReplyTarget};
use relay_slack::{
    verify_slack_signature, SlackSignatureCheck, SLACK_SIGNATURE_HEADER, SLACK_TIMESTAMP_HEADER,
};
use relay_store::{Run, RunClaim, RunStatus};
use tracing::{debug, warn};

use crate::types::{GatewayState, IntakeRejection, IntakeSurface};

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Rejects the request before any state is touched unless it carries a fresh Slack signature.
pub(crate) fn authenticate(
    state: &GatewayState,
    headers: &HeaderMap,
    raw_body: &[u8],
) -> Result<(), IntakeRejection> {
    let verified = verify_slack_signature(&SlackSignatureCheck {
        signing_secret: &state.config.signing_secret,
        raw_body,
        signature: header_value(headers, SLACK_SIGNATURE_HEADER),
        timestamp: header_value(headers, SLACK_TIMESTAMP_HEADER),
        now_unix_seconds: state.clock.now_unix_seconds(),
        tolerance_seconds: state.config.signature_tolerance_seconds,
    });
    if verified {
        Ok(())
    } else {
        debug!("rejected request with invalid slack signature");
        Err(IntakeRejection::Authentication)
    }
}

/// Maps a Slack team to a workspace, falling back to the configured default.
pub(crate) async fn resolve_workspace_id(
    state: &GatewayState,
    team_id: Option<&str>,
) -> Result<Option<String>, LifecycleError> {
    if let Some(team_id) = team_id.filter(|value| !value.trim().is_empty()) {
        if let Some(workspace) = state
            .lifecycle
            .repository()
            .workspace_by_team_id(team_id)
            .await?
        {
            return Ok(Some(workspace.id));
        }
    }
    Ok(state
        .config
        .default_workspace_id
        .clone()
        .filter(|value| !value.trim().is_empty()))
}

pub(crate) async fn resolve_user_id(
    state: &GatewayState,
    workspace_id: &str,
    slack_user_id: Option<&str>,
) -> Result<Option<String>, LifecycleError> {
    let Some(slack_user_id) = slack_user_id.filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };
    Ok(state
        .lifecycle
        .repository()
        .user_by_slack_user_id(workspace_id, slack_user_id)
        .await?
        .map(|user| user.id))
}

/// Hands a run to the worker pool unless an earlier delivery already started it.
pub(crate) async fn dispatch_run(
    state: &GatewayState,
    run: &Run,
    created: bool,
    reply: ReplyTarget,
    actor_id: Option<String>,
) -> Result<(), DispatchError> {
    if !created && run.status != RunStatus::Queued {
        debug!(
            run_id = %run.id,
            status = run.status.as_str(),
            "run already started; not enqueuing again"
        );
        return Ok(());
    }
    state
        .dispatcher
        .enqueue(JobPayload {
            run_id: run.id.clone(),
            workspace_id: run.workspace_id.clone(),
            task_kind: run.task_kind,
            reply,
            initiated_by_user_id: run.initiated_by_user_id.clone(),
            actor_id,
            claim: RunClaim::Fresh,
        })
        .await
}

pub(crate) fn lifecycle_rejection(surface: IntakeSurface, error: &LifecycleError) -> IntakeRejection {
    warn!(error = %error, "run intake failed");
    IntakeRejection::Enqueue {
        surface,
        reason: "internal storage error".to_string(),
    }
}

pub(crate) fn dispatch_rejection(surface: IntakeSurface, error: &DispatchError) -> IntakeRejection {
    warn!(error = %error, retryable = error.is_retryable(), "run dispatch failed");
    IntakeRejection::Enqueue {
        surface,
        reason: error.to_string(),
    }
}

//! Slash-command intake: verify, parse, resolve, create the run, enqueue, acknowledge.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use relay_runs::{
    idempotency_key, AuditActor, CreateRunRequest, ReplyTarget, RunInput, ThreadSummaryTask,
};
use relay_slack::{command_id, parse_thread_reference, ResolvedThread, SlashCommandForm};
use relay_store::{TaskKind, TriggerSource};
use tracing::{info, warn};

use crate::intake::{
    authenticate, dispatch_rejection, dispatch_run, lifecycle_rejection, resolve_user_id,
    resolve_workspace_id,
};
use crate::types::{
    GatewayState, IntakeRejection, IntakeSurface, SlashCommandReply, ALREADY_QUEUED_TEXT,
    QUEUED_TEXT,
};

const SURFACE: IntakeSurface = IntakeSurface::Command;

pub(crate) async fn handle_slack_command(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match accept_command(&state, &headers, &body).await {
        Ok(reply) => reply.into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn accept_command(
    state: &GatewayState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<SlashCommandReply, IntakeRejection> {
    authenticate(state, headers, body)?;

    let form = SlashCommandForm::parse(body);
    if !form.is_allowed(&state.config.allowed_commands) {
        return Err(IntakeRejection::UnsupportedCommand {
            allowed: state.config.allowed_commands.clone(),
        });
    }

    let thread = parse_thread_reference(form.text.as_deref().unwrap_or_default())
        .resolve(form.channel_id.as_deref(), form.thread_ts.as_deref())
        .ok_or(IntakeRejection::ReferenceResolution)?;

    let workspace_id = resolve_workspace_id(state, form.team_id.as_deref())
        .await
        .map_err(|error| lifecycle_rejection(SURFACE, &error))?
        .ok_or(IntakeRejection::WorkspaceResolution)?;

    let command_id = command_id(body);
    let key = idempotency_key(TriggerSource::Chat, &command_id);
    let dedup_key = format!("command:{command_id}");
    if !state.dedup.try_start(&dedup_key).await {
        return Ok(duplicate_reply(state, &workspace_id, &key).await);
    }

    let request = CommandRequest {
        workspace_id,
        idempotency_key: key,
        command_id,
        thread,
    };
    match queue_summary_run(state, &form, request).await {
        Ok(run_id) => {
            state.dedup.mark_done(&dedup_key).await;
            Ok(SlashCommandReply::ephemeral(format!(
                "{QUEUED_TEXT} (run: {run_id})"
            )))
        }
        Err(rejection) => {
            state.dedup.mark_failed(&dedup_key).await;
            Err(rejection)
        }
    }
}

struct CommandRequest {
    workspace_id: String,
    idempotency_key: String,
    command_id: String,
    thread: ResolvedThread,
}

async fn queue_summary_run(
    state: &GatewayState,
    form: &SlashCommandForm,
    request: CommandRequest,
) -> Result<String, IntakeRejection> {
    let initiated_by_user_id =
        resolve_user_id(state, &request.workspace_id, form.user_id.as_deref())
            .await
            .map_err(|error| lifecycle_rejection(SURFACE, &error))?;

    let reply = ReplyTarget {
        channel_id: request.thread.channel_id.clone(),
        thread_ts: Some(request.thread.thread_ts.clone()),
    };
    let input = ThreadSummaryTask {
        channel_id: request.thread.channel_id,
        thread_ts: request.thread.thread_ts,
        command_id: Some(request.command_id),
        reply: Some(reply.clone()),
    }
    .to_input()
    .map_err(|error| {
        warn!(error = %error, "failed to encode thread summary input");
        IntakeRejection::Enqueue {
            surface: SURFACE,
            reason: "invalid run input".to_string(),
        }
    })?;

    let insert = state
        .lifecycle
        .create_run(CreateRunRequest {
            workspace_id: request.workspace_id,
            idempotency_key: request.idempotency_key,
            task_kind: TaskKind::ThreadSummary,
            trigger_source: TriggerSource::Chat,
            initiated_by_user_id: initiated_by_user_id.clone(),
            input,
            actor: AuditActor::chat(form.user_id.clone(), initiated_by_user_id),
        })
        .await
        .map_err(|error| lifecycle_rejection(SURFACE, &error))?;

    dispatch_run(state, &insert.run, insert.created, reply, form.user_id.clone())
        .await
        .map_err(|error| dispatch_rejection(SURFACE, &error))?;

    info!(
        run_id = %insert.run.id,
        workspace_id = %insert.run.workspace_id,
        created = insert.created,
        "slash command queued"
    );
    Ok(insert.run.id)
}

async fn duplicate_reply(state: &GatewayState, workspace_id: &str, key: &str) -> SlashCommandReply {
    match state.lifecycle.find_run(workspace_id, key).await {
        Ok(Some(run)) => {
            SlashCommandReply::ephemeral(format!("{ALREADY_QUEUED_TEXT} (run: {})", run.id))
        }
        Ok(None) => SlashCommandReply::ephemeral(ALREADY_QUEUED_TEXT),
        Err(error) => {
            warn!(error = %error, "failed to look up duplicate command run");
            SlashCommandReply::ephemeral(ALREADY_QUEUED_TEXT)
        }
    }
}

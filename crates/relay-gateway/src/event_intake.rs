//! Events API intake for assistant messages, mentions, and assistant thread lifecycle.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_runs::{
    idempotency_key, AssistantContext, AssistantReplyTask, AssistantRequest, AuditActor,
    CreateRunRequest, ReplyTarget, RunInput, ThreadSummaryTask,
};
use relay_slack::{
    AssistantIntent, AssistantThreadLifecycle, EventThread, SlackEnvelope, SlackEvent,
    EVENT_CALLBACK, URL_VERIFICATION,
};
use relay_store::{TaskKind, TriggerSource};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::intake::{
    authenticate, dispatch_rejection, dispatch_run, lifecycle_rejection, resolve_user_id,
    resolve_workspace_id,
};
use crate::types::{GatewayState, IntakeRejection, IntakeSurface};

const SURFACE: IntakeSurface = IntakeSurface::Event;

pub(crate) async fn handle_slack_event(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match accept_event(&state, &headers, &body).await {
        Ok(response) => response,
        Err(rejection) => rejection.into_response(),
    }
}

fn ok_response() -> Response {
    (StatusCode::OK, "OK").into_response()
}

async fn accept_event(
    state: &GatewayState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, IntakeRejection> {
    authenticate(state, headers, body)?;

    let envelope = match serde_json::from_slice::<Value>(body) {
        Ok(value) if value.is_object() => serde_json::from_value::<SlackEnvelope>(value)
            .map_err(|_| IntakeRejection::Parse("Invalid JSON payload"))?,
        _ => return Err(IntakeRejection::Parse("Invalid JSON payload")),
    };

    if envelope.kind == URL_VERIFICATION {
        let challenge = envelope
            .challenge
            .filter(|value| !value.is_empty())
            .ok_or(IntakeRejection::Parse("Missing challenge"))?;
        return Ok(Json(json!({ "challenge": challenge })).into_response());
    }
    if envelope.kind != EVENT_CALLBACK {
        return Ok(ok_response());
    }
    let Some(event) = envelope.slack_event() else {
        return Ok(ok_response());
    };

    let dedup_key = envelope
        .event_id
        .as_deref()
        .filter(|value| !value.is_empty())
        .map(|event_id| format!("event:{event_id}"));
    if let Some(dedup_key) = dedup_key.as_deref() {
        if !state.dedup.try_start(dedup_key).await {
            debug!(dedup_key, "duplicate slack event ignored");
            return Ok(ok_response());
        }
    }

    let result = queue_event_run(state, &envelope, &event).await;
    if let Some(dedup_key) = dedup_key.as_deref() {
        match &result {
            Ok(()) => state.dedup.mark_done(dedup_key).await,
            Err(_) => state.dedup.mark_failed(dedup_key).await,
        }
    }
    result.map(|()| ok_response())
}

async fn queue_event_run(
    state: &GatewayState,
    envelope: &SlackEnvelope,
    event: &SlackEvent,
) -> Result<(), IntakeRejection> {
    let thread_lifecycle = event.assistant_thread_lifecycle();
    if thread_lifecycle.is_none() && !event.is_actionable() {
        debug!(event_type = %event.kind, "ignoring non-actionable slack event");
        return Ok(());
    }
    let Some(reply_thread) = event.reply_thread() else {
        debug!(event_type = %event.kind, "slack event has no reply thread");
        return Ok(());
    };

    let team_id = envelope.team_id.as_deref().or(event.team.as_deref());
    let workspace_id = match resolve_workspace_id(state, team_id)
        .await
        .map_err(|error| lifecycle_rejection(SURFACE, &error))?
    {
        Some(workspace_id) => workspace_id,
        None => {
            warn!(team_id = team_id.unwrap_or_default(), "no workspace for slack event");
            return Ok(());
        }
    };

    let request_id = envelope
        .event_id
        .clone()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| {
            let own_ts = event.own_ts().unwrap_or(reply_thread.thread_ts.as_str());
            format!("{}:{own_ts}", reply_thread.channel_id)
        });
    let reply = ReplyTarget {
        channel_id: reply_thread.channel_id.clone(),
        thread_ts: Some(reply_thread.thread_ts.clone()),
    };
    let (task_kind, input) = match thread_lifecycle {
        Some(thread_lifecycle) => {
            thread_lifecycle_task(state, envelope, event, &reply_thread, thread_lifecycle, &reply)
        }
        None => event_task(state, envelope, event, &reply_thread, &reply)?,
    };
    let input = input.map_err(|error| {
        warn!(error = %error, "failed to encode event run input");
        IntakeRejection::Enqueue {
            surface: SURFACE,
            reason: "invalid run input".to_string(),
        }
    })?;

    let actor_user_id = event.actor_user_id().map(str::to_string);
    let initiated_by_user_id = resolve_user_id(state, &workspace_id, actor_user_id.as_deref())
        .await
        .map_err(|error| lifecycle_rejection(SURFACE, &error))?;
    let insert = state
        .lifecycle
        .create_run(CreateRunRequest {
            workspace_id,
            idempotency_key: idempotency_key(TriggerSource::Chat, &request_id),
            task_kind,
            trigger_source: TriggerSource::Chat,
            initiated_by_user_id: initiated_by_user_id.clone(),
            input,
            actor: AuditActor::chat(actor_user_id.clone(), initiated_by_user_id),
        })
        .await
        .map_err(|error| lifecycle_rejection(SURFACE, &error))?;

    dispatch_run(state, &insert.run, insert.created, reply, actor_user_id)
        .await
        .map_err(|error| dispatch_rejection(SURFACE, &error))?;

    info!(
        run_id = %insert.run.id,
        task_kind = task_kind.as_str(),
        created = insert.created,
        "slack event queued"
    );
    Ok(())
}

type EncodedTask = (TaskKind, serde_json::Result<Value>);

/// Remembers the thread's context and queues the title, prompts, and kickoff run.
fn thread_lifecycle_task(
    state: &GatewayState,
    envelope: &SlackEnvelope,
    event: &SlackEvent,
    reply_thread: &EventThread,
    thread_lifecycle: AssistantThreadLifecycle,
    reply: &ReplyTarget,
) -> EncodedTask {
    let context = event.assistant_context(envelope.team_id.as_deref());
    state.assistant_contexts.remember(
        &reply_thread.channel_id,
        &reply_thread.thread_ts,
        context.clone(),
    );
    let request = match thread_lifecycle {
        AssistantThreadLifecycle::Started => AssistantRequest::ThreadStarted,
        AssistantThreadLifecycle::ContextChanged => AssistantRequest::ContextChanged,
    };
    let task = AssistantReplyTask {
        request,
        context,
        reply: Some(reply.clone()),
    };
    (TaskKind::AssistantReply, task.to_input())
}

/// Chooses the task for an actionable event from its classified intent.
fn event_task(
    state: &GatewayState,
    envelope: &SlackEnvelope,
    event: &SlackEvent,
    reply_thread: &EventThread,
    reply: &ReplyTarget,
) -> Result<EncodedTask, IntakeRejection> {
    match AssistantIntent::classify(event.text()) {
        AssistantIntent::Summarize(reference) => {
            let Some(target) = reference.resolve(Some(&reply_thread.channel_id), None) else {
                return Err(IntakeRejection::ReferenceResolution);
            };
            let task = ThreadSummaryTask {
                channel_id: target.channel_id,
                thread_ts: target.thread_ts,
                command_id: None,
                reply: Some(reply.clone()),
            };
            Ok((TaskKind::ThreadSummary, task.to_input()))
        }
        other => {
            let Some(request) = other.assistant_request() else {
                return Err(IntakeRejection::ReferenceResolution);
            };
            let task = AssistantReplyTask {
                request,
                context: message_context(state, envelope, event, reply_thread),
                reply: Some(reply.clone()),
            };
            Ok((TaskKind::AssistantReply, task.to_input()))
        }
    }
}

/// Messages only carry the assistant context when Slack attaches the thread; otherwise
/// the context remembered when the thread started is used.
fn message_context(
    state: &GatewayState,
    envelope: &SlackEnvelope,
    event: &SlackEvent,
    reply_thread: &EventThread,
) -> AssistantContext {
    let context = event.assistant_context(envelope.team_id.as_deref());
    if context.source_channel_id.is_some() {
        return context;
    }
    match state
        .assistant_contexts
        .get(&reply_thread.channel_id, &reply_thread.thread_ts)
    {
        Some(remembered) => AssistantContext {
            source_channel_id: remembered.source_channel_id,
            team_id: remembered.team_id.or(context.team_id),
        },
        None => context,
    }
}

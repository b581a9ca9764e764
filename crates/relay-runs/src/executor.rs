//! Runs one job end to end: fetch, produce, persist, complete, then deliver.

use std::sync::Arc;

use async_trait::async_trait;
use relay_store::{MessageRole, NewMessage, Run, RunStatus, TaskKind};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::assistant::{default_suggested_prompts, ReplyStrategy, ASSISTANT_THREAD_TITLE};
use crate::capabilities::{AssistantThreadDecorator, ReplyTarget, Responder, ThreadFetcher};
use crate::dispatch::{JobHandler, JobPayload};
use crate::lifecycle::{AuditActor, LifecycleError, RunLifecycleManager};
use crate::summary::{format_thread_summary_for_slack, SummaryStrategy, ThreadSummaryInput};
use crate::tasks::{AssistantReplyTask, RunInput, ThreadSummaryTask};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("run '{run_id}' has invalid input: {message}")]
    InvalidInput { run_id: String, message: String },
    #[error("thread fetch failed: {0}")]
    Fetch(String),
}

/// What happened to the reply of a succeeded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Posted,
    /// Posting failed; the run stays `succeeded` and the failure is audited.
    Failed,
    /// The run produced nothing to post.
    NotNeeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed { run_id: String, delivery: Delivery },
    /// The run had already finished; nothing was executed.
    AlreadyTerminal { run_id: String, status: RunStatus },
    /// Another worker claimed the run first; nothing was executed.
    ClaimedElsewhere { run_id: String, status: RunStatus },
}

/// Result of a run that has been marked `succeeded`.
struct PreparedReply {
    text: Option<String>,
    completed: Value,
    decorate_thread: bool,
}

pub struct JobExecutor {
    lifecycle: RunLifecycleManager,
    fetcher: Arc<dyn ThreadFetcher>,
    responder: Arc<dyn Responder>,
    decorator: Option<Arc<dyn AssistantThreadDecorator>>,
    summaries: SummaryStrategy,
    replies: ReplyStrategy,
}

impl JobExecutor {
    pub fn new(
        lifecycle: RunLifecycleManager,
        fetcher: Arc<dyn ThreadFetcher>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        Self {
            lifecycle,
            fetcher,
            responder,
            decorator: None,
            summaries: SummaryStrategy::local_only(),
            replies: ReplyStrategy::deterministic_only(),
        }
    }

    pub fn with_summary_strategy(mut self, summaries: SummaryStrategy) -> Self {
        self.summaries = summaries;
        self
    }

    pub fn with_reply_strategy(mut self, replies: ReplyStrategy) -> Self {
        self.replies = replies;
        self
    }

    pub fn with_thread_decorator(mut self, decorator: Arc<dyn AssistantThreadDecorator>) -> Self {
        self.decorator = Some(decorator);
        self
    }

    #[instrument(
        skip(self, job),
        fields(run_id = %job.run_id, task_kind = job.task_kind.as_str())
    )]
    pub async fn execute(&self, job: &JobPayload) -> Result<ExecutionOutcome, TaskError> {
        let run = self.lifecycle.get_run(&job.run_id).await?;
        if run.status.is_terminal() {
            info!(status = run.status.as_str(), "skipping job for finished run");
            return Ok(ExecutionOutcome::AlreadyTerminal {
                run_id: run.id,
                status: run.status,
            });
        }

        let Some(run) = self.lifecycle.claim_run(&run.id, job.claim).await? else {
            let current = self.lifecycle.get_run(&job.run_id).await?;
            info!(status = current.status.as_str(), "run claimed by another worker");
            if current.status.is_terminal() {
                return Ok(ExecutionOutcome::AlreadyTerminal {
                    run_id: current.id,
                    status: current.status,
                });
            }
            return Ok(ExecutionOutcome::ClaimedElsewhere {
                run_id: current.id,
                status: current.status,
            });
        };
        let actor = AuditActor {
            user_id: run.initiated_by_user_id.clone(),
            ..AuditActor::system()
        };

        let prepared = match self.perform(&run, job, &actor).await {
            Ok(prepared) => prepared,
            Err(task_error) => {
                self.record_failure(&run, &actor, &task_error).await;
                return Err(task_error);
            }
        };

        // The run is `succeeded` from here on; later errors are logged, never failures.
        if let Err(audit_error) = self
            .lifecycle
            .record_audit(&run, &actor, "completed", prepared.completed)
            .await
        {
            warn!(error = %audit_error, "failed to audit run completion");
        }
        if prepared.decorate_thread {
            self.decorate_thread(&job.reply).await;
        }

        let delivery = match &prepared.text {
            None => Delivery::NotNeeded,
            Some(text) => self.deliver(&run, &actor, &job.reply, text).await,
        };

        info!(?delivery, "run completed");
        Ok(ExecutionOutcome::Completed {
            run_id: run.id,
            delivery,
        })
    }

    async fn deliver(
        &self,
        run: &Run,
        actor: &AuditActor,
        reply: &ReplyTarget,
        text: &str,
    ) -> Delivery {
        let Err(delivery_error) = self.responder.post_reply(reply, text).await else {
            return Delivery::Posted;
        };
        let message = format!("{delivery_error:#}");
        warn!(error = %message, "reply delivery failed after run succeeded");
        if let Err(audit_error) = self
            .lifecycle
            .record_audit(run, actor, "delivery_failed", json!({ "error": message }))
            .await
        {
            warn!(error = %audit_error, "failed to audit delivery failure");
        }
        Delivery::Failed
    }

    async fn decorate_thread(&self, reply: &ReplyTarget) {
        let (Some(decorator), Some(thread_ts)) = (&self.decorator, reply.thread_ts.as_deref())
        else {
            return;
        };
        if let Err(title_error) = decorator
            .set_thread_title(&reply.channel_id, thread_ts, ASSISTANT_THREAD_TITLE)
            .await
        {
            warn!(error = %format!("{title_error:#}"), "failed to set assistant thread title");
        }
        if let Err(prompt_error) = decorator
            .set_suggested_prompts(&reply.channel_id, thread_ts, &default_suggested_prompts())
            .await
        {
            warn!(error = %format!("{prompt_error:#}"), "failed to set suggested prompts");
        }
    }

    async fn perform(
        &self,
        run: &Run,
        job: &JobPayload,
        actor: &AuditActor,
    ) -> Result<PreparedReply, TaskError> {
        match run.task_kind {
            TaskKind::ThreadSummary => self.perform_thread_summary(run, job, actor).await,
            TaskKind::AssistantReply => self.perform_assistant_reply(run, job, actor).await,
        }
    }

    async fn perform_thread_summary(
        &self,
        run: &Run,
        job: &JobPayload,
        actor: &AuditActor,
    ) -> Result<PreparedReply, TaskError> {
        let task = ThreadSummaryTask::from_run(run)?;
        let messages = self
            .fetcher
            .fetch_thread(&task.channel_id, &task.thread_ts)
            .await
            .map_err(|error| TaskError::Fetch(format!("{error:#}")))?;
        let message_count = messages.len();

        let resolution = self
            .summaries
            .summarize(&ThreadSummaryInput {
                channel_id: task.channel_id.clone(),
                thread_ts: task.thread_ts.clone(),
                messages,
            })
            .await;
        if let Some(fallback_error) = &resolution.fallback_error {
            warn!(error = %fallback_error, "enhanced summarizer failed; used local heuristic");
            self.lifecycle
                .record_audit(run, actor, "llm_fallback", json!({ "error": fallback_error }))
                .await?;
        }

        let summary = &resolution.summary;
        let text = format_thread_summary_for_slack(summary);
        let output = json!({
            "summary": summary.summary,
            "decisions": summary.decisions,
            "blockers": summary.blockers,
            "next_actions": summary.next_actions,
            "mode": resolution.mode.as_str(),
        });
        self.record_reply(run, job, &text, output.clone()).await?;

        self.lifecycle.mark_succeeded(&run.id, output).await?;
        Ok(PreparedReply {
            text: Some(text),
            completed: json!({
                "message_count": message_count,
                "decisions": summary.decisions.len(),
                "blockers": summary.blockers.len(),
                "next_actions": summary.next_actions.len(),
            }),
            decorate_thread: false,
        })
    }

    async fn perform_assistant_reply(
        &self,
        run: &Run,
        job: &JobPayload,
        actor: &AuditActor,
    ) -> Result<PreparedReply, TaskError> {
        let task = AssistantReplyTask::from_run(run)?;

        let mut history = Vec::new();
        if self.replies.wants_thread_history(&task.request) {
            if let Some(thread_ts) = job.reply.thread_ts.as_deref() {
                match self
                    .fetcher
                    .fetch_thread(&job.reply.channel_id, thread_ts)
                    .await
                {
                    Ok(messages) => history = messages,
                    Err(fetch_error) => warn!(
                        error = %format!("{fetch_error:#}"),
                        "failed to fetch thread history; replying without it"
                    ),
                }
            }
        }
        let history_count = history.len();

        if !task.request.expects_reply() {
            self.lifecycle
                .mark_succeeded(
                    &run.id,
                    json!({ "request": task.request.kind(), "mode": "none", "reply": null }),
                )
                .await?;
            return Ok(PreparedReply {
                text: None,
                completed: json!({ "request": task.request.kind(), "reply_chars": 0 }),
                decorate_thread: task.request.decorates_thread(),
            });
        }

        let resolution = self
            .replies
            .reply(&task.request, &task.context, history)
            .await;
        if let Some(fallback_error) = &resolution.fallback_error {
            warn!(error = %fallback_error, "reply generator failed; used deterministic reply");
            self.lifecycle
                .record_audit(run, actor, "llm_fallback", json!({ "error": fallback_error }))
                .await?;
        }

        let output = json!({
            "request": task.request.kind(),
            "mode": resolution.mode.as_str(),
            "reply": resolution.text,
        });
        self.record_reply(run, job, &resolution.text, output.clone())
            .await?;

        self.lifecycle.mark_succeeded(&run.id, output).await?;
        Ok(PreparedReply {
            completed: json!({
                "request": task.request.kind(),
                "mode": resolution.mode.as_str(),
                "history_messages": history_count,
                "reply_chars": resolution.text.chars().count(),
            }),
            decorate_thread: task.request.decorates_thread(),
            text: Some(resolution.text),
        })
    }

    async fn record_reply(
        &self,
        run: &Run,
        job: &JobPayload,
        text: &str,
        payload: Value,
    ) -> Result<(), TaskError> {
        self.lifecycle
            .record_message(NewMessage {
                workspace_id: run.workspace_id.clone(),
                run_id: Some(run.id.clone()),
                user_id: run.initiated_by_user_id.clone(),
                source: run.trigger_source,
                role: MessageRole::Assistant,
                channel_id: Some(job.reply.channel_id.clone()),
                thread_ts: job.reply.thread_ts.clone(),
                external_message_id: Some(reply_message_key(&run.id)),
                content: text.to_string(),
                payload,
                created_at: self.lifecycle.now(),
            })
            .await?;
        Ok(())
    }

    async fn record_failure(&self, run: &Run, actor: &AuditActor, task_error: &TaskError) {
        let message = task_error.to_string();
        error!(error = %message, "run failed");
        match self.lifecycle.mark_failed(&run.id, &message).await {
            Ok(failed) => {
                if let Err(audit_error) = self
                    .lifecycle
                    .record_audit(&failed, actor, "failed", json!({ "error": message }))
                    .await
                {
                    warn!(error = %audit_error, "failed to audit run failure");
                }
            }
            Err(transition_error) => {
                warn!(error = %transition_error, "failed to mark run as failed");
            }
        }
    }
}

/// One reply message per run, so a resumed run cannot record its reply twice.
fn reply_message_key(run_id: &str) -> String {
    format!("reply:{run_id}")
}

#[async_trait]
impl JobHandler for JobExecutor {
    async fn handle(&self, job: JobPayload) {
        if let Err(task_error) = self.execute(&job).await {
            warn!(run_id = %job.run_id, error = %task_error, "job finished with error");
        }
    }
}

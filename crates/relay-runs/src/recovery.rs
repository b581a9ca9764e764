//! Startup recovery: re-enqueues runs that were accepted but never finished.

use relay_store::{Run, RunClaim, RunStatus, TaskKind};
use serde_json::json;
use tracing::{info, warn};

use crate::capabilities::ReplyTarget;
use crate::dispatch::{JobPayload, WorkflowDispatcher};
use crate::executor::TaskError;
use crate::lifecycle::{AuditActor, LifecycleError, RunLifecycleManager};
use crate::tasks::{AssistantReplyTask, RunInput, ThreadSummaryTask};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub enqueued: usize,
    /// Runs whose stored input could not rebuild a job; they were closed out.
    pub abandoned: usize,
    /// Runs left pending because the queue stopped accepting work.
    pub deferred: usize,
}

/// Rebuilds the job for a stored run. Runs found `running` are resumed.
pub fn job_for_run(run: &Run) -> Result<JobPayload, TaskError> {
    let reply = match run.task_kind {
        TaskKind::ThreadSummary => ThreadSummaryTask::from_run(run)?.reply_target(),
        TaskKind::AssistantReply => stored_reply(run, AssistantReplyTask::from_run(run)?.reply)?,
    };
    let claim = if run.status == RunStatus::Running {
        RunClaim::Resume
    } else {
        RunClaim::Fresh
    };
    Ok(JobPayload {
        run_id: run.id.clone(),
        workspace_id: run.workspace_id.clone(),
        task_kind: run.task_kind,
        reply,
        initiated_by_user_id: run.initiated_by_user_id.clone(),
        actor_id: None,
        claim,
    })
}

fn stored_reply(run: &Run, reply: Option<ReplyTarget>) -> Result<ReplyTarget, TaskError> {
    reply.ok_or_else(|| TaskError::InvalidInput {
        run_id: run.id.clone(),
        message: "missing reply target".to_string(),
    })
}

/// Enqueues every `queued` and `running` run, oldest first.
///
/// Stops at the first dispatch error; the remaining runs stay pending for the next start.
pub async fn recover_pending_runs(
    lifecycle: &RunLifecycleManager,
    dispatcher: &dyn WorkflowDispatcher,
) -> Result<RecoveryReport, LifecycleError> {
    let pending = lifecycle.pending_runs().await?;
    let mut report = RecoveryReport::default();

    for (index, run) in pending.iter().enumerate() {
        let job = match job_for_run(run) {
            Ok(job) => job,
            Err(task_error) => {
                abandon(lifecycle, run, &task_error).await;
                report.abandoned += 1;
                continue;
            }
        };
        let resumed = job.claim == RunClaim::Resume;
        if let Err(dispatch_error) = dispatcher.enqueue(job).await {
            warn!(run_id = %run.id, error = %dispatch_error, "stopping run recovery");
            report.deferred = pending.len() - index;
            break;
        }
        if resumed {
            if let Err(audit_error) = lifecycle
                .record_audit(run, &AuditActor::system(), "recovered", json!({ "status": "running" }))
                .await
            {
                warn!(run_id = %run.id, error = %audit_error, "failed to audit run recovery");
            }
        }
        report.enqueued += 1;
    }

    info!(
        enqueued = report.enqueued,
        abandoned = report.abandoned,
        deferred = report.deferred,
        "run recovery finished"
    );
    Ok(report)
}

async fn abandon(lifecycle: &RunLifecycleManager, run: &Run, task_error: &TaskError) {
    let message = task_error.to_string();
    warn!(run_id = %run.id, error = %message, "cannot recover run");
    let closed = match run.status {
        RunStatus::Running => lifecycle.mark_failed(&run.id, &message).await,
        _ => lifecycle.cancel(&run.id).await,
    };
    match closed {
        Ok(closed) => {
            if let Err(audit_error) = lifecycle
                .record_audit(
                    &closed,
                    &AuditActor::system(),
                    "recovery_failed",
                    json!({ "error": message }),
                )
                .await
            {
                warn!(run_id = %run.id, error = %audit_error, "failed to audit abandoned run");
            }
        }
        Err(transition_error) => {
            warn!(run_id = %run.id, error = %transition_error, "failed to close unrecoverable run");
        }
    }
}

//! Run creation, status transitions, and audit trail writes.

use std::sync::Arc;

use relay_core::Clock;
use relay_store::{
    ActorType, AuditEvent, Message, NewAuditEvent, NewMessage, NewRun, Run, RunClaim, RunInsert,
    RunRepository, RunStatus, RunStoreError, RunUpdate, TaskKind, TriggerSource,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("run '{0}' not found")]
    RunNotFound(String),
    #[error("run '{run_id}' cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        run_id: String,
        from: RunStatus,
        to: RunStatus,
    },
    #[error(transparent)]
    Store(#[from] RunStoreError),
}

/// Who an audit event is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditActor {
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub user_id: Option<String>,
}

impl AuditActor {
    pub fn system() -> Self {
        Self {
            actor_type: ActorType::System,
            actor_id: None,
            user_id: None,
        }
    }

    pub fn chat(actor_id: Option<String>, user_id: Option<String>) -> Self {
        Self {
            actor_type: ActorType::Chat,
            actor_id,
            user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateRunRequest {
    pub workspace_id: String,
    pub idempotency_key: String,
    pub task_kind: TaskKind,
    pub trigger_source: TriggerSource,
    pub initiated_by_user_id: Option<String>,
    pub input: Value,
    pub actor: AuditActor,
}

/// Builds the `"<trigger>:<id>"` idempotency key used for run creation.
pub fn idempotency_key(trigger_source: TriggerSource, request_id: &str) -> String {
    format!("{}:{request_id}", trigger_source.as_str())
}

/// The only path through which run status changes and audit events are written.
#[derive(Clone)]
pub struct RunLifecycleManager {
    repository: Arc<dyn RunRepository>,
    clock: Arc<dyn Clock>,
}

impl RunLifecycleManager {
    pub fn new(repository: Arc<dyn RunRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub fn repository(&self) -> &Arc<dyn RunRepository> {
        &self.repository
    }

    /// Creates a queued run or returns the existing one for the same idempotency key.
    ///
    /// `<kind>.command_received` is appended only for freshly created runs.
    pub async fn create_run(&self, request: CreateRunRequest) -> Result<RunInsert, LifecycleError> {
        let now = self.clock.now_utc();
        let insert = self
            .repository
            .insert_run(NewRun {
                workspace_id: request.workspace_id.clone(),
                idempotency_key: request.idempotency_key.clone(),
                task_kind: request.task_kind,
                trigger_source: request.trigger_source,
                initiated_by_user_id: request.initiated_by_user_id.clone(),
                input: request.input.clone(),
                created_at: now,
            })
            .await?;

        if !insert.created {
            debug!(
                run_id = %insert.run.id,
                idempotency_key = %request.idempotency_key,
                status = insert.run.status.as_str(),
                "run already exists for idempotency key"
            );
            return Ok(insert);
        }

        self.record_audit(
            &insert.run,
            &request.actor,
            "command_received",
            json!({
                "idempotency_key": request.idempotency_key,
                "trigger_source": request.trigger_source.as_str(),
                "input": request.input,
            }),
        )
        .await?;
        info!(
            run_id = %insert.run.id,
            workspace_id = %insert.run.workspace_id,
            task_kind = insert.run.task_kind.as_str(),
            "run created"
        );
        Ok(insert)
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Run, LifecycleError> {
        self.repository
            .get_run(run_id)
            .await?
            .ok_or_else(|| LifecycleError::RunNotFound(run_id.to_string()))
    }

    pub async fn find_run(
        &self,
        workspace_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Run>, LifecycleError> {
        Ok(self
            .repository
            .find_run_by_idempotency_key(workspace_id, idempotency_key)
            .await?)
    }

    /// Moves a run to `status`, rejecting transitions the run state machine forbids.
    pub async fn transition(
        &self,
        run_id: &str,
        status: RunStatus,
        output: Option<Value>,
        error_text: Option<String>,
    ) -> Result<Run, LifecycleError> {
        let current = self.get_run(run_id).await?;
        if !current.status.can_transition_to(status) {
            return Err(LifecycleError::InvalidTransition {
                run_id: run_id.to_string(),
                from: current.status,
                to: status,
            });
        }

        let updated = self
            .repository
            .update_run(
                run_id,
                RunUpdate {
                    status,
                    output,
                    error_text,
                    at: self.clock.now_utc(),
                },
            )
            .await
            .map_err(|error| match error {
                RunStoreError::InvalidRunTransition { from, to } => {
                    LifecycleError::InvalidTransition {
                        run_id: run_id.to_string(),
                        from,
                        to,
                    }
                }
                other => LifecycleError::Store(other),
            })?;
        debug!(run_id, status = status.as_str(), "run transitioned");
        Ok(updated)
    }

    /// Takes ownership of a run for execution. `None` means the run no longer holds
    /// the status the claim expects, so another worker owns it or it already finished.
    pub async fn claim_run(
        &self,
        run_id: &str,
        claim: RunClaim,
    ) -> Result<Option<Run>, LifecycleError> {
        let claimed = self
            .repository
            .claim_run(run_id, claim, self.clock.now_utc())
            .await
            .map_err(|error| match error {
                RunStoreError::RunNotFound(id) => LifecycleError::RunNotFound(id),
                other => LifecycleError::Store(other),
            })?;
        if claimed.is_some() {
            debug!(run_id, ?claim, "run claimed");
        }
        Ok(claimed)
    }

    /// Runs that were accepted but never finished, oldest first.
    pub async fn pending_runs(&self) -> Result<Vec<Run>, LifecycleError> {
        Ok(self
            .repository
            .list_runs_by_status(&[RunStatus::Queued, RunStatus::Running])
            .await?)
    }

    pub async fn mark_succeeded(&self, run_id: &str, output: Value) -> Result<Run, LifecycleError> {
        self.transition(run_id, RunStatus::Succeeded, Some(output), None)
            .await
    }

    pub async fn mark_failed(&self, run_id: &str, error_text: &str) -> Result<Run, LifecycleError> {
        self.transition(
            run_id,
            RunStatus::Failed,
            None,
            Some(error_text.to_string()),
        )
        .await
    }

    pub async fn cancel(&self, run_id: &str) -> Result<Run, LifecycleError> {
        self.transition(run_id, RunStatus::Cancelled, None, None)
            .await
    }

    /// Appends `<task_kind>.<suffix>` to the run's audit trail.
    pub async fn record_audit(
        &self,
        run: &Run,
        actor: &AuditActor,
        suffix: &str,
        event_data: Value,
    ) -> Result<AuditEvent, LifecycleError> {
        let event = self
            .repository
            .append_audit_event(NewAuditEvent {
                workspace_id: run.workspace_id.clone(),
                run_id: Some(run.id.clone()),
                user_id: actor.user_id.clone(),
                actor_type: actor.actor_type,
                actor_id: actor.actor_id.clone(),
                event_name: run.task_kind.audit_event(suffix),
                event_data,
                created_at: self.clock.now_utc(),
            })
            .await?;
        Ok(event)
    }

    pub async fn record_message(&self, message: NewMessage) -> Result<Message, LifecycleError> {
        Ok(self.repository.insert_message(message).await?)
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now_utc()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relay_core::ManualClock;
    use relay_store::{
        InMemoryRunStore, RunClaim, RunRepository, RunStatus, TaskKind, TriggerSource,
    };
    use serde_json::json;

    use super::{idempotency_key, AuditActor, CreateRunRequest, LifecycleError, RunLifecycleManager};

    fn manager() -> (Arc<InMemoryRunStore>, Arc<ManualClock>, RunLifecycleManager) {
        let store = Arc::new(InMemoryRunStore::new());
        let clock = Arc::new(ManualClock::new(1_739_999_999_000));
        let manager = RunLifecycleManager::new(store.clone(), clock.clone());
        (store, clock, manager)
    }

    fn request(key: &str) -> CreateRunRequest {
        CreateRunRequest {
            workspace_id: "ws_1".to_string(),
            idempotency_key: key.to_string(),
            task_kind: TaskKind::ThreadSummary,
            trigger_source: TriggerSource::Chat,
            initiated_by_user_id: None,
            input: json!({ "channel_id": "C1", "thread_ts": "1739999999.000100" }),
            actor: AuditActor::chat(Some("U1".to_string()), None),
        }
    }

    #[test]
    fn unit_idempotency_key_prefixes_trigger_source() {
        assert_eq!(idempotency_key(TriggerSource::Chat, "abc"), "chat:abc");
        assert_eq!(idempotency_key(TriggerSource::Cli, "abc"), "cli:abc");
    }

    #[tokio::test]
    async fn functional_create_run_audits_only_first_creation() {
        let (store, _clock, manager) = manager();
        let first = manager.create_run(request("chat:one")).await.expect("create");
        let second = manager.create_run(request("chat:one")).await.expect("repeat");
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.run.id, second.run.id);

        let events = store
            .list_audit_events_for_run(&first.run.id)
            .await
            .expect("audit");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name, "thread_summary.command_received");
        assert_eq!(events[0].actor_id.as_deref(), Some("U1"));
        assert_eq!(events[0].event_data["idempotency_key"], "chat:one");
    }

    #[tokio::test]
    async fn functional_transitions_stamp_clock_times() {
        let (_store, clock, manager) = manager();
        let run = manager.create_run(request("chat:two")).await.expect("create").run;

        clock.advance_seconds(2);
        let running = manager
            .claim_run(&run.id, RunClaim::Fresh)
            .await
            .expect("claim")
            .expect("running");
        assert_eq!(running.started_at.map(|at| at.timestamp()), Some(1_740_000_001));

        clock.advance_seconds(3);
        let done = manager
            .mark_succeeded(&run.id, json!({ "summary": "ok" }))
            .await
            .expect("succeeded");
        assert_eq!(done.status, RunStatus::Succeeded);
        assert_eq!(done.completed_at.map(|at| at.timestamp()), Some(1_740_000_004));
    }

    #[tokio::test]
    async fn regression_terminal_runs_reject_transitions() {
        let (_store, _clock, manager) = manager();
        let run = manager.create_run(request("chat:three")).await.expect("create").run;
        manager
            .claim_run(&run.id, RunClaim::Fresh)
            .await
            .expect("claim")
            .expect("running");
        manager.mark_failed(&run.id, "boom").await.expect("failed");

        assert!(manager
            .claim_run(&run.id, RunClaim::Resume)
            .await
            .expect("resume")
            .is_none());
        let error = manager
            .transition(&run.id, RunStatus::Running, None, None)
            .await
            .expect_err("failed runs are terminal");
        assert!(matches!(
            error,
            LifecycleError::InvalidTransition {
                from: RunStatus::Failed,
                to: RunStatus::Running,
                ..
            }
        ));
        let stored = manager.get_run(&run.id).await.expect("get");
        assert_eq!(stored.error_text.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn unit_queued_runs_can_be_cancelled_but_not_completed() {
        let (_store, _clock, manager) = manager();
        let run = manager.create_run(request("chat:four")).await.expect("create").run;
        assert!(manager
            .mark_succeeded(&run.id, json!({}))
            .await
            .is_err());
        let cancelled = manager.cancel(&run.id).await.expect("cancel");
        assert_eq!(cancelled.status, RunStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());
    }

    #[tokio::test]
    async fn unit_missing_runs_surface_not_found() {
        let (_store, _clock, manager) = manager();
        assert!(matches!(
            manager.get_run("run_missing").await,
            Err(LifecycleError::RunNotFound(id)) if id == "run_missing"
        ));
        assert!(matches!(
            manager.claim_run("run_missing", RunClaim::Fresh).await,
            Err(LifecycleError::RunNotFound(id)) if id == "run_missing"
        ));
    }

    #[tokio::test]
    async fn functional_pending_runs_skip_finished_work() {
        let (_store, _clock, manager) = manager();
        let queued = manager.create_run(request("chat:p1")).await.expect("create").run;
        let running = manager.create_run(request("chat:p2")).await.expect("create").run;
        let finished = manager.create_run(request("chat:p3")).await.expect("create").run;
        manager
            .claim_run(&running.id, RunClaim::Fresh)
            .await
            .expect("claim");
        manager.cancel(&finished.id).await.expect("cancel");

        let pending: Vec<_> = manager
            .pending_runs()
            .await
            .expect("pending")
            .into_iter()
            .map(|run| run.id)
            .collect();
        assert_eq!(pending, vec![queued.id, running.id]);
    }
}

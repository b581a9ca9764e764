//! Run, message, and audit persistence with in-memory and SQLite backends.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::new_record_id;
use thiserror::Error;
use tokio::sync::RwLock;

mod model;
mod sqlite;

pub use model::{
    ActorType, AuditEvent, Message, MessageRole, NewAuditEvent, NewMessage, NewRun, Run,
    RunClaim, RunInsert, RunStatus, RunUpdate, TaskKind, TriggerSource, User, Workspace,
};
pub use sqlite::SqliteRunStore;

/// Result type for run store operations.
pub type StoreResult<T> = Result<T, RunStoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum RunStoreError {
    #[error("run '{0}' not found")]
    RunNotFound(String),
    #[error("invalid run status transition: {from:?} -> {to:?}")]
    InvalidRunTransition { from: RunStatus, to: RunStatus },
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Async persistence contract used by intake and the job executor.
#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn find_run_by_idempotency_key(
        &self,
        workspace_id: &str,
        idempotency_key: &str,
    ) -> StoreResult<Option<Run>>;

    /// Inserts a queued run, or returns the stored run for the same
    /// `(workspace_id, idempotency_key)` with `created == false`.
    async fn insert_run(&self, new_run: NewRun) -> StoreResult<RunInsert>;
    async fn get_run(&self, run_id: &str) -> StoreResult<Option<Run>>;
    async fn list_runs(&self, workspace_id: &str) -> StoreResult<Vec<Run>>;

    /// Runs in any of `statuses` across all workspaces, oldest first.
    async fn list_runs_by_status(&self, statuses: &[RunStatus]) -> StoreResult<Vec<Run>>;

    /// Atomically moves a run into `running` if it still holds the status `claim`
    /// expects. `None` means another worker changed the run first.
    async fn claim_run(
        &self,
        run_id: &str,
        claim: RunClaim,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Run>>;

    /// Applies a validated status change and returns the updated run.
    async fn update_run(&self, run_id: &str, update: RunUpdate) -> StoreResult<Run>;

    /// Records a message. A repeat of the same external message id returns the stored row.
    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message>;
    async fn list_messages_for_run(&self, run_id: &str) -> StoreResult<Vec<Message>>;

    async fn append_audit_event(&self, event: NewAuditEvent) -> StoreResult<AuditEvent>;
    async fn list_audit_events_for_run(&self, run_id: &str) -> StoreResult<Vec<AuditEvent>>;

    async fn upsert_workspace(&self, workspace: Workspace) -> StoreResult<()>;
    async fn get_workspace(&self, workspace_id: &str) -> StoreResult<Option<Workspace>>;
    async fn workspace_by_team_id(&self, slack_team_id: &str) -> StoreResult<Option<Workspace>>;

    async fn upsert_user(&self, user: User) -> StoreResult<()>;
    async fn user_by_slack_user_id(
        &self,
        workspace_id: &str,
        slack_user_id: &str,
    ) -> StoreResult<Option<User>>;
}

#[derive(Debug, Default)]
struct StoreInner {
    runs: HashMap<String, Run>,
    run_order: Vec<String>,
    run_ids_by_key: HashMap<(String, String), String>,
    messages: Vec<Message>,
    audit_events: Vec<AuditEvent>,
    workspaces: HashMap<String, Workspace>,
    users: HashMap<String, User>,
}

/// In-memory repository used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunStore {
    async fn find_run_by_idempotency_key(
        &self,
        workspace_id: &str,
        idempotency_key: &str,
    ) -> StoreResult<Option<Run>> {
        let inner = self.inner.read().await;
        let key = (workspace_id.to_string(), idempotency_key.to_string());
        Ok(inner
            .run_ids_by_key
            .get(&key)
            .and_then(|run_id| inner.runs.get(run_id))
            .cloned())
    }

    async fn insert_run(&self, new_run: NewRun) -> StoreResult<RunInsert> {
        let mut inner = self.inner.write().await;
        let key = (
            new_run.workspace_id.clone(),
            new_run.idempotency_key.clone(),
        );
        if let Some(existing) = inner
            .run_ids_by_key
            .get(&key)
            .and_then(|run_id| inner.runs.get(run_id))
        {
            return Ok(RunInsert {
                run: existing.clone(),
                created: false,
            });
        }

        let run = Run {
            id: new_record_id("run"),
            workspace_id: new_run.workspace_id,
            idempotency_key: new_run.idempotency_key,
            task_kind: new_run.task_kind,
            trigger_source: new_run.trigger_source,
            status: RunStatus::Queued,
            initiated_by_user_id: new_run.initiated_by_user_id,
            input: new_run.input,
            output: serde_json::json!({}),
            error_text: None,
            started_at: None,
            completed_at: None,
            created_at: new_run.created_at,
            updated_at: new_run.created_at,
        };
        inner.run_ids_by_key.insert(key, run.id.clone());
        inner.run_order.push(run.id.clone());
        inner.runs.insert(run.id.clone(), run.clone());
        Ok(RunInsert { run, created: true })
    }

    async fn get_run(&self, run_id: &str) -> StoreResult<Option<Run>> {
        Ok(self.inner.read().await.runs.get(run_id).cloned())
    }

    async fn list_runs(&self, workspace_id: &str) -> StoreResult<Vec<Run>> {
        let inner = self.inner.read().await;
        Ok(inner
            .run_order
            .iter()
            .filter_map(|run_id| inner.runs.get(run_id))
            .filter(|run| run.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn list_runs_by_status(&self, statuses: &[RunStatus]) -> StoreResult<Vec<Run>> {
        let inner = self.inner.read().await;
        Ok(inner
            .run_order
            .iter()
            .filter_map(|run_id| inner.runs.get(run_id))
            .filter(|run| statuses.contains(&run.status))
            .cloned()
            .collect())
    }

    async fn claim_run(
        &self,
        run_id: &str,
        claim: RunClaim,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Run>> {
        let mut inner = self.inner.write().await;
        let run = inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| RunStoreError::RunNotFound(run_id.to_string()))?;
        if !claim.apply(run, at)? {
            return Ok(None);
        }
        Ok(Some(run.clone()))
    }

    async fn update_run(&self, run_id: &str, update: RunUpdate) -> StoreResult<Run> {
        let mut inner = self.inner.write().await;
        let run = inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| RunStoreError::RunNotFound(run_id.to_string()))?;
        update.apply(run)?;
        Ok(run.clone())
    }

    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let mut inner = self.inner.write().await;
        if let Some(external_id) = message.external_message_id.as_deref() {
            if let Some(existing) = inner.messages.iter().find(|stored| {
                stored.workspace_id == message.workspace_id
                    && stored.source == message.source
                    && stored.external_message_id.as_deref() == Some(external_id)
            }) {
                return Ok(existing.clone());
            }
        }

        let stored = Message {
            id: new_record_id("msg"),
            workspace_id: message.workspace_id,
            run_id: message.run_id,
            user_id: message.user_id,
            source: message.source,
            role: message.role,
            channel_id: message.channel_id,
            thread_ts: message.thread_ts,
            external_message_id: message.external_message_id,
            content: message.content,
            payload: message.payload,
            created_at: message.created_at,
        };
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages_for_run(&self, run_id: &str) -> StoreResult<Vec<Message>> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|message| message.run_id.as_deref() == Some(run_id))
            .cloned()
            .collect())
    }

    async fn append_audit_event(&self, event: NewAuditEvent) -> StoreResult<AuditEvent> {
        let stored = AuditEvent {
            id: new_record_id("aud"),
            workspace_id: event.workspace_id,
            run_id: event.run_id,
            user_id: event.user_id,
            actor_type: event.actor_type,
            actor_id: event.actor_id,
            event_name: event.event_name,
            event_data: event.event_data,
            created_at: event.created_at,
        };
        self.inner.write().await.audit_events.push(stored.clone());
        Ok(stored)
    }

    async fn list_audit_events_for_run(&self, run_id: &str) -> StoreResult<Vec<AuditEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .audit_events
            .iter()
            .filter(|event| event.run_id.as_deref() == Some(run_id))
            .cloned()
            .collect())
    }

    async fn upsert_workspace(&self, workspace: Workspace) -> StoreResult<()> {
        self.inner
            .write()
            .await
            .workspaces
            .insert(workspace.id.clone(), workspace);
        Ok(())
    }

    async fn get_workspace(&self, workspace_id: &str) -> StoreResult<Option<Workspace>> {
        Ok(self.inner.read().await.workspaces.get(workspace_id).cloned())
    }

    async fn workspace_by_team_id(&self, slack_team_id: &str) -> StoreResult<Option<Workspace>> {
        let inner = self.inner.read().await;
        Ok(inner
            .workspaces
            .values()
            .find(|workspace| workspace.slack_team_id.as_deref() == Some(slack_team_id))
            .cloned())
    }

    async fn upsert_user(&self, user: User) -> StoreResult<()> {
        self.inner.write().await.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn user_by_slack_user_id(
        &self,
        workspace_id: &str,
        slack_user_id: &str,
    ) -> StoreResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|user| {
                user.workspace_id == workspace_id
                    && user.slack_user_id.as_deref() == Some(slack_user_id)
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests;

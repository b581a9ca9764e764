//! Persisted records for runs, thread messages, audit events, and tenancy lookups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::RunStoreError;

/// Lifecycle state for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Returns true when this status can transition to `next`.
    ///
    /// `running -> running` is accepted so a resumed run can re-enter execution.
    /// Workers go through [`RunClaim`] so only one of them wins each entry.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return self == Self::Running;
        }

        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Cancelled)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }

    /// Returns an error if transitioning to `next` is not allowed.
    pub fn ensure_transition(self, next: Self) -> Result<(), RunStoreError> {
        if self.can_transition_to(next) {
            return Ok(());
        }
        Err(RunStoreError::InvalidRunTransition {
            from: self,
            to: next,
        })
    }

    /// Returns true when no further execution is expected.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Kind of work a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ThreadSummary,
    AssistantReply,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThreadSummary => "thread_summary",
            Self::AssistantReply => "assistant_reply",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "thread_summary" => Some(Self::ThreadSummary),
            "assistant_reply" => Some(Self::AssistantReply),
            _ => None,
        }
    }

    /// Namespaced audit event name, e.g. `thread_summary.completed`.
    pub fn audit_event(self, suffix: &str) -> String {
        format!("{}.{suffix}", self.as_str())
    }
}

/// Surface a run was requested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Chat,
    Cli,
    Api,
    System,
}

impl TriggerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Cli => "cli",
            Self::Api => "api",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "chat" => Some(Self::Chat),
            "cli" => Some(Self::Cli),
            "api" => Some(Self::Api),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

/// Who caused an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    System,
    User,
    Chat,
    Cli,
    Api,
}

impl ActorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Chat => "chat",
            Self::Cli => "cli",
            Self::Api => "api",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "chat" => Some(Self::Chat),
            "cli" => Some(Self::Cli),
            "api" => Some(Self::Api),
            _ => None,
        }
    }
}

/// One execution of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub workspace_id: String,
    pub idempotency_key: String,
    pub task_kind: TaskKind,
    pub trigger_source: TriggerSource,
    pub status: RunStatus,
    pub initiated_by_user_id: Option<String>,
    pub input: Value,
    pub output: Value,
    pub error_text: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a run is first recorded. Runs always start `queued`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRun {
    pub workspace_id: String,
    pub idempotency_key: String,
    pub task_kind: TaskKind,
    pub trigger_source: TriggerSource,
    pub initiated_by_user_id: Option<String>,
    pub input: Value,
    pub created_at: DateTime<Utc>,
}

/// Outcome of an idempotent run insert.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInsert {
    pub run: Run,
    pub created: bool,
}

/// Status change applied to a stored run.
///
/// `output` replaces the stored output when present. `error_text` is kept only for
/// `failed` and cleared on `succeeded`. `started_at` and `completed_at` are stamped
/// from `at` the first time the run enters `running` or a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct RunUpdate {
    pub status: RunStatus,
    pub output: Option<Value>,
    pub error_text: Option<String>,
    pub at: DateTime<Utc>,
}

impl RunUpdate {
    pub fn status(status: RunStatus, at: DateTime<Utc>) -> Self {
        Self {
            status,
            output: None,
            error_text: None,
            at,
        }
    }

    pub(crate) fn apply(&self, run: &mut Run) -> Result<(), RunStoreError> {
        run.status.ensure_transition(self.status)?;
        run.status = self.status;
        if let Some(output) = &self.output {
            run.output = output.clone();
        }
        match self.status {
            RunStatus::Failed => run.error_text = self.error_text.clone(),
            RunStatus::Succeeded => run.error_text = None,
            _ => {}
        }
        if self.status == RunStatus::Running && run.started_at.is_none() {
            run.started_at = Some(self.at);
        }
        if self.status.is_terminal() && run.completed_at.is_none() {
            run.completed_at = Some(self.at);
        }
        run.updated_at = self.at;
        Ok(())
    }
}

/// How a worker takes ownership of a run before executing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunClaim {
    /// Freshly dispatched work; only a `queued` run can be claimed.
    #[default]
    Fresh,
    /// A run left `running` by a process that stopped before finishing it.
    Resume,
}

impl RunClaim {
    /// Status the run must still hold for the claim to succeed.
    pub fn expected_status(self) -> RunStatus {
        match self {
            Self::Fresh => RunStatus::Queued,
            Self::Resume => RunStatus::Running,
        }
    }

    /// Moves `run` into `running` when it still holds the expected status.
    /// Returns false, leaving the run untouched, when someone else got there first.
    pub(crate) fn apply(self, run: &mut Run, at: DateTime<Utc>) -> Result<bool, RunStoreError> {
        if run.status != self.expected_status() {
            return Ok(false);
        }
        RunUpdate::status(RunStatus::Running, at).apply(run)?;
        Ok(true)
    }
}

/// A chat message captured or produced by a run. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub workspace_id: String,
    pub run_id: Option<String>,
    pub user_id: Option<String>,
    pub source: TriggerSource,
    pub role: MessageRole,
    pub channel_id: Option<String>,
    pub thread_ts: Option<String>,
    pub external_message_id: Option<String>,
    pub content: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub workspace_id: String,
    pub run_id: Option<String>,
    pub user_id: Option<String>,
    pub source: TriggerSource,
    pub role: MessageRole,
    pub channel_id: Option<String>,
    pub thread_ts: Option<String>,
    pub external_message_id: Option<String>,
    pub content: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub workspace_id: String,
    pub run_id: Option<String>,
    pub user_id: Option<String>,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub event_name: String,
    pub event_data: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEvent {
    pub workspace_id: String,
    pub run_id: Option<String>,
    pub user_id: Option<String>,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub event_name: String,
    pub event_data: Value,
    pub created_at: DateTime<Utc>,
}

/// Tenant record; `slack_team_id` maps inbound chat traffic onto it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub slack_team_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub workspace_id: String,
    pub slack_user_id: Option<String>,
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_run_status_allows_forward_transitions() {
        assert!(RunStatus::Queued.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Queued.can_transition_to(RunStatus::Cancelled));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Succeeded));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Failed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Cancelled));
    }

    #[test]
    fn unit_run_status_rejects_leaving_terminal_states() {
        for terminal in [
            RunStatus::Succeeded,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                RunStatus::Queued,
                RunStatus::Running,
                RunStatus::Succeeded,
                RunStatus::Failed,
                RunStatus::Cancelled,
            ] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal:?} -> {next:?} must be rejected"
                );
            }
        }
    }

    #[test]
    fn unit_run_status_rejects_skipping_running() {
        assert!(!RunStatus::Queued.can_transition_to(RunStatus::Succeeded));
        assert!(!RunStatus::Queued.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Queued.can_transition_to(RunStatus::Queued));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Queued));
        assert!(matches!(
            RunStatus::Queued.ensure_transition(RunStatus::Succeeded),
            Err(RunStoreError::InvalidRunTransition {
                from: RunStatus::Queued,
                to: RunStatus::Succeeded
            })
        ));
    }

    #[test]
    fn unit_run_claim_only_takes_the_expected_status() {
        let at = chrono::DateTime::<Utc>::from_timestamp(1_740_000_000, 0).expect("timestamp");
        let mut run = Run {
            id: "run_1".to_string(),
            workspace_id: "ws_1".to_string(),
            idempotency_key: "chat:Ev1".to_string(),
            task_kind: TaskKind::ThreadSummary,
            trigger_source: TriggerSource::Chat,
            status: RunStatus::Queued,
            initiated_by_user_id: None,
            input: Value::Null,
            output: Value::Null,
            error_text: None,
            started_at: None,
            completed_at: None,
            created_at: at,
            updated_at: at,
        };

        assert!(!RunClaim::Resume.apply(&mut run, at).expect("resume queued"));
        assert_eq!(run.status, RunStatus::Queued);

        assert!(RunClaim::Fresh.apply(&mut run, at).expect("fresh claim"));
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.started_at, Some(at));

        assert!(!RunClaim::Fresh.apply(&mut run, at).expect("second fresh claim"));
        assert!(RunClaim::Resume.apply(&mut run, at).expect("resume running"));

        run.status = RunStatus::Succeeded;
        assert!(!RunClaim::Resume.apply(&mut run, at).expect("resume finished"));
        assert_eq!(run.status, RunStatus::Succeeded);
    }

    #[test]
    fn unit_enum_string_forms_round_trip() {
        for status in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Succeeded,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskKind::parse("assistant_reply"), Some(TaskKind::AssistantReply));
        assert_eq!(TriggerSource::parse("chat"), Some(TriggerSource::Chat));
        assert_eq!(MessageRole::parse("tool"), Some(MessageRole::Tool));
        assert_eq!(ActorType::parse("cli"), Some(ActorType::Cli));
        assert_eq!(RunStatus::parse("queuing"), None);
    }

    #[test]
    fn unit_task_kind_namespaces_audit_events() {
        assert_eq!(
            TaskKind::ThreadSummary.audit_event("completed"),
            "thread_summary.completed"
        );
        assert_eq!(
            TaskKind::AssistantReply.audit_event("llm_fallback"),
            "assistant_reply.llm_fallback"
        );
    }
}

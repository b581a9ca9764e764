//! SQLite-backed `RunRepository` implementation with durable persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::new_record_id;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    ActorType, AuditEvent, Message, MessageRole, NewAuditEvent, NewMessage, NewRun, Run,
    RunClaim, RunInsert, RunRepository, RunStatus, RunStoreError, RunUpdate, StoreResult, TaskKind,
    TriggerSource, User, Workspace,
};

const RUN_COLUMNS: &str = "id, workspace_id, idempotency_key, task_kind, trigger_source, status, \
     initiated_by_user_id, input_json, output_json, error_text, started_at, completed_at, \
     created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, workspace_id, run_id, user_id, source, role, channel_id, \
     thread_ts, external_message_id, content, payload_json, created_at";

const AUDIT_COLUMNS: &str = "id, workspace_id, run_id, user_id, actor_type, actor_id, \
     event_name, event_data_json, created_at";

/// Persistent SQLite store backend. Each operation opens its own connection.
#[derive(Debug)]
pub struct SqliteRunStore {
    db_path: PathBuf,
}

impl SqliteRunStore {
    /// Creates a SQLite-backed store at `path`, creating schema if needed.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { db_path };
        let connection = store.open_connection()?;
        store.initialize_schema(&connection)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(connection)
    }

    fn initialize_schema(&self, connection: &Connection) -> StoreResult<()> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS workspaces (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                slack_team_id TEXT NULL UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                slack_user_id TEXT NULL,
                display_name TEXT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS users_workspace_slack_user_idx
                ON users(workspace_id, slack_user_id);

            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                idempotency_key TEXT NOT NULL,
                task_kind TEXT NOT NULL,
                trigger_source TEXT NOT NULL,
                status TEXT NOT NULL,
                initiated_by_user_id TEXT NULL,
                input_json TEXT NOT NULL,
                output_json TEXT NOT NULL,
                error_text TEXT NULL,
                started_at TEXT NULL,
                completed_at TEXT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS runs_workspace_idempotency_idx
                ON runs(workspace_id, idempotency_key);
            CREATE INDEX IF NOT EXISTS runs_workspace_status_idx
                ON runs(workspace_id, status);
            CREATE INDEX IF NOT EXISTS runs_status_idx ON runs(status);

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                run_id TEXT NULL,
                user_id TEXT NULL,
                source TEXT NOT NULL,
                role TEXT NOT NULL,
                channel_id TEXT NULL,
                thread_ts TEXT NULL,
                external_message_id TEXT NULL,
                content TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(run_id) REFERENCES runs(id) ON DELETE SET NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS messages_external_idx
                ON messages(workspace_id, source, external_message_id);
            CREATE INDEX IF NOT EXISTS messages_run_idx ON messages(run_id);

            CREATE TABLE IF NOT EXISTS audit_events (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                run_id TEXT NULL,
                user_id TEXT NULL,
                actor_type TEXT NOT NULL,
                actor_id TEXT NULL,
                event_name TEXT NOT NULL,
                event_data_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(run_id) REFERENCES runs(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS audit_events_run_idx ON audit_events(run_id);
            "#,
        )?;
        Ok(())
    }
}

#[async_trait]
impl RunRepository for SqliteRunStore {
    async fn find_run_by_idempotency_key(
        &self,
        workspace_id: &str,
        idempotency_key: &str,
    ) -> StoreResult<Option<Run>> {
        let connection = self.open_connection()?;
        select_run_by_key(&connection, workspace_id, idempotency_key)
    }

    async fn insert_run(&self, new_run: NewRun) -> StoreResult<RunInsert> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) =
            select_run_by_key(&transaction, &new_run.workspace_id, &new_run.idempotency_key)?
        {
            transaction.commit()?;
            return Ok(RunInsert {
                run: existing,
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
            output: json!({}),
            error_text: None,
            started_at: None,
            completed_at: None,
            created_at: new_run.created_at,
            updated_at: new_run.created_at,
        };

        let inserted = transaction.execute(
            &format!(
                "INSERT INTO runs ({RUN_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                run.id,
                run.workspace_id,
                run.idempotency_key,
                run.task_kind.as_str(),
                run.trigger_source.as_str(),
                run.status.as_str(),
                run.initiated_by_user_id,
                serialize_json(&run.input)?,
                serialize_json(&run.output)?,
                run.error_text,
                option_timestamp_to_db(run.started_at),
                option_timestamp_to_db(run.completed_at),
                timestamp_to_db(run.created_at),
                timestamp_to_db(run.updated_at),
            ],
        );

        match inserted {
            Ok(_) => {
                transaction.commit()?;
                Ok(RunInsert { run, created: true })
            }
            Err(error) if is_unique_violation(&error) => {
                drop(transaction);
                let existing =
                    select_run_by_key(&connection, &run.workspace_id, &run.idempotency_key)?
                        .ok_or(RunStoreError::Sqlite(error))?;
                Ok(RunInsert {
                    run: existing,
                    created: false,
                })
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn get_run(&self, run_id: &str) -> StoreResult<Option<Run>> {
        let connection = self.open_connection()?;
        select_run_by_id(&connection, run_id)
    }

    async fn list_runs(&self, workspace_id: &str) -> StoreResult<Vec<Run>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE workspace_id = ?1 ORDER BY created_at, rowid"
        ))?;
        let rows = statement.query_map(params![workspace_id], RawRun::from_row)?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?.into_run()?);
        }
        Ok(runs)
    }

    async fn list_runs_by_status(&self, statuses: &[RunStatus]) -> StoreResult<Vec<Run>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE status = ?1 ORDER BY created_at, rowid"
        ))?;
        let mut runs = Vec::new();
        for status in statuses {
            let rows = statement.query_map(params![status.as_str()], RawRun::from_row)?;
            for row in rows {
                runs.push(row?.into_run()?);
            }
        }
        runs.sort_by_key(|run| run.created_at);
        Ok(runs)
    }

    async fn claim_run(
        &self,
        run_id: &str,
        claim: RunClaim,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Run>> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut run = select_run_by_id(&transaction, run_id)?
            .ok_or_else(|| RunStoreError::RunNotFound(run_id.to_string()))?;
        if !claim.apply(&mut run, at)? {
            return Ok(None);
        }
        write_run_state(&transaction, &run)?;
        transaction.commit()?;
        Ok(Some(run))
    }

    async fn update_run(&self, run_id: &str, update: RunUpdate) -> StoreResult<Run> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut run = select_run_by_id(&transaction, run_id)?
            .ok_or_else(|| RunStoreError::RunNotFound(run_id.to_string()))?;
        update.apply(&mut run)?;
        write_run_state(&transaction, &run)?;
        transaction.commit()?;
        Ok(run)
    }

    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let connection = self.open_connection()?;
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

        let inserted = connection.execute(
            &format!(
                "INSERT INTO messages ({MESSAGE_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                stored.id,
                stored.workspace_id,
                stored.run_id,
                stored.user_id,
                stored.source.as_str(),
                stored.role.as_str(),
                stored.channel_id,
                stored.thread_ts,
                stored.external_message_id,
                stored.content,
                serialize_json(&stored.payload)?,
                timestamp_to_db(stored.created_at),
            ],
        );

        match inserted {
            Ok(_) => Ok(stored),
            Err(error) if is_unique_violation(&error) => {
                let existing = connection
                    .query_row(
                        &format!(
                            "SELECT {MESSAGE_COLUMNS} FROM messages \
                             WHERE workspace_id = ?1 AND source = ?2 AND external_message_id = ?3"
                        ),
                        params![
                            stored.workspace_id,
                            stored.source.as_str(),
                            stored.external_message_id
                        ],
                        RawMessage::from_row,
                    )
                    .optional()?
                    .ok_or(RunStoreError::Sqlite(error))?;
                existing.into_message()
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn list_messages_for_run(&self, run_id: &str) -> StoreResult<Vec<Message>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE run_id = ?1 ORDER BY rowid"
        ))?;
        let rows = statement.query_map(params![run_id], RawMessage::from_row)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?.into_message()?);
        }
        Ok(messages)
    }

    async fn append_audit_event(&self, event: NewAuditEvent) -> StoreResult<AuditEvent> {
        let connection = self.open_connection()?;
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
        connection.execute(
            &format!(
                "INSERT INTO audit_events ({AUDIT_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                stored.id,
                stored.workspace_id,
                stored.run_id,
                stored.user_id,
                stored.actor_type.as_str(),
                stored.actor_id,
                stored.event_name,
                serialize_json(&stored.event_data)?,
                timestamp_to_db(stored.created_at),
            ],
        )?;
        Ok(stored)
    }

    async fn list_audit_events_for_run(&self, run_id: &str) -> StoreResult<Vec<AuditEvent>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_events WHERE run_id = ?1 ORDER BY rowid"
        ))?;
        let rows = statement.query_map(params![run_id], RawAuditEvent::from_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_audit_event()?);
        }
        Ok(events)
    }

    async fn upsert_workspace(&self, workspace: Workspace) -> StoreResult<()> {
        let connection = self.open_connection()?;
        let now = timestamp_to_db(Utc::now());
        connection.execute(
            r#"
            INSERT INTO workspaces (id, name, slack_team_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                slack_team_id = excluded.slack_team_id,
                updated_at = excluded.updated_at
            "#,
            params![workspace.id, workspace.name, workspace.slack_team_id, now],
        )?;
        Ok(())
    }

    async fn get_workspace(&self, workspace_id: &str) -> StoreResult<Option<Workspace>> {
        let connection = self.open_connection()?;
        Ok(connection
            .query_row(
                "SELECT id, name, slack_team_id FROM workspaces WHERE id = ?1",
                params![workspace_id],
                workspace_from_row,
            )
            .optional()?)
    }

    async fn workspace_by_team_id(&self, slack_team_id: &str) -> StoreResult<Option<Workspace>> {
        let connection = self.open_connection()?;
        Ok(connection
            .query_row(
                "SELECT id, name, slack_team_id FROM workspaces WHERE slack_team_id = ?1",
                params![slack_team_id],
                workspace_from_row,
            )
            .optional()?)
    }

    async fn upsert_user(&self, user: User) -> StoreResult<()> {
        let connection = self.open_connection()?;
        let now = timestamp_to_db(Utc::now());
        connection.execute(
            r#"
            INSERT INTO users (id, workspace_id, slack_user_id, display_name, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(id) DO UPDATE SET
                workspace_id = excluded.workspace_id,
                slack_user_id = excluded.slack_user_id,
                display_name = excluded.display_name,
                updated_at = excluded.updated_at
            "#,
            params![
                user.id,
                user.workspace_id,
                user.slack_user_id,
                user.display_name,
                now
            ],
        )?;
        Ok(())
    }

    async fn user_by_slack_user_id(
        &self,
        workspace_id: &str,
        slack_user_id: &str,
    ) -> StoreResult<Option<User>> {
        let connection = self.open_connection()?;
        Ok(connection
            .query_row(
                r#"
                SELECT id, workspace_id, slack_user_id, display_name
                FROM users
                WHERE workspace_id = ?1 AND slack_user_id = ?2
                "#,
                params![workspace_id, slack_user_id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        workspace_id: row.get(1)?,
                        slack_user_id: row.get(2)?,
                        display_name: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }
}

fn select_run_by_key(
    connection: &Connection,
    workspace_id: &str,
    idempotency_key: &str,
) -> StoreResult<Option<Run>> {
    connection
        .query_row(
            &format!(
                "SELECT {RUN_COLUMNS} FROM runs WHERE workspace_id = ?1 AND idempotency_key = ?2"
            ),
            params![workspace_id, idempotency_key],
            RawRun::from_row,
        )
        .optional()?
        .map(RawRun::into_run)
        .transpose()
}

fn write_run_state(connection: &Connection, run: &Run) -> StoreResult<()> {
    connection.execute(
        r#"
        UPDATE runs
        SET status = ?2, output_json = ?3, error_text = ?4, started_at = ?5,
            completed_at = ?6, updated_at = ?7
        WHERE id = ?1
        "#,
        params![
            run.id,
            run.status.as_str(),
            serialize_json(&run.output)?,
            run.error_text,
            option_timestamp_to_db(run.started_at),
            option_timestamp_to_db(run.completed_at),
            timestamp_to_db(run.updated_at),
        ],
    )?;
    Ok(())
}

fn select_run_by_id(connection: &Connection, run_id: &str) -> StoreResult<Option<Run>> {
    connection
        .query_row(
            &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
            params![run_id],
            RawRun::from_row,
        )
        .optional()?
        .map(RawRun::into_run)
        .transpose()
}

fn workspace_from_row(row: &Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: row.get(0)?,
        name: row.get(1)?,
        slack_team_id: row.get(2)?,
    })
}

/// Column values as stored, before enum and timestamp decoding.
struct RawRun {
    id: String,
    workspace_id: String,
    idempotency_key: String,
    task_kind: String,
    trigger_source: String,
    status: String,
    initiated_by_user_id: Option<String>,
    input_json: String,
    output_json: String,
    error_text: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawRun {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            idempotency_key: row.get(2)?,
            task_kind: row.get(3)?,
            trigger_source: row.get(4)?,
            status: row.get(5)?,
            initiated_by_user_id: row.get(6)?,
            input_json: row.get(7)?,
            output_json: row.get(8)?,
            error_text: row.get(9)?,
            started_at: row.get(10)?,
            completed_at: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_run(self) -> StoreResult<Run> {
        Ok(Run {
            id: self.id,
            workspace_id: self.workspace_id,
            idempotency_key: self.idempotency_key,
            task_kind: parse_persisted("task_kind", &self.task_kind, TaskKind::parse)?,
            trigger_source: parse_persisted(
                "trigger_source",
                &self.trigger_source,
                TriggerSource::parse,
            )?,
            status: parse_persisted("run_status", &self.status, RunStatus::parse)?,
            initiated_by_user_id: self.initiated_by_user_id,
            input: deserialize_json(&self.input_json)?,
            output: deserialize_json(&self.output_json)?,
            error_text: self.error_text,
            started_at: option_timestamp_from_db(self.started_at)?,
            completed_at: option_timestamp_from_db(self.completed_at)?,
            created_at: timestamp_from_db(&self.created_at)?,
            updated_at: timestamp_from_db(&self.updated_at)?,
        })
    }
}

struct RawMessage {
    id: String,
    workspace_id: String,
    run_id: Option<String>,
    user_id: Option<String>,
    source: String,
    role: String,
    channel_id: Option<String>,
    thread_ts: Option<String>,
    external_message_id: Option<String>,
    content: String,
    payload_json: String,
    created_at: String,
}

impl RawMessage {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            run_id: row.get(2)?,
            user_id: row.get(3)?,
            source: row.get(4)?,
            role: row.get(5)?,
            channel_id: row.get(6)?,
            thread_ts: row.get(7)?,
            external_message_id: row.get(8)?,
            content: row.get(9)?,
            payload_json: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn into_message(self) -> StoreResult<Message> {
        Ok(Message {
            id: self.id,
            workspace_id: self.workspace_id,
            run_id: self.run_id,
            user_id: self.user_id,
            source: parse_persisted("message_source", &self.source, TriggerSource::parse)?,
            role: parse_persisted("message_role", &self.role, MessageRole::parse)?,
            channel_id: self.channel_id,
            thread_ts: self.thread_ts,
            external_message_id: self.external_message_id,
            content: self.content,
            payload: deserialize_json(&self.payload_json)?,
            created_at: timestamp_from_db(&self.created_at)?,
        })
    }
}

struct RawAuditEvent {
    id: String,
    workspace_id: String,
    run_id: Option<String>,
    user_id: Option<String>,
    actor_type: String,
    actor_id: Option<String>,
    event_name: String,
    event_data_json: String,
    created_at: String,
}

impl RawAuditEvent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            run_id: row.get(2)?,
            user_id: row.get(3)?,
            actor_type: row.get(4)?,
            actor_id: row.get(5)?,
            event_name: row.get(6)?,
            event_data_json: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_audit_event(self) -> StoreResult<AuditEvent> {
        Ok(AuditEvent {
            id: self.id,
            workspace_id: self.workspace_id,
            run_id: self.run_id,
            user_id: self.user_id,
            actor_type: parse_persisted("actor_type", &self.actor_type, ActorType::parse)?,
            actor_id: self.actor_id,
            event_name: self.event_name,
            event_data: deserialize_json::<Value>(&self.event_data_json)?,
            created_at: timestamp_from_db(&self.created_at)?,
        })
    }
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

fn parse_persisted<T>(
    field: &'static str,
    value: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> StoreResult<T> {
    parse(value).ok_or_else(|| RunStoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}

fn serialize_json<T: Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(RunStoreError::from)
}

fn deserialize_json<T: DeserializeOwned>(value: &str) -> StoreResult<T> {
    serde_json::from_str(value).map_err(RunStoreError::from)
}

fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn option_timestamp_to_db(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(timestamp_to_db)
}

fn timestamp_from_db(value: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn option_timestamp_from_db(value: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    value.as_deref().map(timestamp_from_db).transpose()
}

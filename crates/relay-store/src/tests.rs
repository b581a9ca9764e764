//! Behavior shared by every `RunRepository` backend.

use chrono::{TimeZone, Utc};
use serde_json::json;
use tempfile::tempdir;

use super::*;

fn at(seconds: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_739_999_999 + seconds, 0)
        .single()
        .expect("timestamp")
}

fn new_run(workspace_id: &str, key: &str) -> NewRun {
    NewRun {
        workspace_id: workspace_id.to_string(),
        idempotency_key: key.to_string(),
        task_kind: TaskKind::ThreadSummary,
        trigger_source: TriggerSource::Chat,
        initiated_by_user_id: Some("usr_1".to_string()),
        input: json!({ "channel_id": "C123", "thread_ts": "1739999999.000100" }),
        created_at: at(0),
    }
}

fn new_message(workspace_id: &str, run_id: &str, external: Option<&str>) -> NewMessage {
    NewMessage {
        workspace_id: workspace_id.to_string(),
        run_id: Some(run_id.to_string()),
        user_id: None,
        source: TriggerSource::Chat,
        role: MessageRole::Assistant,
        channel_id: Some("C123".to_string()),
        thread_ts: Some("1739999999.000100".to_string()),
        external_message_id: external.map(str::to_string),
        content: "*Thread Summary*".to_string(),
        payload: json!({ "decisions": [] }),
        created_at: at(5),
    }
}

async fn assert_insert_run_is_idempotent(store: &dyn RunRepository) {
    let first = store
        .insert_run(new_run("ws_1", "chat:abc"))
        .await
        .expect("first insert");
    assert!(first.created);
    assert_eq!(first.run.status, RunStatus::Queued);
    assert!(first.run.id.starts_with("run_"));

    let second = store
        .insert_run(new_run("ws_1", "chat:abc"))
        .await
        .expect("second insert");
    assert!(!second.created);
    assert_eq!(second.run.id, first.run.id);

    let other_workspace = store
        .insert_run(new_run("ws_2", "chat:abc"))
        .await
        .expect("other workspace insert");
    assert!(other_workspace.created);
    assert_ne!(other_workspace.run.id, first.run.id);

    let found = store
        .find_run_by_idempotency_key("ws_1", "chat:abc")
        .await
        .expect("lookup")
        .expect("run exists");
    assert_eq!(found, first.run);
    assert_eq!(store.list_runs("ws_1").await.expect("list").len(), 1);
}

async fn assert_update_run_follows_lifecycle(store: &dyn RunRepository) {
    let run = store
        .insert_run(new_run("ws_1", "chat:lifecycle"))
        .await
        .expect("insert")
        .run;

    let running = store
        .update_run(&run.id, RunUpdate::status(RunStatus::Running, at(1)))
        .await
        .expect("running");
    assert_eq!(running.started_at, Some(at(1)));
    assert_eq!(running.completed_at, None);

    let reentered = store
        .update_run(&run.id, RunUpdate::status(RunStatus::Running, at(2)))
        .await
        .expect("running re-entry");
    assert_eq!(reentered.started_at, Some(at(1)));

    let succeeded = store
        .update_run(
            &run.id,
            RunUpdate {
                status: RunStatus::Succeeded,
                output: Some(json!({ "summary": "done" })),
                error_text: None,
                at: at(3),
            },
        )
        .await
        .expect("succeeded");
    assert_eq!(succeeded.completed_at, Some(at(3)));
    assert_eq!(succeeded.output, json!({ "summary": "done" }));
    assert_eq!(succeeded.updated_at, at(3));

    let error = store
        .update_run(&run.id, RunUpdate::status(RunStatus::Failed, at(4)))
        .await
        .expect_err("terminal run must reject transitions");
    assert!(matches!(
        error,
        RunStoreError::InvalidRunTransition {
            from: RunStatus::Succeeded,
            to: RunStatus::Failed
        }
    ));

    let stored = store
        .get_run(&run.id)
        .await
        .expect("get")
        .expect("stored run");
    assert_eq!(stored.status, RunStatus::Succeeded);
    assert_eq!(stored.completed_at, Some(at(3)));
}

async fn assert_claims_are_exclusive(store: &dyn RunRepository) {
    let first = store
        .insert_run(new_run("ws_1", "chat:claim-1"))
        .await
        .expect("insert first")
        .run;
    let second = store
        .insert_run(new_run("ws_2", "chat:claim-2"))
        .await
        .expect("insert second")
        .run;

    let claimed = store
        .claim_run(&first.id, RunClaim::Fresh, at(1))
        .await
        .expect("claim")
        .expect("queued run is claimable");
    assert_eq!(claimed.status, RunStatus::Running);
    assert_eq!(claimed.started_at, Some(at(1)));
    assert!(store
        .claim_run(&first.id, RunClaim::Fresh, at(2))
        .await
        .expect("second claim")
        .is_none());

    let pending = store
        .list_runs_by_status(&[RunStatus::Queued, RunStatus::Running])
        .await
        .expect("pending runs");
    let ids: Vec<_> = pending.iter().map(|run| run.id.as_str()).collect();
    assert!(ids.contains(&first.id.as_str()));
    assert!(ids.contains(&second.id.as_str()));

    let resumed = store
        .claim_run(&first.id, RunClaim::Resume, at(3))
        .await
        .expect("resume")
        .expect("running run is resumable");
    assert_eq!(resumed.started_at, Some(at(1)));
    assert_eq!(resumed.updated_at, at(3));

    store
        .update_run(&first.id, RunUpdate::status(RunStatus::Succeeded, at(4)))
        .await
        .expect("succeeded");
    assert!(store
        .claim_run(&first.id, RunClaim::Resume, at(5))
        .await
        .expect("resume finished")
        .is_none());
    let queued = store
        .list_runs_by_status(&[RunStatus::Queued])
        .await
        .expect("queued runs");
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id, second.id);

    let missing = store
        .claim_run("run_missing", RunClaim::Fresh, at(6))
        .await
        .expect_err("missing run");
    assert!(matches!(missing, RunStoreError::RunNotFound(_)));
}

async fn assert_failed_run_keeps_error_text(store: &dyn RunRepository) {
    let run = store
        .insert_run(new_run("ws_1", "chat:failing"))
        .await
        .expect("insert")
        .run;
    store
        .update_run(&run.id, RunUpdate::status(RunStatus::Running, at(1)))
        .await
        .expect("running");
    let failed = store
        .update_run(
            &run.id,
            RunUpdate {
                status: RunStatus::Failed,
                output: None,
                error_text: Some("thread fetch failed".to_string()),
                at: at(2),
            },
        )
        .await
        .expect("failed");
    assert_eq!(failed.error_text.as_deref(), Some("thread fetch failed"));
    assert_eq!(failed.completed_at, Some(at(2)));

    let missing = store
        .update_run("run_missing", RunUpdate::status(RunStatus::Running, at(1)))
        .await
        .expect_err("missing run");
    assert!(matches!(missing, RunStoreError::RunNotFound(id) if id == "run_missing"));
}

async fn assert_messages_and_audit_events_are_recorded(store: &dyn RunRepository) {
    let run = store
        .insert_run(new_run("ws_1", "chat:records"))
        .await
        .expect("insert")
        .run;

    let first = store
        .insert_message(new_message("ws_1", &run.id, Some("1739999999.000200")))
        .await
        .expect("message");
    let repeat = store
        .insert_message(new_message("ws_1", &run.id, Some("1739999999.000200")))
        .await
        .expect("repeat message");
    assert_eq!(repeat.id, first.id);
    store
        .insert_message(new_message("ws_1", &run.id, None))
        .await
        .expect("message without external id");
    store
        .insert_message(new_message("ws_1", &run.id, None))
        .await
        .expect("second message without external id");
    let messages = store
        .list_messages_for_run(&run.id)
        .await
        .expect("list messages");
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].payload, json!({ "decisions": [] }));

    for name in ["thread_summary.command_received", "thread_summary.completed"] {
        store
            .append_audit_event(NewAuditEvent {
                workspace_id: "ws_1".to_string(),
                run_id: Some(run.id.clone()),
                user_id: None,
                actor_type: ActorType::System,
                actor_id: None,
                event_name: name.to_string(),
                event_data: json!({ "messageCount": 2 }),
                created_at: at(6),
            })
            .await
            .expect("audit");
    }
    let events = store
        .list_audit_events_for_run(&run.id)
        .await
        .expect("list audit");
    let names = events
        .iter()
        .map(|event| event.event_name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["thread_summary.command_received", "thread_summary.completed"]
    );
    assert!(events.iter().all(|event| event.id.starts_with("aud_")));
}

async fn assert_tenancy_lookups(store: &dyn RunRepository) {
    store
        .upsert_workspace(Workspace {
            id: "ws_1".to_string(),
            name: "Acme".to_string(),
            slack_team_id: Some("T123".to_string()),
        })
        .await
        .expect("workspace");
    store
        .upsert_workspace(Workspace {
            id: "ws_1".to_string(),
            name: "Acme Corp".to_string(),
            slack_team_id: Some("T123".to_string()),
        })
        .await
        .expect("workspace update");
    let workspace = store
        .workspace_by_team_id("T123")
        .await
        .expect("lookup")
        .expect("mapped workspace");
    assert_eq!(workspace.name, "Acme Corp");
    assert!(store
        .workspace_by_team_id("T999")
        .await
        .expect("lookup")
        .is_none());
    assert_eq!(
        store.get_workspace("ws_1").await.expect("get"),
        Some(workspace)
    );

    store
        .upsert_user(User {
            id: "usr_1".to_string(),
            workspace_id: "ws_1".to_string(),
            slack_user_id: Some("U123".to_string()),
            display_name: Some("dana".to_string()),
        })
        .await
        .expect("user");
    let user = store
        .user_by_slack_user_id("ws_1", "U123")
        .await
        .expect("lookup")
        .expect("mapped user");
    assert_eq!(user.id, "usr_1");
    assert!(store
        .user_by_slack_user_id("ws_2", "U123")
        .await
        .expect("lookup")
        .is_none());
}

#[tokio::test]
async fn functional_in_memory_insert_run_is_idempotent() {
    assert_insert_run_is_idempotent(&InMemoryRunStore::new()).await;
}

#[tokio::test]
async fn functional_in_memory_update_run_follows_lifecycle() {
    let store = InMemoryRunStore::new();
    assert_update_run_follows_lifecycle(&store).await;
    assert_failed_run_keeps_error_text(&store).await;
}

#[tokio::test]
async fn regression_in_memory_claims_are_exclusive() {
    assert_claims_are_exclusive(&InMemoryRunStore::new()).await;
}

#[tokio::test]
async fn functional_in_memory_records_messages_and_audit_events() {
    assert_messages_and_audit_events_are_recorded(&InMemoryRunStore::new()).await;
}

#[tokio::test]
async fn functional_in_memory_tenancy_lookups() {
    assert_tenancy_lookups(&InMemoryRunStore::new()).await;
}

#[tokio::test]
async fn integration_sqlite_insert_run_is_idempotent() {
    let dir = tempdir().expect("tempdir");
    let store = SqliteRunStore::new(dir.path().join("relay.sqlite")).expect("store");
    assert_insert_run_is_idempotent(&store).await;
}

#[tokio::test]
async fn integration_sqlite_update_run_follows_lifecycle() {
    let dir = tempdir().expect("tempdir");
    let store = SqliteRunStore::new(dir.path().join("relay.sqlite")).expect("store");
    assert_update_run_follows_lifecycle(&store).await;
    assert_failed_run_keeps_error_text(&store).await;
}

#[tokio::test]
async fn regression_sqlite_claims_are_exclusive() {
    let dir = tempdir().expect("tempdir");
    let store = SqliteRunStore::new(dir.path().join("relay.sqlite")).expect("store");
    assert_claims_are_exclusive(&store).await;
}

#[tokio::test]
async fn integration_sqlite_records_messages_and_audit_events() {
    let dir = tempdir().expect("tempdir");
    let store = SqliteRunStore::new(dir.path().join("relay.sqlite")).expect("store");
    assert_messages_and_audit_events_are_recorded(&store).await;
}

#[tokio::test]
async fn integration_sqlite_tenancy_lookups() {
    let dir = tempdir().expect("tempdir");
    let store = SqliteRunStore::new(dir.path().join("relay.sqlite")).expect("store");
    assert_tenancy_lookups(&store).await;
}

#[tokio::test]
async fn integration_sqlite_state_survives_reopen() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("relay.sqlite");
    let run_id = {
        let store = SqliteRunStore::new(&path).expect("store");
        store
            .insert_run(new_run("ws_1", "chat:durable"))
            .await
            .expect("insert")
            .run
            .id
    };

    let reopened = SqliteRunStore::new(&path).expect("reopen");
    let insert = reopened
        .insert_run(new_run("ws_1", "chat:durable"))
        .await
        .expect("insert after reopen");
    assert!(!insert.created);
    assert_eq!(insert.run.id, run_id);
    assert_eq!(
        insert.run.input,
        json!({ "channel_id": "C123", "thread_ts": "1739999999.000100" })
    );
}

#[tokio::test]
async fn regression_sqlite_rejects_unknown_persisted_status() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("relay.sqlite");
    let store = SqliteRunStore::new(&path).expect("store");
    let run = store
        .insert_run(new_run("ws_1", "chat:corrupt"))
        .await
        .expect("insert")
        .run;

    let connection = rusqlite::Connection::open(&path).expect("open");
    connection
        .execute(
            "UPDATE runs SET status = 'exploded' WHERE id = ?1",
            rusqlite::params![run.id],
        )
        .expect("corrupt status");

    let error = store.get_run(&run.id).await.expect_err("invalid status");
    assert!(matches!(
        error,
        RunStoreError::InvalidPersistedValue { field: "run_status", .. }
    ));
}

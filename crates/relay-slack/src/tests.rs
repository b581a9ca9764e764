use httpmock::prelude::*;
use relay_runs::{
    default_suggested_prompts, AssistantThreadDecorator, ReplyTarget, Responder, ThreadFetcher,
};
use serde_json::json;

use crate::{SlackApiClient, SlackApiClientConfig};

fn client(base_url: &str) -> SlackApiClient {
    SlackApiClient::new(SlackApiClientConfig {
        api_base: base_url.to_string(),
        bot_token: "xoxb-test".to_string(),
        request_timeout_ms: 3_000,
        retry_max_attempts: 2,
        retry_base_delay_ms: 1,
    })
    .expect("client")
}

#[tokio::test]
async fn integration_fetch_thread_follows_cursor_and_drops_empty_messages() {
    let server = MockServer::start();
    let second_page = server.mock(|when, then| {
        when.method(GET)
            .path("/conversations.replies")
            .query_param("channel", "C1")
            .query_param("cursor", "page-2");
        then.status(200).json_body(json!({
            "ok": true,
            "messages": [
                {"ts": "1700000000.000003", "bot_id": "B1", "text": "bot summary"}
            ],
            "response_metadata": {"next_cursor": ""}
        }));
    });
    let first_page = server.mock(|when, then| {
        when.method(GET)
            .path("/conversations.replies")
            .query_param("channel", "C1")
            .query_param("ts", "1700000000.000001")
            .query_param("limit", "200")
            .header("authorization", "Bearer xoxb-test")
            .header("x-relay-retry-attempt", "0");
        then.status(200).json_body(json!({
            "ok": true,
            "messages": [
                {"ts": "1700000000.000001", "user": "U1", "text": "parent"},
                {"ts": "1700000000.000002", "user": "U2", "text": "   "},
                {"user": "U3", "text": "no ts"}
            ],
            "response_metadata": {"next_cursor": "page-2"}
        }));
    });

    let messages = client(&server.base_url())
        .fetch_thread("C1", "1700000000.000001")
        .await
        .expect("thread");
    first_page.assert_calls(1);
    second_page.assert_calls(1);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].user_id.as_deref(), Some("U1"));
    assert_eq!(messages[1].user_id.as_deref(), Some("B1"));
    assert_eq!(messages[1].text, "bot summary");
}

#[tokio::test]
async fn regression_fetch_thread_surfaces_ok_false_errors() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/conversations.replies");
        then.status(200)
            .json_body(json!({"ok": false, "error": "channel_not_found"}));
    });

    let error = client(&server.base_url())
        .fetch_thread("C404", "1700000000.000001")
        .await
        .expect_err("not found");
    assert!(error
        .to_string()
        .contains("slack conversations.replies failed: channel_not_found"));
}

#[tokio::test]
async fn functional_post_reply_targets_thread_without_unfurls() {
    let server = MockServer::start();
    let post = server.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .header("authorization", "Bearer xoxb-test")
            .json_body_includes(
                json!({
                    "channel": "C1",
                    "thread_ts": "1700000000.000001",
                    "text": "*Thread Summary*",
                    "unfurl_links": false,
                    "unfurl_media": false
                })
                .to_string(),
            );
        then.status(200)
            .json_body(json!({"ok": true, "channel": "C1", "ts": "1700000000.000009"}));
    });

    client(&server.base_url())
        .post_reply(
            &ReplyTarget {
                channel_id: "C1".to_string(),
                thread_ts: Some("1700000000.000001".to_string()),
            },
            "*Thread Summary*",
        )
        .await
        .expect("posted");
    post.assert_calls(1);
}

#[tokio::test]
async fn integration_post_message_retries_rate_limits() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .header("x-relay-retry-attempt", "0");
        then.status(429).header("retry-after", "0").body("rate limit");
    });
    let second = server.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .header("x-relay-retry-attempt", "1");
        then.status(200)
            .json_body(json!({"ok": true, "channel": "C1", "ts": "1.2"}));
    });

    let posted = client(&server.base_url())
        .post_message("C1", "hello", None)
        .await
        .expect("posted after retry");
    first.assert_calls(1);
    second.assert_calls(1);
    assert_eq!(posted.ts, "1.2");
}

#[tokio::test]
async fn regression_post_message_reports_slack_error_code() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat.postMessage");
        then.status(200)
            .json_body(json!({"ok": false, "error": "not_in_channel"}));
    });

    let error = client(&server.base_url())
        .post_message("C1", "hello", Some("1.1"))
        .await
        .expect_err("slack error");
    assert_eq!(
        error.to_string(),
        "slack chat.postMessage failed: not_in_channel"
    );
}

#[tokio::test]
async fn regression_client_errors_are_not_retried() {
    let server = MockServer::start();
    let bad_request = server.mock(|when, then| {
        when.method(POST).path("/chat.postMessage");
        then.status(400).body("invalid_auth");
    });

    let error = client(&server.base_url())
        .post_message("C1", "hello", None)
        .await
        .expect_err("bad request");
    bad_request.assert_calls(1);
    assert!(error.to_string().contains("status 400: invalid_auth"));
}

#[tokio::test]
async fn functional_assistant_thread_title_and_prompts_are_set() {
    let server = MockServer::start();
    let title = server.mock(|when, then| {
        when.method(POST)
            .path("/assistant.threads.setTitle")
            .header("authorization", "Bearer xoxb-test")
            .json_body(json!({
                "channel_id": "D9",
                "thread_ts": "1700000000.000001",
                "title": "Relay assistant"
            }));
        then.status(200).json_body(json!({"ok": true}));
    });
    let prompts = server.mock(|when, then| {
        when.method(POST)
            .path("/assistant.threads.setSuggestedPrompts")
            .json_body_includes(
                json!({
                    "channel_id": "D9",
                    "thread_ts": "1700000000.000001",
                    "prompts": [
                        {"title": "Improve the assistant", "message": "Help us make you a better assistant. What should we build first?"},
                        {"title": "Access rollout", "message": "How should we incrementally give you more channel and tool access?"},
                        {"title": "Cross-channel plan", "message": "Propose a phased plan for expanding your access across Slack channels and systems."},
                        {"title": "How to use this", "message": "How do I use this assistant?"}
                    ]
                })
                .to_string(),
            );
        then.status(200).json_body(json!({"ok": true}));
    });

    let client = client(&server.base_url());
    client
        .set_thread_title("D9", "1700000000.000001", "Relay assistant")
        .await
        .expect("title set");
    client
        .set_suggested_prompts("D9", "1700000000.000001", &default_suggested_prompts())
        .await
        .expect("prompts set");
    title.assert_calls(1);
    prompts.assert_calls(1);
}

#[tokio::test]
async fn regression_assistant_thread_errors_name_the_method() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/assistant.threads.setTitle");
        then.status(200)
            .json_body(json!({"ok": false, "error": "missing_scope"}));
    });

    let error = client(&server.base_url())
        .set_assistant_thread_title("D9", "1.1", "Relay assistant")
        .await
        .expect_err("slack error");
    assert_eq!(
        error.to_string(),
        "slack assistant.threads.setTitle failed: missing_scope"
    );
}

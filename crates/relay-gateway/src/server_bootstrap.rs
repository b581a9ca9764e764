use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

use crate::command_intake::handle_slack_command;
use crate::endpoints::{HEALTHZ_ENDPOINT, SLACK_COMMANDS_ENDPOINT, SLACK_EVENTS_ENDPOINT};
use crate::event_intake::handle_slack_event;
use crate::types::GatewayState;

pub fn build_gateway_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route(SLACK_COMMANDS_ENDPOINT, post(handle_slack_command))
        .route(SLACK_EVENTS_ENDPOINT, post(handle_slack_event))
        .route(HEALTHZ_ENDPOINT, get(handle_healthz))
        .with_state(state)
}

async fn handle_healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Serves the gateway on `bind` until `shutdown` resolves.
pub async fn run_gateway_server<F>(bind: &str, state: Arc<GatewayState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_addr = bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{bind}'"))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind relay gateway on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway address")?;
    info!(
        addr = %local_addr,
        commands = SLACK_COMMANDS_ENDPOINT,
        events = SLACK_EVENTS_ENDPOINT,
        "relay gateway listening"
    );

    axum::serve(listener, build_gateway_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("relay gateway server exited unexpectedly")?;
    info!("relay gateway stopped accepting requests");
    Ok(())
}

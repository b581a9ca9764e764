//! HTTP intake for Slack slash commands and Events API callbacks.
//!
//! Every request is authenticated before any state changes, deduplicated, turned into
//! an idempotent run, and handed to the worker pool before it is acknowledged.

mod command_intake;
mod endpoints;
mod event_intake;
mod intake;
mod server_bootstrap;
mod types;

pub use server_bootstrap::{build_gateway_router, run_gateway_server};
pub use types::{GatewayConfig, GatewayState};

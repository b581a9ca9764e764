use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use relay_core::{Clock, SystemClock};
use relay_gateway::{run_gateway_server, GatewayConfig, GatewayState};
use relay_runs::{
    recover_pending_runs, DedupConfig, InMemoryDedupCache, JobExecutor, OpenAiCompatClient,
    OpenAiCompatConfig, OpenAiCompatReplyGenerator, OpenAiCompatSummarizer, ReplyStrategy,
    RunLifecycleManager, SummaryStrategy, TokioWorkerPool, WorkerPoolConfig,
};
use relay_slack::{SlackApiClient, SlackApiClientConfig};
use relay_store::{RunRepository, SqliteRunStore, Workspace};
use tracing::{info, warn};

use crate::cli_args::{Cli, WorkspaceSeed};

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    let store = SqliteRunStore::new(&cli.state_db)
        .with_context(|| format!("failed to open state db {}", cli.state_db.display()))?;
    let repository: Arc<dyn RunRepository> = Arc::new(store);
    seed_workspaces(repository.as_ref(), &cli.seed_workspaces).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let lifecycle = RunLifecycleManager::new(repository, clock.clone());

    let slack = Arc::new(SlackApiClient::new(SlackApiClientConfig {
        api_base: cli.slack_api_base.clone(),
        bot_token: cli.slack_bot_token.clone(),
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
    })?);

    let mut executor = JobExecutor::new(lifecycle.clone(), slack.clone(), slack.clone())
        .with_thread_decorator(slack);
    match cli.llm_api_key() {
        Some(api_key) => {
            let client = OpenAiCompatClient::new(OpenAiCompatConfig {
                api_base: cli.llm_api_base.clone(),
                model: cli.llm_model.clone(),
                timeout_ms: cli.llm_timeout_ms,
                ..OpenAiCompatConfig::new(api_key)
            })?;
            info!(model = %cli.llm_model, "model-backed summaries and replies enabled");
            executor = executor
                .with_summary_strategy(SummaryStrategy::with_enhanced(Arc::new(
                    OpenAiCompatSummarizer::new(client.clone()),
                )))
                .with_reply_strategy(ReplyStrategy::with_generator(Arc::new(
                    OpenAiCompatReplyGenerator::new(client),
                )));
        }
        None => info!("no LLM api key configured; using heuristic summaries"),
    }

    let (pool, pool_handle) = TokioWorkerPool::start(
        WorkerPoolConfig {
            concurrency: cli.worker_concurrency,
            queue_capacity: cli.job_queue_capacity,
        },
        Arc::new(executor),
    );
    let recovered = recover_pending_runs(&lifecycle, pool.as_ref())
        .await
        .context("failed to recover pending runs")?;
    if recovered.deferred > 0 {
        warn!(
            deferred = recovered.deferred,
            "job queue filled during recovery; remaining runs wait for the next start"
        );
    }

    let dedup = Arc::new(InMemoryDedupCache::new(
        DedupConfig {
            ttl: Duration::from_secs(cli.dedup_ttl_seconds),
            max_entries: cli.dedup_max_entries,
        },
        clock.clone(),
    ));

    let mut config = GatewayConfig::new(cli.slack_signing_secret.clone(), cli.allowed_commands());
    config.default_workspace_id = cli
        .default_workspace_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    config.signature_tolerance_seconds = cli.signature_tolerance_seconds;

    let state = Arc::new(GatewayState::new(
        config,
        lifecycle,
        dedup,
        pool.clone(),
        clock,
    ));

    let served = run_gateway_server(&cli.bind, state, shutdown_signal()).await;

    pool.close();
    pool_handle.drain().await;
    info!("worker pool drained");
    served
}

async fn seed_workspaces(repository: &dyn RunRepository, seeds: &[WorkspaceSeed]) -> Result<()> {
    for seed in seeds {
        repository
            .upsert_workspace(Workspace {
                id: seed.workspace_id.clone(),
                name: seed.workspace_id.clone(),
                slack_team_id: Some(seed.team_id.clone()),
            })
            .await
            .with_context(|| format!("failed to seed workspace {}", seed.workspace_id))?;
        info!(
            team_id = %seed.team_id,
            workspace_id = %seed.workspace_id,
            "seeded workspace mapping"
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use relay_store::{RunRepository, SqliteRunStore};
    use tempfile::tempdir;

    use super::seed_workspaces;
    use crate::cli_args::WorkspaceSeed;

    #[tokio::test]
    async fn functional_seeded_workspaces_resolve_by_team() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteRunStore::new(temp.path().join("state/relay.sqlite")).expect("store");
        let seeds = vec![WorkspaceSeed {
            team_id: "T1".to_string(),
            workspace_id: "ws_1".to_string(),
        }];

        seed_workspaces(&store, &seeds).await.expect("seed");
        seed_workspaces(&store, &seeds).await.expect("reseed is idempotent");

        let workspace = store
            .workspace_by_team_id("T1")
            .await
            .expect("lookup")
            .expect("workspace");
        assert_eq!(workspace.id, "ws_1");
    }
}

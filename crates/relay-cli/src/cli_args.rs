use std::path::PathBuf;

use clap::Parser;
use relay_runs::{
    DEFAULT_DEDUP_MAX_ENTRIES, DEFAULT_JOB_QUEUE_CAPACITY, DEFAULT_LLM_API_BASE,
    DEFAULT_LLM_MODEL, DEFAULT_LLM_TIMEOUT_MS, DEFAULT_WORKER_CONCURRENCY,
};
use relay_slack::{
    DEFAULT_SIGNATURE_TOLERANCE_SECONDS, DEFAULT_SLACK_API_BASE, DEFAULT_SLACK_REQUEST_TIMEOUT_MS,
    DEFAULT_SLACK_RETRY_BASE_DELAY_MS, DEFAULT_SLACK_RETRY_MAX_ATTEMPTS,
};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

/// `TEAM_ID=WORKSPACE_ID` mapping seeded into the store at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkspaceSeed {
    pub(crate) team_id: String,
    pub(crate) workspace_id: String,
}

fn parse_workspace_seed(value: &str) -> Result<WorkspaceSeed, String> {
    let (team_id, workspace_id) = value
        .split_once('=')
        .ok_or_else(|| "expected TEAM_ID=WORKSPACE_ID".to_string())?;
    let team_id = team_id.trim();
    let workspace_id = workspace_id.trim();
    if team_id.is_empty() || workspace_id.is_empty() {
        return Err("team id and workspace id must be non-empty".to_string());
    }
    Ok(WorkspaceSeed {
        team_id: team_id.to_string(),
        workspace_id: workspace_id.to_string(),
    })
}

#[derive(Debug, Parser)]
#[command(
    name = "relay",
    about = "Slack thread summary and assistant relay",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "RELAY_BIND",
        default_value = "127.0.0.1:8787",
        help = "Socket address the HTTP gateway listens on"
    )]
    pub(crate) bind: String,

    #[arg(
        long = "state-db",
        env = "RELAY_STATE_DB",
        default_value = ".relay/relay.sqlite",
        help = "SQLite database holding runs, messages, and audit events"
    )]
    pub(crate) state_db: PathBuf,

    #[arg(
        long = "slack-signing-secret",
        env = "SLACK_SIGNING_SECRET",
        hide_env_values = true,
        help = "Signing secret used to verify inbound Slack requests"
    )]
    pub(crate) slack_signing_secret: String,

    #[arg(
        long = "slack-bot-token",
        env = "SLACK_BOT_TOKEN",
        hide_env_values = true,
        help = "Bot token for the Slack Web API"
    )]
    pub(crate) slack_bot_token: String,

    #[arg(long = "slack-api-base", env = "SLACK_API_BASE", default_value = DEFAULT_SLACK_API_BASE)]
    pub(crate) slack_api_base: String,

    #[arg(
        long = "slack-allowed-commands",
        env = "SLACK_ALLOWED_COMMANDS",
        value_delimiter = ',',
        default_value = "/relay-summary",
        help = "Comma-separated slash commands accepted by the gateway"
    )]
    pub(crate) slack_allowed_commands: Vec<String>,

    #[arg(
        long = "default-workspace-id",
        env = "DEFAULT_WORKSPACE_ID",
        help = "Workspace used when a Slack team has no explicit mapping"
    )]
    pub(crate) default_workspace_id: Option<String>,

    #[arg(
        long = "seed-workspace",
        env = "RELAY_SEED_WORKSPACES",
        value_delimiter = ',',
        value_parser = parse_workspace_seed,
        help = "TEAM_ID=WORKSPACE_ID mappings written to the store at startup"
    )]
    pub(crate) seed_workspaces: Vec<WorkspaceSeed>,

    #[arg(
        long = "signature-tolerance-seconds",
        env = "RELAY_SIGNATURE_TOLERANCE_SECONDS",
        default_value_t = DEFAULT_SIGNATURE_TOLERANCE_SECONDS,
        value_parser = parse_positive_u64
    )]
    pub(crate) signature_tolerance_seconds: u64,

    #[arg(
        long = "dedup-ttl-seconds",
        env = "RELAY_DEDUP_TTL_SECONDS",
        default_value_t = 600,
        value_parser = parse_positive_u64
    )]
    pub(crate) dedup_ttl_seconds: u64,

    #[arg(
        long = "dedup-max-entries",
        env = "RELAY_DEDUP_MAX_ENTRIES",
        default_value_t = DEFAULT_DEDUP_MAX_ENTRIES,
        value_parser = parse_positive_usize
    )]
    pub(crate) dedup_max_entries: usize,

    #[arg(
        long = "worker-concurrency",
        env = "RELAY_WORKER_CONCURRENCY",
        default_value_t = DEFAULT_WORKER_CONCURRENCY,
        value_parser = parse_positive_usize
    )]
    pub(crate) worker_concurrency: usize,

    #[arg(
        long = "job-queue-capacity",
        env = "RELAY_JOB_QUEUE_CAPACITY",
        default_value_t = DEFAULT_JOB_QUEUE_CAPACITY,
        value_parser = parse_positive_usize
    )]
    pub(crate) job_queue_capacity: usize,

    #[arg(
        long = "request-timeout-ms",
        env = "RELAY_REQUEST_TIMEOUT_MS",
        default_value_t = DEFAULT_SLACK_REQUEST_TIMEOUT_MS,
        value_parser = parse_positive_u64
    )]
    pub(crate) request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "RELAY_RETRY_MAX_ATTEMPTS",
        default_value_t = DEFAULT_SLACK_RETRY_MAX_ATTEMPTS,
        value_parser = parse_positive_usize
    )]
    pub(crate) retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "RELAY_RETRY_BASE_DELAY_MS",
        default_value_t = DEFAULT_SLACK_RETRY_BASE_DELAY_MS,
        value_parser = parse_positive_u64
    )]
    pub(crate) retry_base_delay_ms: u64,

    #[arg(
        long = "llm-api-key",
        env = "LLM_API_KEY",
        hide_env_values = true,
        help = "Enables the model-backed summarizer and free-text replies"
    )]
    pub(crate) llm_api_key: Option<String>,

    #[arg(long = "llm-api-base", env = "LLM_API_BASE", default_value = DEFAULT_LLM_API_BASE)]
    pub(crate) llm_api_base: String,

    #[arg(long = "llm-model", env = "LLM_MODEL", default_value = DEFAULT_LLM_MODEL)]
    pub(crate) llm_model: String,

    #[arg(
        long = "llm-timeout-ms",
        env = "LLM_TIMEOUT_MS",
        default_value_t = DEFAULT_LLM_TIMEOUT_MS,
        value_parser = parse_positive_u64
    )]
    pub(crate) llm_timeout_ms: u64,
}

impl Cli {
    /// The configured LLM key, ignoring blank values.
    pub(crate) fn llm_api_key(&self) -> Option<&str> {
        self.llm_api_key
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub(crate) fn allowed_commands(&self) -> Vec<String> {
        self.slack_allowed_commands
            .iter()
            .map(|command| command.trim().to_string())
            .filter(|command| !command.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{parse_workspace_seed, Cli, WorkspaceSeed};

    fn parse(extra: &[&str]) -> Cli {
        let mut args = vec![
            "relay",
            "--slack-signing-secret",
            "secret",
            "--slack-bot-token",
            "xoxb-1",
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).expect("parse cli")
    }

    #[test]
    fn unit_defaults_match_documented_values() {
        let cli = parse(&[]);
        assert_eq!(cli.bind, "127.0.0.1:8787");
        assert_eq!(cli.signature_tolerance_seconds, 300);
        assert_eq!(cli.dedup_ttl_seconds, 600);
        assert_eq!(cli.dedup_max_entries, 10_000);
        assert_eq!(cli.worker_concurrency, 4);
        assert_eq!(cli.job_queue_capacity, 256);
        assert_eq!(cli.allowed_commands(), vec!["/relay-summary".to_string()]);
        assert_eq!(cli.slack_api_base, "https://slack.com/api");
    }

    #[test]
    fn functional_comma_lists_and_seeds_parse() {
        let cli = parse(&[
            "--slack-allowed-commands",
            "/relay-summary, /summarize",
            "--seed-workspace",
            "T1=ws_1,T2=ws_2",
            "--llm-api-key",
            "  ",
        ]);
        assert_eq!(
            cli.allowed_commands(),
            vec!["/relay-summary".to_string(), "/summarize".to_string()]
        );
        assert_eq!(
            cli.seed_workspaces,
            vec![
                WorkspaceSeed {
                    team_id: "T1".to_string(),
                    workspace_id: "ws_1".to_string(),
                },
                WorkspaceSeed {
                    team_id: "T2".to_string(),
                    workspace_id: "ws_2".to_string(),
                },
            ]
        );
        assert_eq!(cli.llm_api_key(), None);
    }

    #[test]
    fn regression_zero_concurrency_is_rejected() {
        let result = Cli::try_parse_from([
            "relay",
            "--slack-signing-secret",
            "secret",
            "--slack-bot-token",
            "xoxb-1",
            "--worker-concurrency",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn unit_workspace_seed_requires_both_sides() {
        assert!(parse_workspace_seed("T1").is_err());
        assert!(parse_workspace_seed("=ws_1").is_err());
        assert_eq!(
            parse_workspace_seed(" T1 = ws_1 "),
            Ok(WorkspaceSeed {
                team_id: "T1".to_string(),
                workspace_id: "ws_1".to_string(),
            })
        );
    }
}

//! Assistant replies: deterministic topic playbooks and the optional reply generator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capabilities::{SuggestedPrompt, ThreadMessage};
use crate::generation::GenerationError;

pub const LLM_ERROR_REPLY: &str = "I hit an error while drafting a response. Please try again, \
     or ask for `roadmap` or `access` for deterministic guidance.";

pub const LLM_DISABLED_REPLY: &str = "Free-form chat is currently disabled. Set `LLM_API_KEY` \
     for the relay process to enable it.\n\nYou can still use deterministic commands: `roadmap`, \
     `memory`, `integrations`, `workflows`, `quality`, `access`.";

/// Title set on every assistant thread the relay opens or re-attaches to.
pub const ASSISTANT_THREAD_TITLE: &str = "Relay assistant";

/// Fixed planning topics the assistant can answer without a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantTopic {
    Roadmap,
    Access,
    Memory,
    Integrations,
    Workflows,
    Quality,
}

impl AssistantTopic {
    pub const ALL: [Self; 6] = [
        Self::Roadmap,
        Self::Access,
        Self::Memory,
        Self::Integrations,
        Self::Workflows,
        Self::Quality,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Roadmap => "roadmap",
            Self::Access => "access",
            Self::Memory => "memory",
            Self::Integrations => "integrations",
            Self::Workflows => "workflows",
            Self::Quality => "quality",
        }
    }

    /// Exact topic keyword, case-insensitive, optionally prefixed with `/`.
    pub fn from_command(text: &str) -> Option<Self> {
        let normalized = text.trim().to_ascii_lowercase();
        let command = normalized.strip_prefix('/').unwrap_or(&normalized);
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str() == command)
    }

    /// Best-effort keyword inference for free text. Earlier topics win.
    pub fn infer(text: &str) -> Option<Self> {
        const KEYWORDS: [(AssistantTopic, &[&str]); 6] = [
            (AssistantTopic::Access, &["access", "permission", "channel"]),
            (AssistantTopic::Memory, &["memory", "context"]),
            (
                AssistantTopic::Integrations,
                &["integration", "jira", "linear", "github", "notion"],
            ),
            (
                AssistantTopic::Workflows,
                &["workflow", "automation", "digest", "standup"],
            ),
            (
                AssistantTopic::Quality,
                &["quality", "guardrail", "approval", "confidence"],
            ),
            (
                AssistantTopic::Roadmap,
                &["roadmap", "plan", "what should we build", "make you better"],
            ),
        ];

        let lower = text.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(_, needles)| needles.iter().any(|needle| lower.contains(needle)))
            .map(|(topic, _)| *topic)
    }

    pub fn render(self, context: &AssistantContext) -> String {
        let lines: Vec<String> = match self {
            Self::Roadmap => [
                "Suggested near-term roadmap:",
                "1) Context pack (1 day): goals, owners, glossary, constraints.",
                "2) Integration pass (2-3 days): connect ticketing, code, and docs sources.",
                "3) Workflow automations (2 days): digests, blockers, and decision tracking.",
                "4) Response contracts (1 day): output templates, confidence labels, escalation rules.",
                "5) Validation loop (ongoing): weekly feedback and prompt/tool updates.",
                "",
                "If useful, I can turn this into a backlog with owners and acceptance criteria.",
            ]
            .map(str::to_string)
            .to_vec(),
            Self::Access => {
                let context_line = match context.source_channel_id.as_deref() {
                    Some(channel) => format!("Current source channel context: {channel}"),
                    None => "No source channel context is attached to this conversation."
                        .to_string(),
                };
                vec![
                    "Access rollout plan:".to_string(),
                    "1) Define value targets: which decisions and actions should improve first."
                        .to_string(),
                    "2) Pilot channels: grant 1-2 high-signal channels with clear owners."
                        .to_string(),
                    "3) Add systems in order: ticketing, code, docs, then incidents.".to_string(),
                    "4) Add controls: response contracts, confidence labels, approval gates."
                        .to_string(),
                    "5) Expand scope weekly based on observed quality and missed-action rate."
                        .to_string(),
                    String::new(),
                    context_line,
                    String::new(),
                    "Share your current tools and constraints and I can produce a phased access matrix."
                        .to_string(),
                ]
            }
            Self::Memory => [
                "Memory setup plan:",
                "1) Create a canonical project context doc (mission, owners, glossary, constraints).",
                "2) Add a decision log with date, decision, rationale, and links.",
                "3) Add per-team preferences (tone, format, escalation defaults).",
                "4) Add a weekly refresh checklist so stale context is corrected.",
                "",
                "Build target: a machine-readable context bundle loaded before answering.",
            ]
            .map(str::to_string)
            .to_vec(),
            Self::Integrations => [
                "Integration setup plan:",
                "1) Ticket source: sync open work, priorities, and due dates.",
                "2) Code source: map pull requests and commits to tickets and releases.",
                "3) Knowledge source: index docs and runbooks behind a retrieval endpoint.",
                "4) Incident source: ingest alerts to connect impact with team actions.",
                "",
                "Build target: one unified context feed that replies can cite.",
            ]
            .map(str::to_string)
            .to_vec(),
            Self::Workflows => [
                "Workflow setup plan:",
                "1) Daily digest: blockers, decisions, ownership gaps, upcoming deadlines.",
                "2) Action-item tracker: owners and due dates pulled from conversations.",
                "3) Follow-up reminders: ping unresolved items after the agreed SLA.",
                "4) Weekly retro brief: wins, misses, and process improvements.",
                "",
                "Build target: fewer dropped tasks and clearer operational visibility.",
            ]
            .map(str::to_string)
            .to_vec(),
            Self::Quality => [
                "Quality-control setup plan:",
                "1) Define required response formats by task type (planning, incident, execution).",
                "2) Require confidence and evidence on high-impact answers.",
                "3) Add approval gates for sensitive actions (external posts, escalations).",
                "4) Track false positives, missed actions, and correction latency.",
                "",
                "Build target: predictable, auditable assistant behavior.",
            ]
            .map(str::to_string)
            .to_vec(),
        };
        lines.join("\n")
    }
}

pub fn help_text() -> String {
    [
        "I can help in a few ways:",
        "1) Summarize a thread: mention me with a thread link or timestamp.",
        "2) Planning playbooks: `roadmap`, `access`, `memory`, `integrations`, `workflows`, `quality`.",
        "3) Free-form questions when a model is configured.",
        "",
        "Try:",
        "- `summarize https://example.slack.com/archives/C123/p1739999999000100`",
        "- `How should we roll out your access across channels?`",
    ]
    .join("\n")
}

/// Opening message for a freshly started assistant thread.
pub fn kickoff_text() -> String {
    [
        "Current focus:",
        "1) We can chat about how to improve this assistant.",
        "2) We can incrementally expand my access across channels so I can help better.",
        "",
        "Reply with `roadmap`, `memory`, `integrations`, `workflows`, `quality`, or `access` \
         and I will draft a concrete plan.",
    ]
    .join("\n")
}

/// Prompt buttons offered at the top of an assistant thread.
pub fn default_suggested_prompts() -> Vec<SuggestedPrompt> {
    [
        (
            "Improve the assistant",
            "Help us make you a better assistant. What should we build first?",
        ),
        (
            "Access rollout",
            "How should we incrementally give you more channel and tool access?",
        ),
        (
            "Cross-channel plan",
            "Propose a phased plan for expanding your access across Slack channels and systems.",
        ),
        ("How to use this", "How do I use this assistant?"),
    ]
    .into_iter()
    .map(|(title, message)| SuggestedPrompt {
        title: title.to_string(),
        message: message.to_string(),
    })
    .collect()
}

/// Conversation context carried from the chat platform into the run input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantContext {
    pub source_channel_id: Option<String>,
    pub team_id: Option<String>,
}

/// What an `assistant_reply` run should answer. Stored in the run input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantRequest {
    Help,
    Topic { topic: AssistantTopic },
    FreeText { text: String },
    /// The user opened a new assistant thread.
    ThreadStarted,
    /// The user switched channels while an assistant thread was open.
    ContextChanged,
}

impl AssistantRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Topic { .. } => "topic",
            Self::FreeText { .. } => "free_text",
            Self::ThreadStarted => "thread_started",
            Self::ContextChanged => "context_changed",
        }
    }

    /// Context changes only refresh the thread title and prompts.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Self::ContextChanged)
    }

    /// True for assistant thread lifecycle requests, which set the title and prompts.
    pub fn decorates_thread(&self) -> bool {
        matches!(self, Self::ThreadStarted | Self::ContextChanged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyInput {
    pub text: String,
    pub context: AssistantContext,
    pub thread_messages: Vec<ThreadMessage>,
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(&self, input: &ReplyInput) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    Deterministic,
    Generated,
    Fallback,
}

impl ReplyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deterministic => "deterministic",
            Self::Generated => "generated",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyResolution {
    pub text: String,
    pub mode: ReplyMode,
    pub fallback_error: Option<String>,
}

/// Chooses between the optional reply generator and deterministic playbooks.
#[derive(Clone, Default)]
pub struct ReplyStrategy {
    generator: Option<Arc<dyn ReplyGenerator>>,
}

impl ReplyStrategy {
    pub fn deterministic_only() -> Self {
        Self { generator: None }
    }

    pub fn with_generator(generator: Arc<dyn ReplyGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    /// True when answering `request` would send thread history to the generator.
    pub fn wants_thread_history(&self, request: &AssistantRequest) -> bool {
        self.generator.is_some() && matches!(request, AssistantRequest::FreeText { .. })
    }

    pub async fn reply(
        &self,
        request: &AssistantRequest,
        context: &AssistantContext,
        thread_messages: Vec<ThreadMessage>,
    ) -> ReplyResolution {
        let text = match request {
            AssistantRequest::Help => return deterministic(help_text()),
            AssistantRequest::ThreadStarted | AssistantRequest::ContextChanged => {
                return deterministic(kickoff_text())
            }
            AssistantRequest::Topic { topic } => return deterministic(topic.render(context)),
            AssistantRequest::FreeText { text } => text,
        };

        let inferred = AssistantTopic::infer(text);
        let Some(generator) = &self.generator else {
            return deterministic(match inferred {
                Some(topic) => topic.render(context),
                None => LLM_DISABLED_REPLY.to_string(),
            });
        };

        let input = ReplyInput {
            text: text.clone(),
            context: context.clone(),
            thread_messages,
        };
        match generator.generate_reply(&input).await {
            Ok(reply) => ReplyResolution {
                text: reply,
                mode: ReplyMode::Generated,
                fallback_error: None,
            },
            Err(error) => ReplyResolution {
                text: match inferred {
                    Some(topic) => topic.render(context),
                    None => LLM_ERROR_REPLY.to_string(),
                },
                mode: ReplyMode::Fallback,
                fallback_error: Some(error.to_string()),
            },
        }
    }
}

fn deterministic(text: String) -> ReplyResolution {
    ReplyResolution {
        text,
        mode: ReplyMode::Deterministic,
        fallback_error: None,
    }
}

//! Run orchestration for the relay gateway.
//!
//! Owns the run lifecycle manager, the bounded worker pool that executes queued runs,
//! intake deduplication, and the summary and assistant reply strategies used by the
//! job executor. Chat-platform transports plug in through [`ThreadFetcher`],
//! [`Responder`], and [`AssistantThreadDecorator`].

pub mod assistant;
pub mod assistant_context;
pub mod capabilities;
pub mod dedup;
pub mod dispatch;
pub mod executor;
pub mod generation;
pub mod lifecycle;
pub mod openai_compat;
pub mod recovery;
pub mod summary;
pub mod tasks;

pub use assistant::{
    default_suggested_prompts, help_text, kickoff_text, AssistantContext, AssistantRequest,
    AssistantTopic, ReplyGenerator, ReplyInput, ReplyMode, ReplyResolution, ReplyStrategy,
    ASSISTANT_THREAD_TITLE, LLM_DISABLED_REPLY, LLM_ERROR_REPLY,
};
pub use assistant_context::{AssistantContextCache, DEFAULT_ASSISTANT_CONTEXT_ENTRIES};
pub use capabilities::{
    AssistantThreadDecorator, ReplyTarget, Responder, SuggestedPrompt, ThreadFetcher,
    ThreadMessage,
};
pub use dedup::{
    DedupCache, DedupConfig, DedupStatus, InMemoryDedupCache, DEFAULT_DEDUP_MAX_ENTRIES,
    DEFAULT_DEDUP_TTL,
};
pub use dispatch::{
    DispatchError, JobHandler, JobPayload, TokioWorkerPool, WorkerPoolConfig, WorkerPoolHandle,
    WorkflowDispatcher, DEFAULT_JOB_QUEUE_CAPACITY, DEFAULT_WORKER_CONCURRENCY,
};
pub use executor::{Delivery, ExecutionOutcome, JobExecutor, TaskError};
pub use generation::GenerationError;
pub use lifecycle::{
    idempotency_key, AuditActor, CreateRunRequest, LifecycleError, RunLifecycleManager,
};
pub use openai_compat::{
    OpenAiCompatClient, OpenAiCompatConfig, OpenAiCompatReplyGenerator, OpenAiCompatSummarizer,
    DEFAULT_LLM_API_BASE, DEFAULT_LLM_MODEL, DEFAULT_LLM_TIMEOUT_MS,
};
pub use recovery::{recover_pending_runs, RecoveryReport};
pub use summary::{
    format_thread_summary_for_slack, summarize_thread, LocalThreadSummarizer, SummaryMode,
    SummaryResolution, SummaryStrategy, ThreadSummarizer, ThreadSummary, ThreadSummaryInput,
};
pub use tasks::{AssistantReplyTask, RunInput, ThreadSummaryTask};

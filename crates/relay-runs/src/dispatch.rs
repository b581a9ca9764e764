//! Hands jobs to asynchronous execution: the dispatcher seam and the tokio worker pool.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use relay_store::{RunClaim, TaskKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::capabilities::ReplyTarget;

pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;
pub const DEFAULT_JOB_QUEUE_CAPACITY: usize = 256;

/// Work item identifying one run to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub run_id: String,
    pub workspace_id: String,
    pub task_kind: TaskKind,
    pub reply: ReplyTarget,
    pub initiated_by_user_id: Option<String>,
    pub actor_id: Option<String>,
    /// `resume` only for runs recovered in `running` after a restart.
    #[serde(default)]
    pub claim: RunClaim,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("job queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },
    #[error("job queue is closed")]
    Closed,
}

impl DispatchError {
    /// True when the same job may be enqueued again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }
}

#[async_trait]
pub trait WorkflowDispatcher: Send + Sync {
    async fn enqueue(&self, job: JobPayload) -> Result<(), DispatchError>;
}

/// Consumer side of the dispatcher.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: JobPayload);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    pub concurrency: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_WORKER_CONCURRENCY,
            queue_capacity: DEFAULT_JOB_QUEUE_CAPACITY,
        }
    }
}

/// Bounded queue drained by at most `concurrency` concurrently running handlers.
pub struct TokioWorkerPool {
    sender: Mutex<Option<mpsc::Sender<JobPayload>>>,
    capacity: usize,
}

/// Join handle for the pool's dispatch loop.
pub struct WorkerPoolHandle {
    join: JoinHandle<()>,
}

impl WorkerPoolHandle {
    /// Waits until every accepted job has finished. Call after [`TokioWorkerPool::close`].
    pub async fn drain(self) {
        if let Err(error) = self.join.await {
            warn!(error = %error, "worker pool dispatch loop ended abnormally");
        }
    }
}

impl TokioWorkerPool {
    pub fn start(
        config: WorkerPoolConfig,
        handler: Arc<dyn JobHandler>,
    ) -> (Arc<Self>, WorkerPoolHandle) {
        let capacity = config.queue_capacity.max(1);
        let concurrency = config.concurrency.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let join = tokio::spawn(run_dispatch_loop(receiver, handler, concurrency));
        (
            Arc::new(Self {
                sender: Mutex::new(Some(sender)),
                capacity,
            }),
            WorkerPoolHandle { join },
        )
    }

    /// Stops accepting jobs. Already queued jobs still run.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[async_trait]
impl WorkflowDispatcher for TokioWorkerPool {
    async fn enqueue(&self, job: JobPayload) -> Result<(), DispatchError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Err(DispatchError::Closed);
        };
        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(run_id = %job.run_id, capacity = self.capacity, "job queue is full");
                Err(DispatchError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::Closed),
        }
    }
}

async fn run_dispatch_loop(
    mut receiver: mpsc::Receiver<JobPayload>,
    handler: Arc<dyn JobHandler>,
    concurrency: usize,
) {
    let permits = Arc::new(Semaphore::new(concurrency));
    while let Some(job) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let handler = handler.clone();
        debug!(run_id = %job.run_id, "dispatching job");
        tokio::spawn(async move {
            handler.handle(job).await;
            drop(permit);
        });
    }

    let total = u32::try_from(concurrency).unwrap_or(u32::MAX);
    if permits.acquire_many(total).await.is_err() {
        warn!("worker pool semaphore closed before drain completed");
    }
}

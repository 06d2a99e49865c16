//! Background worker
//!
//! A scheduler enqueues monitoring jobs on fixed intervals onto an in-process
//! queue; a single dispatcher task consumes them.

pub mod dispatcher;
pub mod host;
pub mod jobs;
pub mod queue;
pub mod scheduler;

pub use dispatcher::{Worker, WorkerStats};
pub use jobs::{simulated_value, Job};
pub use host::{HostMetrics, HostSampler, SystemStatsService};
pub use queue::{JobQueue, JobReceiver};
pub use scheduler::MonitorScheduler;

use crate::alerts::AlertError;
use crate::config::WorkerConfig;
use crate::database::DatabaseError;
use crate::recovery::RecoveryError;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Job queue is closed")]
    QueueClosed,

    #[error("Job queue is full, dropped {0}")]
    QueueFull(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("Alert error: {0}")]
    Alert(#[from] AlertError),
}

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Running scheduler and dispatcher tasks
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    scheduler: JoinHandle<()>,
    dispatcher: JoinHandle<WorkerStats>,
}

impl WorkerHandle {
    /// Spawn the dispatcher over `rx` and a scheduler feeding `queue`
    pub fn start(config: WorkerConfig, worker: Worker, queue: JobQueue, rx: JobReceiver) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let scheduler = MonitorScheduler::new(config, queue).spawn(shutdown_rx.clone());
        let dispatcher = tokio::spawn(worker.run(rx, shutdown_rx));

        Self {
            shutdown,
            scheduler,
            dispatcher,
        }
    }

    /// Signal both tasks and wait for them to finish
    pub async fn shutdown(self) -> WorkerStats {
        let _ = self.shutdown.send(true);

        if let Err(e) = self.scheduler.await {
            tracing::error!("Scheduler task failed: {}", e);
        }
        match self.dispatcher.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!("Dispatcher task failed: {}", e);
                WorkerStats::default()
            }
        }
    }
}

use super::jobs::Job;
use super::{WorkerError, WorkerResult};
use tokio::sync::mpsc::{self, error::TrySendError};

pub type JobReceiver = mpsc::Receiver<Job>;

/// Sending side of the in-process job queue
#[derive(Clone, Debug)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue a job, waiting for space
    pub async fn enqueue(&self, job: Job) -> WorkerResult<()> {
        tracing::debug!("Enqueueing job {}", job);
        self.tx.send(job).await.map_err(|_| WorkerError::QueueClosed)
    }

    /// Enqueue without waiting. Used from the consumer side, which must never
    /// block on its own queue.
    pub fn try_enqueue(&self, job: Job) -> WorkerResult<()> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => Err(WorkerError::QueueFull(job.to_string())),
            Err(TrySendError::Closed(_)) => Err(WorkerError::QueueClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jobs_arrive_in_order() {
        let (queue, mut rx) = JobQueue::new(4);
        queue.enqueue(Job::CheckSystemHealth).await.unwrap();
        queue.try_enqueue(Job::TriggerRecovery { incident_id: 1 }).unwrap();

        assert_eq!(rx.recv().await, Some(Job::CheckSystemHealth));
        assert_eq!(rx.recv().await, Some(Job::TriggerRecovery { incident_id: 1 }));
    }

    #[tokio::test]
    async fn test_full_and_closed_queue() {
        let (queue, rx) = JobQueue::new(1);
        queue.try_enqueue(Job::MonitorServices).unwrap();
        assert!(matches!(
            queue.try_enqueue(Job::MonitorServices),
            Err(WorkerError::QueueFull(_))
        ));

        drop(rx);
        assert!(matches!(
            queue.enqueue(Job::SendDailySummary).await,
            Err(WorkerError::QueueClosed)
        ));
    }
}

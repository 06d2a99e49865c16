use super::jobs::Job;
use super::queue::JobQueue;
use crate::config::WorkerConfig;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

/// Periodically enqueues the monitoring jobs
pub struct MonitorScheduler {
    config: WorkerConfig,
    queue: JobQueue,
}

fn ticker(period: Duration, immediate: bool) -> Interval {
    let mut ticker = if immediate {
        interval(period)
    } else {
        interval_at(Instant::now() + period, period)
    };
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl MonitorScheduler {
    pub fn new(config: WorkerConfig, queue: JobQueue) -> Self {
        Self { config, queue }
    }

    /// Start the scheduler loop. Health and service checks fire right away,
    /// the daily summary after its first full interval.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let cfg = &self.config;
            let mut health = ticker(Duration::from_secs(cfg.system_health_interval_secs), true);
            let mut services = ticker(Duration::from_secs(cfg.services_interval_secs), true);
            let mut summary = ticker(Duration::from_secs(cfg.daily_summary_interval_secs), false);

            info!(
                system_health_secs = cfg.system_health_interval_secs,
                services_secs = cfg.services_interval_secs,
                daily_summary = cfg.daily_summary_enabled,
                "Monitor scheduler started"
            );

            loop {
                let job = tokio::select! {
                    _ = health.tick(), if cfg.system_health_enabled => Job::CheckSystemHealth,
                    _ = services.tick(), if cfg.services_enabled => Job::MonitorServices,
                    _ = summary.tick(), if cfg.daily_summary_enabled => Job::SendDailySummary,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                };

                if let Err(e) = self.queue.enqueue(job).await {
                    warn!("Scheduler stopping: {}", e);
                    break;
                }
            }

            info!("Monitor scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkerConfig {
        WorkerConfig {
            system_health_interval_secs: 60,
            services_interval_secs: 120,
            daily_summary_enabled: true,
            daily_summary_interval_secs: 86_400,
            ..WorkerConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_follow_intervals() {
        let (queue, mut rx) = JobQueue::new(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = MonitorScheduler::new(config(), queue).spawn(shutdown_rx);

        tokio::time::sleep(Duration::from_secs(150)).await;

        let mut health = 0;
        let mut services = 0;
        let mut summaries = 0;
        while let Ok(job) = rx.try_recv() {
            match job {
                Job::CheckSystemHealth => health += 1,
                Job::MonitorServices => services += 1,
                Job::SendDailySummary => summaries += 1,
                other => panic!("unexpected job {:?}", other),
            }
        }
        // t = 0, 60, 120 and t = 0, 120
        assert_eq!(health, 3);
        assert_eq!(services, 2);
        assert_eq!(summaries, 0);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_jobs_are_not_scheduled() {
        let config = WorkerConfig {
            services_enabled: false,
            ..config()
        };
        let (queue, mut rx) = JobQueue::new(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = MonitorScheduler::new(config, queue).spawn(shutdown_rx);

        tokio::time::sleep(Duration::from_secs(30)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(rx.try_recv().ok(), Some(Job::CheckSystemHealth));
        assert!(rx.try_recv().is_err());
    }
}

use super::jobs::{simulated_value, Job};
use super::host::HostSampler;
use super::queue::{JobQueue, JobReceiver};
use super::WorkerResult;
use crate::alerts::Mailer;
use crate::database::{Incident, Severity};
use crate::incidents::IncidentDetector;
use crate::recovery::{AutoRecovery, RecoveryOutcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Counters kept by the dispatcher loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub incidents_created: u64,
    pub recoveries_succeeded: u64,
}

/// Consumes jobs one at a time
pub struct Worker {
    detector: IncidentDetector,
    recovery: AutoRecovery,
    mailer: Mailer,
    queue: JobQueue,
    sampler: Box<dyn HostSampler>,
    services: Vec<String>,
    rng: StdRng,
    stats: WorkerStats,
}

impl Worker {
    pub fn new(
        detector: IncidentDetector,
        recovery: AutoRecovery,
        mailer: Mailer,
        queue: JobQueue,
        sampler: Box<dyn HostSampler>,
        services: Vec<String>,
    ) -> Self {
        Self {
            detector,
            recovery,
            mailer,
            queue,
            sampler,
            services,
            rng: StdRng::from_entropy(),
            stats: WorkerStats::default(),
        }
    }

    /// Seed the simulated service monitor
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Process jobs until the queue closes or shutdown is signalled
    pub async fn run(mut self, mut rx: JobReceiver, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        info!("Worker started");

        loop {
            tokio::select! {
                job = rx.recv() => match job {
                    Some(job) => self.process(job).await,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            processed = self.stats.jobs_processed,
            failed = self.stats.jobs_failed,
            "Worker stopped"
        );
        self.stats
    }

    /// Handle one job, logging failures and counting it
    pub async fn process(&mut self, job: Job) {
        let label = job.to_string();
        debug!("Processing job {}", label);

        match self.handle(job).await {
            Ok(()) => self.stats.jobs_processed += 1,
            Err(e) => {
                self.stats.jobs_failed += 1;
                error!("Job {} failed: {}", label, e);
            }
        }
    }

    async fn handle(&mut self, job: Job) -> WorkerResult<()> {
        match job {
            Job::CheckSystemHealth => self.check_system_health().await,
            Job::MonitorServices => self.monitor_services().await,
            Job::TriggerRecovery { incident_id } => {
                self.trigger_recovery(incident_id).await.map(|_| ())
            }
            Job::SendIncidentAlert {
                incident_id,
                outcome,
            } => {
                let sent = self
                    .mailer
                    .send_incident_alert(incident_id, outcome.as_ref())
                    .await?;
                debug!(incident_id, sent, "incident alert handled");
                Ok(())
            }
            Job::SendDailySummary => {
                let sent = self.mailer.send_daily_summary().await?;
                debug!(sent, "daily summary handled");
                Ok(())
            }
            Job::SimulateIncident {
                service_name,
                metric_name,
                severity,
            } => self
                .simulate_incident(&service_name, &metric_name, severity)
                .await
                .map(|_| ()),
        }
    }

    /// Queue recovery for a freshly created incident
    fn schedule_recovery(&mut self, incident: &Incident) {
        self.stats.incidents_created += 1;
        if let Err(e) = self.queue.try_enqueue(Job::TriggerRecovery {
            incident_id: incident.id,
        }) {
            warn!(incident_id = incident.id, "Could not queue recovery: {}", e);
        }
    }

    async fn check_system_health(&mut self) -> WorkerResult<()> {
        let metrics = self.sampler.sample().await;
        let mut created = 0;

        for (metric, value) in [
            ("cpu", metrics.cpu),
            ("memory", metrics.memory),
            ("disk", metrics.disk),
        ] {
            if let Some(incident) = self.detector.check_metric("system", metric, value).await? {
                self.schedule_recovery(&incident);
                created += 1;
            }
        }

        info!(
            cpu = metrics.cpu,
            memory = metrics.memory,
            disk = metrics.disk,
            incidents_created = created,
            "System health monitored"
        );
        Ok(())
    }

    async fn monitor_services(&mut self) -> WorkerResult<()> {
        let services = self.services.clone();
        let mut created = 0;

        for service in &services {
            let response_time = self.rng.gen_range(100.0..6000.0);
            if let Some(incident) = self
                .detector
                .check_metric(service, "response_time", response_time)
                .await?
            {
                self.schedule_recovery(&incident);
                created += 1;
            }
        }

        info!(
            services_monitored = services.len(),
            incidents_created = created,
            "Services monitored"
        );
        Ok(())
    }

    /// Run recovery now and queue the alert mail
    pub async fn trigger_recovery(&mut self, incident_id: i64) -> WorkerResult<RecoveryOutcome> {
        let outcome = self.recovery.attempt_recovery(incident_id).await?;

        if outcome.success {
            self.stats.recoveries_succeeded += 1;
            info!(incident_id, action = ?outcome.action_type, "Recovery succeeded");
        } else {
            warn!(incident_id, error = ?outcome.error, "Recovery did not succeed");
        }

        if let Err(e) = self.queue.try_enqueue(Job::SendIncidentAlert {
            incident_id,
            outcome: Some(outcome.clone()),
        }) {
            warn!(incident_id, "Could not queue incident alert: {}", e);
        }

        Ok(outcome)
    }

    /// Create an incident of the given severity and recover it immediately.
    /// Returns `None` when the metric has no threshold.
    pub async fn simulate_incident(
        &mut self,
        service_name: &str,
        metric_name: &str,
        severity: Severity,
    ) -> WorkerResult<Option<Incident>> {
        let thresholds = self.detector.thresholds();
        let threshold = if thresholds.is_known(metric_name) {
            thresholds.get(metric_name)
        } else {
            100.0
        };
        let value = simulated_value(threshold, severity);

        let Some(incident) = self
            .detector
            .check_metric(service_name, metric_name, value)
            .await?
        else {
            info!(service = service_name, metric = metric_name, "No incident created");
            return Ok(None);
        };

        self.stats.incidents_created += 1;
        info!(incident_id = incident.id, "Simulated incident created");
        self.trigger_recovery(incident.id).await?;
        Ok(Some(incident))
    }
}

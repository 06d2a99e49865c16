use crate::config::default_thresholds;
use crate::database::{
    Database, DatabaseResult, Incident, IncidentStatus, NewIncident, Severity,
};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Metric name to threshold lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds(BTreeMap<String, f64>);

impl Thresholds {
    pub fn new(values: BTreeMap<String, f64>) -> Self {
        Self(values)
    }

    /// Threshold for a metric. Unknown metrics never breach.
    pub fn get(&self, metric_name: &str) -> f64 {
        self.0.get(metric_name).copied().unwrap_or(f64::INFINITY)
    }

    pub fn is_known(&self, metric_name: &str) -> bool {
        self.0.contains_key(metric_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self(default_thresholds())
    }
}

/// Aggregate incident counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentStats {
    pub total: i64,
    pub open: i64,
    pub resolved: i64,
    pub auto_recovered: i64,
}

/// Severity from how far a value exceeds its threshold
pub fn calculate_severity(value: f64, threshold: f64) -> Severity {
    let excess = (value - threshold) / threshold;

    if excess > 0.5 {
        Severity::Critical
    } else if excess > 0.25 {
        Severity::High
    } else if excess > 0.1 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Detects and creates incidents based on system metrics
#[derive(Clone)]
pub struct IncidentDetector {
    db: Database,
    thresholds: Thresholds,
}

impl IncidentDetector {
    pub fn new(db: Database, thresholds: Thresholds) -> Self {
        Self { db, thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Record a metric sample and open an incident when it exceeds its
    /// threshold
    pub async fn check_metric(
        &self,
        service_name: &str,
        metric_name: &str,
        metric_value: f64,
    ) -> DatabaseResult<Option<Incident>> {
        let threshold = self.thresholds.get(metric_name);
        let healthy = metric_value <= threshold;

        self.db
            .insert_metric(service_name, metric_name, metric_value, healthy)
            .await?;

        if healthy {
            debug!(
                service = service_name,
                metric = metric_name,
                value = metric_value,
                "metric within threshold"
            );
            return Ok(None);
        }

        let incident = self
            .create_incident(service_name, metric_name, metric_value, threshold)
            .await?;
        Ok(Some(incident))
    }

    /// Create a new incident for a threshold breach
    pub async fn create_incident(
        &self,
        service_name: &str,
        metric_name: &str,
        metric_value: f64,
        threshold: f64,
    ) -> DatabaseResult<Incident> {
        let severity = calculate_severity(metric_value, threshold);

        let new_incident = NewIncident {
            title: format!("{} - High {}", service_name, metric_name.to_uppercase()),
            description: format!(
                "{} usage at {:.2}% (threshold: {:.1}%)",
                metric_name, metric_value, threshold
            ),
            severity,
            status: IncidentStatus::Open,
            service_name: service_name.to_string(),
            metric_name: Some(metric_name.to_string()),
            error_message: Some(format!("{} exceeded threshold", metric_name)),
            metric_value: Some(metric_value),
            threshold_value: Some(threshold),
        };

        let incident = self.db.insert_incident(&new_incident).await?;
        info!(
            incident_id = incident.id,
            service = service_name,
            metric = metric_name,
            severity = %severity,
            "incident created"
        );
        Ok(incident)
    }

    /// Open and investigating incidents, newest first
    pub async fn get_open_incidents(&self) -> DatabaseResult<Vec<Incident>> {
        self.db
            .list_incidents_with_status(&[IncidentStatus::Open, IncidentStatus::Investigating])
            .await
    }

    pub async fn get_incident_by_id(&self, incident_id: i64) -> DatabaseResult<Option<Incident>> {
        self.db.get_incident(incident_id).await
    }

    /// Update incident status. Returns `None` when the incident does not
    /// exist.
    pub async fn update_incident_status(
        &self,
        incident_id: i64,
        status: IncidentStatus,
        recovery_action: Option<&str>,
    ) -> DatabaseResult<Option<Incident>> {
        let Some(mut incident) = self.db.get_incident(incident_id).await? else {
            return Ok(None);
        };

        incident.status = status;
        if let Some(action) = recovery_action.filter(|a| !a.is_empty()) {
            incident.recovery_action = Some(action.to_string());
            incident.auto_recovered = true;
        }
        if status.is_terminal() {
            incident.resolved_at = Some(Utc::now());
        }

        self.db.save_incident(&incident).await?;
        info!(incident_id, status = %status, "incident status updated");
        Ok(Some(incident))
    }

    /// Incident history, newest first
    pub async fn get_incident_history(&self, limit: i64) -> DatabaseResult<Vec<Incident>> {
        self.db.list_incidents(limit).await
    }

    pub async fn get_incident_stats(&self) -> DatabaseResult<IncidentStats> {
        Ok(IncidentStats {
            total: self.db.count_incidents().await?,
            open: self
                .db
                .count_incidents_with_status(IncidentStatus::Open)
                .await?,
            resolved: self
                .db
                .count_incidents_with_status(IncidentStatus::Resolved)
                .await?,
            auto_recovered: self.db.count_auto_recovered().await?,
        })
    }

    /// Feed random threshold breaches for the demo services. Each
    /// service/metric pair breaches with 30% probability.
    pub async fn generate_demo_incidents<R: Rng + Send>(
        &self,
        rng: &mut R,
    ) -> DatabaseResult<Vec<Incident>> {
        let mut created = Vec::new();

        for service in super::DEMO_SERVICES {
            for metric in super::DEMO_METRICS {
                if rng.gen::<f64>() > 0.7 {
                    let value = self.thresholds.get(metric) * rng.gen_range(1.1..1.5);
                    if let Some(incident) = self.check_metric(service, metric, value).await? {
                        created.push(incident);
                    }
                }
            }
        }

        info!("Generated {} demo incidents", created.len());
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    async fn detector() -> IncidentDetector {
        let db = Database::new_in_memory().await.unwrap();
        IncidentDetector::new(db, Thresholds::default())
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(calculate_severity(80.0, 80.0), Severity::Low);
        assert_eq!(calculate_severity(88.0, 80.0), Severity::Low);
        assert_eq!(calculate_severity(90.0, 80.0), Severity::Medium);
        assert_eq!(calculate_severity(100.1, 80.0), Severity::High);
        assert_eq!(calculate_severity(121.0, 80.0), Severity::Critical);
    }

    #[test]
    fn test_unknown_metric_threshold_is_infinite() {
        let thresholds = Thresholds::default();
        assert!(thresholds.get("temperature").is_infinite());
        assert!(!thresholds.is_known("temperature"));
        assert_eq!(thresholds.get("disk"), 90.0);
    }

    #[tokio::test]
    async fn test_normal_metric_creates_no_incident() {
        let detector = detector().await;
        let result = detector.check_metric("test-service", "cpu", 50.0).await.unwrap();
        assert!(result.is_none());

        let metrics = detector.db.recent_metrics(Some("test-service"), 10).await.unwrap();
        assert_eq!(metrics.len(), 1);
        assert!(metrics[0].is_healthy);
    }

    #[tokio::test]
    async fn test_value_at_threshold_is_healthy() {
        let detector = detector().await;
        assert!(detector.check_metric("svc", "memory", 85.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_breach_creates_incident() {
        let detector = detector().await;
        let incident = detector
            .check_metric("test-service", "cpu", 95.0)
            .await
            .unwrap()
            .expect("incident expected");

        assert_eq!(incident.title, "test-service - High CPU");
        assert_eq!(incident.description, "cpu usage at 95.00% (threshold: 80.0%)");
        assert_eq!(incident.severity, Severity::Medium);
        assert_eq!(incident.status, IncidentStatus::Open);
        assert_eq!(incident.error_message.as_deref(), Some("cpu exceeded threshold"));
        assert_eq!(incident.metric_name.as_deref(), Some("cpu"));
        assert_eq!(incident.threshold_value, Some(80.0));

        let metrics = detector.db.recent_metrics(Some("test-service"), 10).await.unwrap();
        assert!(!metrics[0].is_healthy);

        let open = detector.get_open_incidents().await.unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_metric_never_breaches() {
        let detector = detector().await;
        let result = detector.check_metric("svc", "queue_depth", 1.0e9).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_update_status_and_stats() {
        let detector = detector().await;
        let incident = detector.check_metric("svc", "disk", 99.0).await.unwrap().unwrap();

        let updated = detector
            .update_incident_status(incident.id, IncidentStatus::Resolved, Some("cleanup_logs"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, IncidentStatus::Resolved);
        assert!(updated.auto_recovered);
        assert!(updated.resolved_at.is_some());

        let missing = detector
            .update_incident_status(incident.id + 1, IncidentStatus::Closed, None)
            .await
            .unwrap();
        assert!(missing.is_none());

        detector.check_metric("svc", "cpu", 200.0).await.unwrap();
        let stats = detector.get_incident_stats().await.unwrap();
        assert_eq!(
            stats,
            IncidentStats {
                total: 2,
                open: 1,
                resolved: 1,
                auto_recovered: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_investigating_is_still_open() {
        let detector = detector().await;
        let incident = detector.check_metric("svc", "cpu", 99.0).await.unwrap().unwrap();
        detector
            .update_incident_status(incident.id, IncidentStatus::Investigating, None)
            .await
            .unwrap();

        let open = detector.get_open_incidents().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].status, IncidentStatus::Investigating);
        assert!(open[0].resolved_at.is_none());
    }

    #[tokio::test]
    async fn test_demo_incidents_are_breaches() {
        let detector = detector().await;
        let mut rng = StdRng::seed_from_u64(7);
        let created = detector.generate_demo_incidents(&mut rng).await.unwrap();

        for incident in &created {
            assert!(incident.metric_value.unwrap() > incident.threshold_value.unwrap());
            assert_ne!(incident.severity, Severity::Critical);
        }
        let history = detector.get_incident_history(50).await.unwrap();
        assert_eq!(history.len(), created.len());
    }
}

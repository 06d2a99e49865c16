use asf_guardian::config::GuardianConfig;
use asf_guardian::database::{ActionStatus, Database, IncidentStatus};
use asf_guardian::incidents::{IncidentDetector, Thresholds};
use asf_guardian::recovery::{AutoRecovery, SimulatedExecutor};
use std::sync::Arc;
use std::time::Duration;

async fn setup(success_rate: f64) -> (Database, IncidentDetector, AutoRecovery) {
    let db = Database::new_in_memory().await.unwrap();
    let detector = IncidentDetector::new(db.clone(), Thresholds::default());
    let recovery = AutoRecovery::new(
        db.clone(),
        Arc::new(SimulatedExecutor::new(success_rate, Duration::ZERO)),
    );
    (db, detector, recovery)
}

#[tokio::test]
async fn test_breach_is_detected_and_recovered() {
    let (_db, detector, recovery) = setup(1.0).await;

    let incident = detector
        .check_metric("payment-service", "response_time", 8000.0)
        .await
        .unwrap()
        .expect("breach should open an incident");
    assert_eq!(incident.status, IncidentStatus::Open);

    let outcome = recovery.attempt_recovery(incident.id).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.action_type.as_deref(), Some("restart_service"));
    assert_eq!(outcome.service_name.as_deref(), Some("payment-service"));

    let resolved = detector.get_incident_by_id(incident.id).await.unwrap().unwrap();
    assert_eq!(resolved.status, IncidentStatus::Resolved);
    assert!(resolved.auto_recovered);
    assert!(resolved.resolved_at.is_some());

    let history = recovery.get_recovery_history(Some(incident.id)).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ActionStatus::Success);
    assert_eq!(
        history[0].action_details,
        "Executing restart_service for payment-service"
    );

    // A second attempt is refused without new actions
    let again = recovery.attempt_recovery(incident.id).await.unwrap();
    assert!(!again.success);
    assert_eq!(again.error.as_deref(), Some("Incident already resolved"));
    assert_eq!(recovery.get_recovery_stats().await.unwrap().total_actions, 1);

    let stats = detector.get_incident_stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.open, 0);
    assert_eq!(stats.auto_recovered, 1);
}

#[tokio::test]
async fn test_failed_recovery_tries_every_strategy() {
    let (_db, detector, recovery) = setup(0.0).await;

    let incident = detector
        .check_metric("cache-server", "memory", 120.0)
        .await
        .unwrap()
        .unwrap();

    let outcome = recovery.attempt_recovery(incident.id).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("All recovery attempts failed"));

    let reopened = detector.get_incident_by_id(incident.id).await.unwrap().unwrap();
    assert_eq!(reopened.status, IncidentStatus::Open);
    assert!(!reopened.auto_recovered);

    let history = recovery.get_recovery_history(Some(incident.id)).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|a| a.status == ActionStatus::Failed));

    let stats = recovery.get_recovery_stats().await.unwrap();
    assert_eq!(stats.failed, 3);
    assert_eq!(stats.success_rate, 0.0);
}

#[tokio::test]
async fn test_file_database_persists_between_connections() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("guardian.db").display());

    let incident_id = {
        let db = Database::new(&url, 2).await.unwrap();
        let detector = IncidentDetector::new(db.clone(), Thresholds::default());
        let incident = detector.check_metric("web-api", "cpu", 99.0).await.unwrap().unwrap();
        db.pool.close().await;
        incident.id
    };

    let db = Database::new(&url, 2).await.unwrap();
    let detector = IncidentDetector::new(db, Thresholds::default());
    let incident = detector.get_incident_by_id(incident_id).await.unwrap().unwrap();
    assert_eq!(incident.service_name, "web-api");
    assert_eq!(incident.threshold_value, Some(80.0));
}

#[tokio::test]
async fn test_configured_thresholds_drive_detection() {
    let config = GuardianConfig::from_toml(
        r#"
        [thresholds]
        cpu = 50.0
        "#,
    )
    .unwrap();

    let db = Database::new_in_memory().await.unwrap();
    let detector = IncidentDetector::new(db, Thresholds::new(config.thresholds));

    assert!(detector.check_metric("web-api", "cpu", 60.0).await.unwrap().is_some());
    // Thresholds missing from the file keep their defaults
    assert!(detector.check_metric("web-api", "memory", 99.0).await.unwrap().is_some());
    assert!(detector.check_metric("web-api", "disk", 99.9).await.unwrap().is_some());
    // Metrics without a threshold never breach
    assert!(detector.check_metric("web-api", "temperature", 500.0).await.unwrap().is_none());
}

//! SQLite store for incidents, recovery actions and metric samples

pub mod models;

pub use models::{
    ActionStatus, Incident, IncidentStatus, NewIncident, ParseEnumError, RecoveryAction,
    Severity, SystemMetric,
};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

/// Database-related errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("Invalid stored value: {0}")]
    InvalidValue(#[from] ParseEnumError),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Format a timestamp the way it is stored. Fixed precision keeps the text
/// columns sortable.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> DatabaseResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

/// Incident database manager
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `url`
    pub async fn new(url: &str, max_connections: u32) -> DatabaseResult<Self> {
        if url == ":memory:" || url == "sqlite::memory:" {
            return Self::new_in_memory().await;
        }

        if !sqlx::Sqlite::database_exists(url).await.unwrap_or(false) {
            sqlx::Sqlite::create_database(url)
                .await
                .map_err(|e| DatabaseError::Migration(format!("Failed to create database: {}", e)))?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        tracing::info!("Database ready at {}", url);
        Ok(db)
    }

    /// Create an in-memory database, used by tests and `--database :memory:`
    pub async fn new_in_memory() -> DatabaseResult<Self> {
        // A single connection that never expires, otherwise the in-memory
        // database disappears with it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(":memory:")
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations
    async fn migrate(&self) -> DatabaseResult<()> {
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS incidents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                severity TEXT NOT NULL,
                status TEXT NOT NULL,
                service_name TEXT NOT NULL,
                metric_name TEXT,
                detected_at TEXT NOT NULL,
                resolved_at TEXT,
                auto_recovered BOOLEAN NOT NULL DEFAULT FALSE,
                recovery_action TEXT,
                error_message TEXT,
                metric_value REAL,
                threshold_value REAL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recovery_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                incident_id INTEGER NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
                action_type TEXT NOT NULL,
                action_details TEXT NOT NULL,
                status TEXT NOT NULL,
                executed_at TEXT NOT NULL,
                error_message TEXT
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS system_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                service_name TEXT NOT NULL,
                metric_name TEXT NOT NULL,
                metric_value REAL NOT NULL,
                timestamp TEXT NOT NULL,
                is_healthy BOOLEAN NOT NULL DEFAULT TRUE
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_incidents_status ON incidents(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_incidents_detected_at ON incidents(detected_at DESC)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_recovery_actions_incident ON recovery_actions(incident_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_system_metrics_service ON system_metrics(service_name, timestamp DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_incident(row: &SqliteRow) -> DatabaseResult<Incident> {
        let severity: String = row.get("severity");
        let status: String = row.get("status");
        let detected_at: String = row.get("detected_at");
        let resolved_at: Option<String> = row.get("resolved_at");

        Ok(Incident {
            id: row.get("id"),
            title: row.get("title"),
            description: row.get("description"),
            severity: severity.parse()?,
            status: status.parse()?,
            service_name: row.get("service_name"),
            metric_name: row.get("metric_name"),
            detected_at: parse_timestamp(&detected_at)?,
            resolved_at: resolved_at.as_deref().map(parse_timestamp).transpose()?,
            auto_recovered: row.get("auto_recovered"),
            recovery_action: row.get("recovery_action"),
            error_message: row.get("error_message"),
            metric_value: row.get("metric_value"),
            threshold_value: row.get("threshold_value"),
        })
    }

    fn row_to_action(row: &SqliteRow) -> DatabaseResult<RecoveryAction> {
        let status: String = row.get("status");
        let executed_at: String = row.get("executed_at");

        Ok(RecoveryAction {
            id: row.get("id"),
            incident_id: row.get("incident_id"),
            action_type: row.get("action_type"),
            action_details: row.get("action_details"),
            status: status.parse()?,
            executed_at: parse_timestamp(&executed_at)?,
            error_message: row.get("error_message"),
        })
    }

    fn row_to_metric(row: &SqliteRow) -> DatabaseResult<SystemMetric> {
        let timestamp: String = row.get("timestamp");

        Ok(SystemMetric {
            id: row.get("id"),
            service_name: row.get("service_name"),
            metric_name: row.get("metric_name"),
            metric_value: row.get("metric_value"),
            timestamp: parse_timestamp(&timestamp)?,
            is_healthy: row.get("is_healthy"),
        })
    }

    // ----- system metrics -----

    /// Record a metric sample
    pub async fn insert_metric(
        &self,
        service_name: &str,
        metric_name: &str,
        metric_value: f64,
        is_healthy: bool,
    ) -> DatabaseResult<SystemMetric> {
        let timestamp = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO system_metrics (service_name, metric_name, metric_value, timestamp, is_healthy)
            VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        )
        .bind(service_name)
        .bind(metric_name)
        .bind(metric_value)
        .bind(format_timestamp(&timestamp))
        .bind(is_healthy)
        .execute(&self.pool)
        .await?;

        Ok(SystemMetric {
            id: result.last_insert_rowid(),
            service_name: service_name.to_string(),
            metric_name: metric_name.to_string(),
            metric_value,
            timestamp,
            is_healthy,
        })
    }

    /// Most recent metric samples, optionally for one service
    pub async fn recent_metrics(
        &self,
        service_name: Option<&str>,
        limit: i64,
    ) -> DatabaseResult<Vec<SystemMetric>> {
        let rows = match service_name {
            Some(service) => {
                sqlx::query(
                    r#"
                    SELECT * FROM system_metrics
                    WHERE service_name = ?1
                    ORDER BY timestamp DESC, id DESC
                    LIMIT ?2
                "#,
                )
                .bind(service)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM system_metrics ORDER BY timestamp DESC, id DESC LIMIT ?1")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(Self::row_to_metric).collect()
    }

    // ----- incidents -----

    /// Insert a new incident detected now
    pub async fn insert_incident(&self, incident: &NewIncident) -> DatabaseResult<Incident> {
        let detected_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO incidents (
                title, description, severity, status, service_name, metric_name,
                detected_at, auto_recovered, error_message, metric_value, threshold_value
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, FALSE, ?8, ?9, ?10)
        "#,
        )
        .bind(&incident.title)
        .bind(&incident.description)
        .bind(incident.severity.as_str())
        .bind(incident.status.as_str())
        .bind(&incident.service_name)
        .bind(&incident.metric_name)
        .bind(format_timestamp(&detected_at))
        .bind(&incident.error_message)
        .bind(incident.metric_value)
        .bind(incident.threshold_value)
        .execute(&self.pool)
        .await?;

        Ok(Incident {
            id: result.last_insert_rowid(),
            title: incident.title.clone(),
            description: incident.description.clone(),
            severity: incident.severity,
            status: incident.status,
            service_name: incident.service_name.clone(),
            metric_name: incident.metric_name.clone(),
            detected_at,
            resolved_at: None,
            auto_recovered: false,
            recovery_action: None,
            error_message: incident.error_message.clone(),
            metric_value: incident.metric_value,
            threshold_value: incident.threshold_value,
        })
    }

    /// Get incident by id
    pub async fn get_incident(&self, id: i64) -> DatabaseResult<Option<Incident>> {
        let row = sqlx::query("SELECT * FROM incidents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_incident).transpose()
    }

    /// Incidents newest first
    pub async fn list_incidents(&self, limit: i64) -> DatabaseResult<Vec<Incident>> {
        let rows = sqlx::query("SELECT * FROM incidents ORDER BY detected_at DESC, id DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_incident).collect()
    }

    /// Incidents in any of the given states, newest first
    pub async fn list_incidents_with_status(
        &self,
        statuses: &[IncidentStatus],
    ) -> DatabaseResult<Vec<Incident>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=statuses.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT * FROM incidents WHERE status IN ({}) ORDER BY detected_at DESC, id DESC",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_incident).collect()
    }

    /// Persist the mutable fields of an incident
    pub async fn save_incident(&self, incident: &Incident) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            UPDATE incidents SET
                status = ?1, resolved_at = ?2, auto_recovered = ?3,
                recovery_action = ?4, error_message = ?5
            WHERE id = ?6
        "#,
        )
        .bind(incident.status.as_str())
        .bind(incident.resolved_at.as_ref().map(format_timestamp))
        .bind(incident.auto_recovered)
        .bind(&incident.recovery_action)
        .bind(&incident.error_message)
        .bind(incident.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Set only the status of an incident
    pub async fn set_incident_status(&self, id: i64, status: IncidentStatus) -> DatabaseResult<()> {
        sqlx::query("UPDATE incidents SET status = ?1 WHERE id = ?2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_incidents(&self) -> DatabaseResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM incidents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_incidents_with_status(&self, status: IncidentStatus) -> DatabaseResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM incidents WHERE status = ?1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_auto_recovered(&self) -> DatabaseResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM incidents WHERE auto_recovered = TRUE")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Incident counts per severity
    pub async fn count_incidents_by_severity(&self) -> DatabaseResult<Vec<(Severity, i64)>> {
        let rows = sqlx::query("SELECT severity, COUNT(*) AS total FROM incidents GROUP BY severity")
            .fetch_all(&self.pool)
            .await?;

        let mut counts: Vec<(Severity, i64)> = Severity::ALL.iter().map(|s| (*s, 0)).collect();
        for row in rows {
            let severity: String = row.get("severity");
            let severity: Severity = severity.parse()?;
            let total: i64 = row.get("total");
            if let Some(entry) = counts.iter_mut().find(|(s, _)| *s == severity) {
                entry.1 = total;
            }
        }

        Ok(counts)
    }

    // ----- recovery actions -----

    /// Record a recovery action for an incident
    pub async fn insert_recovery_action(
        &self,
        incident_id: i64,
        action_type: &str,
        action_details: &str,
        status: ActionStatus,
    ) -> DatabaseResult<RecoveryAction> {
        let executed_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO recovery_actions (incident_id, action_type, action_details, status, executed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        )
        .bind(incident_id)
        .bind(action_type)
        .bind(action_details)
        .bind(status.as_str())
        .bind(format_timestamp(&executed_at))
        .execute(&self.pool)
        .await?;

        Ok(RecoveryAction {
            id: result.last_insert_rowid(),
            incident_id,
            action_type: action_type.to_string(),
            action_details: action_details.to_string(),
            status,
            executed_at,
            error_message: None,
        })
    }

    /// Finish a recovery action
    pub async fn update_recovery_action(
        &self,
        id: i64,
        status: ActionStatus,
        error_message: Option<&str>,
    ) -> DatabaseResult<()> {
        sqlx::query("UPDATE recovery_actions SET status = ?1, error_message = ?2 WHERE id = ?3")
            .bind(status.as_str())
            .bind(error_message)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Recovery actions newest first, optionally for one incident
    pub async fn list_recovery_actions(
        &self,
        incident_id: Option<i64>,
    ) -> DatabaseResult<Vec<RecoveryAction>> {
        let rows = match incident_id {
            Some(incident_id) => {
                sqlx::query(
                    r#"
                    SELECT * FROM recovery_actions
                    WHERE incident_id = ?1
                    ORDER BY executed_at DESC, id DESC
                "#,
                )
                .bind(incident_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM recovery_actions ORDER BY executed_at DESC, id DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(Self::row_to_action).collect()
    }

    /// Count recovery actions, optionally in one state
    pub async fn count_recovery_actions(&self, status: Option<ActionStatus>) -> DatabaseResult<i64> {
        let count: i64 = match status {
            Some(status) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM recovery_actions WHERE status = ?1")
                    .bind(status.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM recovery_actions")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_incident(service: &str) -> NewIncident {
        NewIncident {
            title: format!("{} - High CPU", service),
            description: "cpu usage at 95.00% (threshold: 80.0%)".to_string(),
            severity: Severity::Medium,
            status: IncidentStatus::Open,
            service_name: service.to_string(),
            metric_name: Some("cpu".to_string()),
            error_message: Some("cpu exceeded threshold".to_string()),
            metric_value: Some(95.0),
            threshold_value: Some(80.0),
        }
    }

    #[tokio::test]
    async fn test_database_creation() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("guardian.db");
        let db_path_str = db_path.to_str().unwrap();

        let db = Database::new(db_path_str, 2).await.unwrap();
        assert!(db_path.exists());
        assert_eq!(db.count_incidents().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_incident_storage_and_retrieval() {
        let db = Database::new_in_memory().await.unwrap();

        let created = db.insert_incident(&sample_incident("web-api")).await.unwrap();
        let loaded = db.get_incident(created.id).await.unwrap().unwrap();

        assert_eq!(loaded.title, "web-api - High CPU");
        assert_eq!(loaded.severity, Severity::Medium);
        assert_eq!(loaded.status, IncidentStatus::Open);
        assert_eq!(loaded.metric_value, Some(95.0));
        assert!(!loaded.auto_recovered);
        assert!(loaded.resolved_at.is_none());

        assert!(db.get_incident(created.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_incident_update_and_status_filter() {
        let db = Database::new_in_memory().await.unwrap();

        let first = db.insert_incident(&sample_incident("web-api")).await.unwrap();
        let mut second = db.insert_incident(&sample_incident("database")).await.unwrap();

        second.status = IncidentStatus::Resolved;
        second.resolved_at = Some(Utc::now());
        second.auto_recovered = true;
        second.recovery_action = Some("restart_service".to_string());
        db.save_incident(&second).await.unwrap();

        let open = db
            .list_incidents_with_status(&[IncidentStatus::Open, IncidentStatus::Investigating])
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, first.id);

        let reloaded = db.get_incident(second.id).await.unwrap().unwrap();
        assert_eq!(reloaded.recovery_action.as_deref(), Some("restart_service"));
        assert!(reloaded.resolved_at.is_some());

        assert_eq!(db.count_auto_recovered().await.unwrap(), 1);
        assert_eq!(
            db.count_incidents_with_status(IncidentStatus::Resolved).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_list_incidents_newest_first() {
        let db = Database::new_in_memory().await.unwrap();
        for service in ["a", "b", "c"] {
            db.insert_incident(&sample_incident(service)).await.unwrap();
        }

        let incidents = db.list_incidents(2).await.unwrap();
        assert_eq!(incidents.len(), 2);
        assert_eq!(incidents[0].service_name, "c");
        assert_eq!(incidents[1].service_name, "b");
    }

    #[tokio::test]
    async fn test_recovery_actions_require_incident() {
        let db = Database::new_in_memory().await.unwrap();

        let orphan = db
            .insert_recovery_action(999, "restart_service", "orphan", ActionStatus::Pending)
            .await;
        assert!(orphan.is_err());

        let incident = db.insert_incident(&sample_incident("web-api")).await.unwrap();
        let action = db
            .insert_recovery_action(incident.id, "restart_service", "details", ActionStatus::Pending)
            .await
            .unwrap();
        db.update_recovery_action(action.id, ActionStatus::Failed, Some("boom"))
            .await
            .unwrap();

        let actions = db.list_recovery_actions(Some(incident.id)).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].status, ActionStatus::Failed);
        assert_eq!(actions[0].error_message.as_deref(), Some("boom"));
        assert_eq!(db.count_recovery_actions(Some(ActionStatus::Failed)).await.unwrap(), 1);
        assert_eq!(db.count_recovery_actions(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_metrics_and_severity_counts() {
        let db = Database::new_in_memory().await.unwrap();
        db.insert_metric("web-api", "cpu", 42.0, true).await.unwrap();
        db.insert_metric("database", "cpu", 91.0, false).await.unwrap();
        db.insert_incident(&sample_incident("database")).await.unwrap();

        let all = db.recent_metrics(None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        let web = db.recent_metrics(Some("web-api"), 10).await.unwrap();
        assert_eq!(web.len(), 1);
        assert!(web[0].is_healthy);

        let counts = db.count_incidents_by_severity().await.unwrap();
        assert_eq!(counts.len(), 4);
        assert!(counts.contains(&(Severity::Medium, 1)));
        assert!(counts.contains(&(Severity::Critical, 0)));
    }
}

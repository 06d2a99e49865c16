use super::executor::ActionExecutor;
use super::strategies::{metric_from_text, strategies_for, Strategy};
use super::{RecoveryError, RecoveryOutcome, RecoveryResult, RecoveryStats};
use crate::database::{ActionStatus, Database, Incident, IncidentStatus, RecoveryAction};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Drives recovery attempts for incidents
#[derive(Clone)]
pub struct AutoRecovery {
    db: Database,
    executor: Arc<dyn ActionExecutor>,
}

impl AutoRecovery {
    pub fn new(db: Database, executor: Arc<dyn ActionExecutor>) -> Self {
        Self { db, executor }
    }

    /// Attempt to recover from an incident, trying its strategies in
    /// priority order until one succeeds
    pub async fn attempt_recovery(&self, incident_id: i64) -> RecoveryResult<RecoveryOutcome> {
        let mut incident = self
            .db
            .get_incident(incident_id)
            .await?
            .ok_or(RecoveryError::IncidentNotFound(incident_id))?;

        if incident.status.is_terminal() {
            return Ok(RecoveryOutcome::failure(incident_id, "Incident already resolved"));
        }

        incident.status = IncidentStatus::Investigating;
        self.db.save_incident(&incident).await?;

        let metric_name = Self::incident_metric(&incident);
        let strategies = strategies_for(metric_name.as_deref().unwrap_or("unknown"));

        if strategies.is_empty() {
            warn!(incident_id, "no recovery strategy for incident");
            incident.status = IncidentStatus::Open;
            self.db.save_incident(&incident).await?;
            return Ok(RecoveryOutcome::failure(
                incident_id,
                "No recovery strategy available",
            ));
        }

        match self.run_strategies(&mut incident, strategies).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Reopen so a later attempt can pick the incident up
                if let Err(reset) = self
                    .db
                    .set_incident_status(incident_id, IncidentStatus::Open)
                    .await
                {
                    warn!(incident_id, "could not reopen incident after error: {}", reset);
                }
                Err(e)
            }
        }
    }

    /// Try each strategy in order until one succeeds
    async fn run_strategies(
        &self,
        incident: &mut Incident,
        strategies: &[Strategy],
    ) -> RecoveryResult<RecoveryOutcome> {
        let incident_id = incident.id;

        for strategy in strategies {
            if self.execute_action(incident, strategy.action).await? {
                incident.status = IncidentStatus::Resolved;
                incident.resolved_at = Some(Utc::now());
                incident.auto_recovered = true;
                incident.recovery_action = Some(strategy.action.to_string());
                self.db.save_incident(incident).await?;

                info!(incident_id, action = strategy.action, "incident auto-recovered");
                return Ok(RecoveryOutcome::success(
                    incident_id,
                    strategy.action,
                    &incident.service_name,
                ));
            }
        }

        incident.status = IncidentStatus::Open;
        self.db.save_incident(incident).await?;
        warn!(incident_id, "all recovery attempts failed");

        Ok(RecoveryOutcome::failure(incident_id, "All recovery attempts failed"))
    }

    /// Incident type: the recorded metric, or one named in the error message
    fn incident_metric(incident: &Incident) -> Option<String> {
        incident.metric_name.clone().or_else(|| {
            incident
                .error_message
                .as_deref()
                .and_then(metric_from_text)
                .map(str::to_string)
        })
    }

    /// Log, run and settle a single recovery action
    async fn execute_action(&self, incident: &Incident, action_type: &str) -> RecoveryResult<bool> {
        let details = format!("Executing {} for {}", action_type, incident.service_name);
        let action = self
            .db
            .insert_recovery_action(incident.id, action_type, &details, ActionStatus::Pending)
            .await?;

        let success = self
            .executor
            .execute(action_type, &incident.service_name)
            .await;

        if success {
            self.db
                .update_recovery_action(action.id, ActionStatus::Success, None)
                .await?;
        } else {
            let error = format!("Failed to execute {}", action_type);
            self.db
                .update_recovery_action(action.id, ActionStatus::Failed, Some(&error))
                .await?;
        }

        Ok(success)
    }

    /// Recovery action history, newest first
    pub async fn get_recovery_history(
        &self,
        incident_id: Option<i64>,
    ) -> RecoveryResult<Vec<RecoveryAction>> {
        Ok(self.db.list_recovery_actions(incident_id).await?)
    }

    pub async fn get_recovery_stats(&self) -> RecoveryResult<RecoveryStats> {
        let total = self.db.count_recovery_actions(None).await?;
        let successful = self
            .db
            .count_recovery_actions(Some(ActionStatus::Success))
            .await?;
        let failed = self
            .db
            .count_recovery_actions(Some(ActionStatus::Failed))
            .await?;

        Ok(RecoveryStats::new(total, successful, failed))
    }
}

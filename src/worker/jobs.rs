use crate::database::Severity;
use crate::recovery::RecoveryOutcome;
use std::fmt;

/// Work items processed by the worker
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    /// Sample host CPU, memory and disk usage under service `system`
    CheckSystemHealth,
    /// Simulated response-time check of the monitored services
    MonitorServices,
    /// Run recovery for an incident, then mail the outcome
    TriggerRecovery { incident_id: i64 },
    SendIncidentAlert {
        incident_id: i64,
        outcome: Option<RecoveryOutcome>,
    },
    SendDailySummary,
    /// Breach a threshold on purpose and recover immediately
    SimulateIncident {
        service_name: String,
        metric_name: String,
        severity: Severity,
    },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::CheckSystemHealth => "check_system_health",
            Job::MonitorServices => "monitor_services",
            Job::TriggerRecovery { .. } => "trigger_recovery",
            Job::SendIncidentAlert { .. } => "send_incident_alert",
            Job::SendDailySummary => "send_daily_summary",
            Job::SimulateIncident { .. } => "simulate_incident",
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::TriggerRecovery { incident_id } | Job::SendIncidentAlert { incident_id, .. } => {
                write!(f, "{}(#{})", self.name(), incident_id)
            }
            Job::SimulateIncident {
                service_name,
                metric_name,
                severity,
            } => write!(
                f,
                "{}({}/{}/{})",
                self.name(),
                service_name,
                metric_name,
                severity
            ),
            _ => f.write_str(self.name()),
        }
    }
}

/// Metric value that produces the requested severity
pub fn simulated_value(threshold: f64, severity: Severity) -> f64 {
    match severity {
        Severity::Critical => threshold * 1.6,
        Severity::High => threshold * 1.3,
        Severity::Medium | Severity::Low => threshold * 1.15,
    }
}

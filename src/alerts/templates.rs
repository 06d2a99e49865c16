//! HTML bodies and subjects for alert mail

use crate::database::{Incident, Severity};
use crate::incidents::IncidentStats;
use crate::recovery::RecoveryOutcome;
use askama::Template;
use chrono::NaiveDate;

/// Incidents listed in the daily summary
const SUMMARY_INCIDENTS: usize = 5;

pub fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#dc3545",
        Severity::High => "#fd7e14",
        Severity::Medium => "#ffc107",
        Severity::Low => "#6c757d",
    }
}

pub fn incident_subject(incident: &Incident, outcome: Option<&RecoveryOutcome>) -> String {
    let severity = incident.severity.as_str().to_uppercase();
    match outcome {
        Some(outcome) if outcome.success => {
            format!("[RESOLVED] {}: {}", severity, incident.title)
        }
        _ => format!("[{}] {}", severity, incident.title),
    }
}

pub fn daily_summary_subject(date: NaiveDate) -> String {
    format!("ASF-Guardian Daily Summary - {}", date.format("%Y-%m-%d"))
}

/// Incident alert body, with the recovery outcome when there is one
#[derive(Template)]
#[template(path = "incident_alert.html")]
pub struct IncidentAlertTemplate<'a> {
    incident: &'a Incident,
    color: &'static str,
    detected_at: String,
    metric_value: Option<String>,
    threshold: Option<String>,
    recovered_with: Option<&'a str>,
    recovery_error: Option<&'a str>,
}

impl<'a> IncidentAlertTemplate<'a> {
    pub fn new(incident: &'a Incident, outcome: Option<&'a RecoveryOutcome>) -> Self {
        let (recovered_with, recovery_error) = match outcome {
            Some(outcome) if outcome.success => {
                (Some(outcome.action_type.as_deref().unwrap_or("Unknown")), None)
            }
            Some(outcome) => (None, Some(outcome.error.as_deref().unwrap_or("Unknown error"))),
            None => (None, None),
        };

        Self {
            incident,
            color: severity_color(incident.severity),
            detected_at: incident.detected_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            metric_value: incident.metric_value.map(|v| format!("{:.2}", v)),
            threshold: incident.threshold_value.map(|v| format!("{:.1}", v)),
            recovered_with,
            recovery_error,
        }
    }
}

/// Daily summary body: stat cards and the most recent incidents
#[derive(Template)]
#[template(path = "daily_summary.html")]
pub struct DailySummaryTemplate<'a> {
    date: String,
    stats: &'a IncidentStats,
    recent: &'a [Incident],
}

impl<'a> DailySummaryTemplate<'a> {
    pub fn new(stats: &'a IncidentStats, recent: &'a [Incident], date: NaiveDate) -> Self {
        Self {
            date: date.format("%Y-%m-%d").to_string(),
            stats,
            recent: &recent[..recent.len().min(SUMMARY_INCIDENTS)],
        }
    }
}

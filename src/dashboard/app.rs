use crate::database::{Database, Incident, IncidentStatus, RecoveryAction, Severity, SystemMetric};
use crate::incidents::{IncidentDetector, IncidentStats, Thresholds};
use crate::recovery::{AutoRecovery, RecoveryResult, RecoveryStats};
use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::collections::BTreeMap;

/// Number of recovery actions shown on the Recovery tab
const RECENT_ACTIONS: usize = 20;

/// Metric samples scanned for the Metrics tab
const METRIC_SAMPLES: i64 = 500;

const STATUSES: [IncidentStatus; 4] = [
    IncidentStatus::Open,
    IncidentStatus::Investigating,
    IncidentStatus::Resolved,
    IncidentStatus::Closed,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Overview,
    Incidents,
    Metrics,
    Recovery,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Overview, Tab::Incidents, Tab::Metrics, Tab::Recovery];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::Incidents => "Incidents",
            Tab::Metrics => "Metrics",
            Tab::Recovery => "Recovery",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Tab::Overview => 0,
            Tab::Incidents => 1,
            Tab::Metrics => 2,
            Tab::Recovery => 3,
        }
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn previous(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Latest sample of one metric on one service
#[derive(Debug, Clone, PartialEq)]
pub struct MetricReading {
    pub service_name: String,
    pub metric_name: String,
    pub value: f64,
    pub threshold: Option<f64>,
    pub is_healthy: bool,
    pub samples: usize,
    pub timestamp: DateTime<Utc>,
}

/// Collapse samples, newest first, into one reading per service and metric
pub fn latest_readings(samples: &[SystemMetric], thresholds: &Thresholds) -> Vec<MetricReading> {
    let mut readings: BTreeMap<(&str, &str), MetricReading> = BTreeMap::new();

    for sample in samples {
        readings
            .entry((sample.service_name.as_str(), sample.metric_name.as_str()))
            .and_modify(|reading| reading.samples += 1)
            .or_insert_with(|| MetricReading {
                service_name: sample.service_name.clone(),
                metric_name: sample.metric_name.clone(),
                value: sample.metric_value,
                threshold: thresholds
                    .is_known(&sample.metric_name)
                    .then(|| thresholds.get(&sample.metric_name)),
                is_healthy: sample.is_healthy,
                samples: 1,
                timestamp: sample.timestamp,
            });
    }

    readings.into_values().collect()
}

/// Data shown by the dashboard, loaded in one go
#[derive(Debug, Clone, Default)]
pub struct DashboardSnapshot {
    pub stats: IncidentStats,
    pub recovery_stats: RecoveryStats,
    pub severity_counts: Vec<(Severity, i64)>,
    pub incidents: Vec<Incident>,
    pub actions: Vec<RecoveryAction>,
    pub metrics: Vec<MetricReading>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl DashboardSnapshot {
    pub async fn load(
        db: &Database,
        detector: &IncidentDetector,
        recovery: &AutoRecovery,
        incident_limit: i64,
    ) -> RecoveryResult<Self> {
        let mut actions = recovery.get_recovery_history(None).await?;
        actions.truncate(RECENT_ACTIONS);

        let samples = db.recent_metrics(None, METRIC_SAMPLES).await?;

        Ok(Self {
            stats: detector.get_incident_stats().await?,
            recovery_stats: recovery.get_recovery_stats().await?,
            severity_counts: db.count_incidents_by_severity().await?,
            incidents: detector.get_incident_history(incident_limit).await?,
            actions,
            metrics: latest_readings(&samples, detector.thresholds()),
            refreshed_at: Some(Utc::now()),
        })
    }

    /// Newest reading of a metric across all services
    pub fn latest(&self, metric_name: &str) -> Option<&MetricReading> {
        self.metrics
            .iter()
            .filter(|reading| reading.metric_name == metric_name)
            .max_by_key(|reading| reading.timestamp)
    }

    /// Services that have incidents, sorted
    pub fn incident_services(&self) -> Vec<String> {
        let mut services: Vec<String> = self
            .incidents
            .iter()
            .map(|incident| incident.service_name.clone())
            .collect();
        services.sort();
        services.dedup();
        services
    }
}

/// Incidents tab filter, empty fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncidentFilter {
    pub severity: Option<Severity>,
    pub status: Option<IncidentStatus>,
    pub service: Option<String>,
}

impl IncidentFilter {
    pub fn matches(&self, incident: &Incident) -> bool {
        self.severity.map_or(true, |s| incident.severity == s)
            && self.status.map_or(true, |s| incident.status == s)
            && self
                .service
                .as_deref()
                .map_or(true, |s| incident.service_name == s)
    }

    pub fn is_active(&self) -> bool {
        *self != Self::default()
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(severity) = self.severity {
            parts.push(format!("severity={}", severity));
        }
        if let Some(status) = self.status {
            parts.push(format!("status={}", status));
        }
        if let Some(service) = &self.service {
            parts.push(format!("service={}", service));
        }
        parts.join(" ")
    }
}

/// Step to the next value, wrapping back to "no filter" after the last
fn cycle<T: Clone + PartialEq>(current: Option<&T>, values: &[T]) -> Option<T> {
    match current {
        None => values.first().cloned(),
        Some(current) => values
            .iter()
            .position(|value| value == current)
            .and_then(|i| values.get(i + 1))
            .cloned(),
    }
}

/// What the event loop should do after a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardAction {
    None,
    Refresh,
    Quit,
}

/// UI state of the dashboard
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub tab: Tab,
    pub snapshot: DashboardSnapshot,
    pub filter: IncidentFilter,
    pub status_line: Option<String>,
}

impl DashboardState {
    pub fn new(snapshot: DashboardSnapshot) -> Self {
        Self {
            tab: Tab::Overview,
            snapshot,
            filter: IncidentFilter::default(),
            status_line: None,
        }
    }

    /// Incidents passing the current filter
    pub fn visible_incidents(&self) -> Vec<&Incident> {
        self.snapshot
            .incidents
            .iter()
            .filter(|incident| self.filter.matches(incident))
            .collect()
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> DashboardAction {
        if key.kind != KeyEventKind::Press {
            return DashboardAction::None;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return DashboardAction::Quit,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return DashboardAction::Quit
            }
            KeyCode::Char('r') => return DashboardAction::Refresh,
            KeyCode::Tab => self.tab = self.tab.next(),
            KeyCode::BackTab => self.tab = self.tab.previous(),
            KeyCode::Char(c @ '1'..='4') => {
                self.tab = Tab::ALL[c as usize - '1' as usize];
            }
            KeyCode::Char(c) if self.tab == Tab::Incidents => self.handle_filter_key(c),
            _ => {}
        }
        DashboardAction::None
    }

    fn handle_filter_key(&mut self, c: char) {
        match c {
            's' => self.filter.severity = cycle(self.filter.severity.as_ref(), &Severity::ALL),
            'f' => self.filter.status = cycle(self.filter.status.as_ref(), &STATUSES),
            'v' => {
                let services = self.snapshot.incident_services();
                self.filter.service = cycle(self.filter.service.as_ref(), &services);
            }
            'c' => self.filter = IncidentFilter::default(),
            _ => {}
        }
    }
}

use super::app::{DashboardState, Tab};
use crate::database::{ActionStatus, IncidentStatus, Severity};
use crate::recovery::RECOVERY_STRATEGIES;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{BarChart, Block, Borders, Cell, Paragraph, Row, Table, Tabs},
    Frame,
};

pub fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Critical => Color::Red,
        Severity::High => Color::LightRed,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::Gray,
    }
}

pub fn status_color(status: IncidentStatus) -> Color {
    match status {
        IncidentStatus::Open => Color::Red,
        IncidentStatus::Investigating => Color::Yellow,
        IncidentStatus::Resolved | IncidentStatus::Closed => Color::Green,
    }
}

fn action_color(status: ActionStatus) -> Color {
    match status {
        ActionStatus::Pending => Color::Yellow,
        ActionStatus::Success => Color::Green,
        ActionStatus::Failed => Color::Red,
    }
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    Row::new(titles.iter().map(|t| Cell::from(*t))).style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )
}

/// Draw the whole dashboard
pub fn render(f: &mut Frame<'_>, state: &DashboardState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(1),
        ])
        .split(f.size());

    render_tabs(f, chunks[0], state.tab);

    match state.tab {
        Tab::Overview => render_overview(f, chunks[1], state),
        Tab::Incidents => render_incidents(f, chunks[1], state),
        Tab::Metrics => render_metrics(f, chunks[1], state),
        Tab::Recovery => render_recovery(f, chunks[1], state),
    }

    render_footer(f, chunks[2], state);
}

fn render_tabs(f: &mut Frame<'_>, area: Rect, tab: Tab) {
    let titles: Vec<Line> = Tab::ALL
        .iter()
        .enumerate()
        .map(|(i, t)| Line::from(format!("{} {}", i + 1, t.title())))
        .collect();

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("ASF-Guardian"),
        )
        .select(tab.index())
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, area);
}

fn render_footer(f: &mut Frame<'_>, area: Rect, state: &DashboardState) {
    let refreshed = state
        .snapshot
        .refreshed_at
        .map(|ts| ts.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());

    let mut spans = vec![
        Span::styled("q", Style::default().fg(Color::Yellow)),
        Span::raw(" quit  "),
        Span::styled("Tab/1-4", Style::default().fg(Color::Yellow)),
        Span::raw(" switch  "),
        Span::styled("r", Style::default().fg(Color::Yellow)),
        Span::raw(" refresh  "),
    ];
    if state.tab == Tab::Incidents {
        for (key, label) in [("s", "severity"), ("f", "status"), ("v", "service"), ("c", "clear")] {
            spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
            spans.push(Span::raw(format!(" {}  ", label)));
        }
    }
    spans.push(Span::raw(format!("(updated {})", refreshed)));
    if let Some(status) = &state.status_line {
        spans.push(Span::styled(
            format!("  {}", status),
            Style::default().fg(Color::Red),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn kpi_card<'a>(title: &'a str, value: String, color: Color) -> Paragraph<'a> {
    Paragraph::new(Line::from(Span::styled(
        value,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL).title(title))
}

fn render_overview(f: &mut Frame<'_>, area: Rect, state: &DashboardState) {
    let snapshot = &state.snapshot;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(5)])
        .split(area);

    let cards = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 5); 5])
        .split(rows[0]);

    let stats = &snapshot.stats;
    let kpis = [
        ("Total", stats.total.to_string(), Color::Cyan),
        ("Open", stats.open.to_string(), Color::Red),
        ("Resolved", stats.resolved.to_string(), Color::Green),
        ("Auto-Recovered", stats.auto_recovered.to_string(), Color::Blue),
        (
            "Success Rate",
            format!("{:.1}%", snapshot.recovery_stats.success_rate),
            Color::Magenta,
        ),
    ];
    for ((title, value, color), area) in kpis.into_iter().zip(cards.iter()) {
        f.render_widget(kpi_card(title, value, color), *area);
    }

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);

    let data: Vec<(&str, u64)> = snapshot
        .severity_counts
        .iter()
        .map(|(severity, count)| (severity.as_str(), (*count).max(0) as u64))
        .collect();
    let chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Incidents by Severity"),
        )
        .data(data.as_slice())
        .bar_width(8)
        .bar_gap(2)
        .bar_style(Style::default().fg(Color::LightRed))
        .value_style(Style::default().fg(Color::Black).bg(Color::LightRed));
    f.render_widget(chart, body[0]);

    let recent: Vec<Row> = snapshot
        .incidents
        .iter()
        .take(10)
        .map(|incident| {
            Row::new(vec![
                Cell::from(format!("#{}", incident.id)),
                Cell::from(incident.title.clone()),
                Cell::from(Span::styled(
                    incident.severity.as_str(),
                    Style::default().fg(severity_color(incident.severity)),
                )),
                Cell::from(Span::styled(
                    incident.status.as_str(),
                    Style::default().fg(status_color(incident.status)),
                )),
            ])
        })
        .collect();

    let table = Table::new(
        recent,
        [
            Constraint::Length(6),
            Constraint::Min(20),
            Constraint::Length(9),
            Constraint::Length(13),
        ],
    )
    .header(header_row(&["ID", "Title", "Severity", "Status"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("Recent Incidents"),
    );
    f.render_widget(table, body[1]);
}

fn render_incidents(f: &mut Frame<'_>, area: Rect, state: &DashboardState) {
    let visible = state.visible_incidents();
    let title = if state.filter.is_active() {
        format!(
            "Incidents ({} of {}) [{}]",
            visible.len(),
            state.snapshot.incidents.len(),
            state.filter.describe()
        )
    } else {
        format!("Incidents ({})", visible.len())
    };

    let rows: Vec<Row> = visible
        .into_iter()
        .map(|incident| {
            let value = match (incident.metric_value, incident.threshold_value) {
                (Some(value), Some(threshold)) => format!("{:.1} / {:.1}", value, threshold),
                (Some(value), None) => format!("{:.1}", value),
                _ => "-".to_string(),
            };
            Row::new(vec![
                Cell::from(format!("#{}", incident.id)),
                Cell::from(incident.service_name.clone()),
                Cell::from(incident.title.clone()),
                Cell::from(Span::styled(
                    incident.severity.as_str(),
                    Style::default().fg(severity_color(incident.severity)),
                )),
                Cell::from(Span::styled(
                    incident.status.as_str(),
                    Style::default().fg(status_color(incident.status)),
                )),
                Cell::from(value),
                Cell::from(incident.recovery_action.clone().unwrap_or_else(|| "-".to_string())),
                Cell::from(incident.detected_at.format("%m-%d %H:%M:%S").to_string()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(16),
            Constraint::Min(20),
            Constraint::Length(9),
            Constraint::Length(13),
            Constraint::Length(18),
            Constraint::Length(22),
            Constraint::Length(15),
        ],
    )
    .header(header_row(&[
        "ID", "Service", "Title", "Severity", "Status", "Value / Limit", "Recovery", "Detected",
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(title),
    );
    f.render_widget(table, area);
}

fn render_metrics(f: &mut Frame<'_>, area: Rect, state: &DashboardState) {
    let snapshot = &state.snapshot;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(5)])
        .split(area);

    let cards = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 4); 4])
        .split(rows[0]);

    let system = [
        ("CPU Usage", "cpu", "%"),
        ("Memory Usage", "memory", "%"),
        ("Disk Usage", "disk", "%"),
        ("Response Time", "response_time", " ms"),
    ];
    for ((title, metric, unit), area) in system.into_iter().zip(cards.iter()) {
        let (value, color) = match snapshot.latest(metric) {
            Some(reading) => (
                format!("{:.1}{}", reading.value, unit),
                if reading.is_healthy { Color::Green } else { Color::Red },
            ),
            None => ("-".to_string(), Color::DarkGray),
        };
        f.render_widget(kpi_card(title, value, color), *area);
    }

    let readings: Vec<Row> = snapshot
        .metrics
        .iter()
        .map(|reading| {
            let (label, color) = if reading.is_healthy {
                ("healthy", Color::Green)
            } else {
                ("breach", Color::Red)
            };
            Row::new(vec![
                Cell::from(reading.service_name.clone()),
                Cell::from(reading.metric_name.clone()),
                Cell::from(format!("{:.2}", reading.value)),
                Cell::from(
                    reading
                        .threshold
                        .map(|t| format!("{:.1}", t))
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::from(Span::styled(label, Style::default().fg(color))),
                Cell::from(reading.samples.to_string()),
                Cell::from(reading.timestamp.format("%m-%d %H:%M:%S").to_string()),
            ])
        })
        .collect();

    let table = Table::new(
        readings,
        [
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Min(15),
        ],
    )
    .header(header_row(&[
        "Service", "Metric", "Latest", "Threshold", "Status", "Samples", "Updated",
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Latest Metrics ({})", snapshot.metrics.len())),
    );
    f.render_widget(table, rows[1]);
}

fn render_recovery(f: &mut Frame<'_>, area: Rect, state: &DashboardState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(5)])
        .split(area);

    let rules: Vec<Row> = RECOVERY_STRATEGIES
        .iter()
        .map(|(metric, strategies)| {
            let mut cells = vec![Cell::from(*metric)];
            cells.extend(strategies.iter().map(|s| Cell::from(s.action)));
            Row::new(cells)
        })
        .collect();

    let rules_table = Table::new(
        rules,
        [
            Constraint::Length(14),
            Constraint::Length(22),
            Constraint::Length(22),
            Constraint::Min(22),
        ],
    )
    .header(header_row(&["Incident Type", "1st", "2nd", "3rd"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("Recovery Rules"),
    );
    f.render_widget(rules_table, chunks[0]);

    let actions: Vec<Row> = state
        .snapshot
        .actions
        .iter()
        .map(|action| {
            Row::new(vec![
                Cell::from(format!("#{}", action.incident_id)),
                Cell::from(action.action_type.clone()),
                Cell::from(Span::styled(
                    action.status.as_str(),
                    Style::default().fg(action_color(action.status)),
                )),
                Cell::from(action.executed_at.format("%m-%d %H:%M:%S").to_string()),
                Cell::from(action.error_message.clone().unwrap_or_default()),
            ])
        })
        .collect();

    let stats = &state.snapshot.recovery_stats;
    let actions_table = Table::new(
        actions,
        [
            Constraint::Length(9),
            Constraint::Length(22),
            Constraint::Length(8),
            Constraint::Length(15),
            Constraint::Min(20),
        ],
    )
    .header(header_row(&["Incident", "Action", "Status", "Executed", "Error"]))
    .block(Block::default().borders(Borders::ALL).title(format!(
        "Recent Actions ({} total, {} ok, {} failed)",
        stats.total_actions, stats.successful, stats.failed
    )));
    f.render_widget(actions_table, chunks[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::app::{DashboardSnapshot, MetricReading};
    use crate::database::Incident;
    use crate::incidents::IncidentStats;
    use chrono::Utc;
    use ratatui::{backend::TestBackend, Terminal};

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn state() -> DashboardState {
        let incident = Incident {
            id: 12,
            title: "web-api - High CPU".to_string(),
            description: "cpu usage at 130.00% (threshold: 80.0%)".to_string(),
            severity: Severity::Critical,
            status: IncidentStatus::Open,
            service_name: "web-api".to_string(),
            metric_name: Some("cpu".to_string()),
            detected_at: Utc::now(),
            resolved_at: None,
            auto_recovered: false,
            recovery_action: None,
            error_message: Some("cpu exceeded threshold".to_string()),
            metric_value: Some(130.0),
            threshold_value: Some(80.0),
        };

        DashboardState::new(DashboardSnapshot {
            stats: IncidentStats {
                total: 7,
                open: 3,
                resolved: 4,
                auto_recovered: 2,
            },
            severity_counts: Severity::ALL.iter().map(|s| (*s, 1)).collect(),
            incidents: vec![incident],
            ..DashboardSnapshot::default()
        })
    }

    fn draw(state: &DashboardState) -> String {
        let backend = TestBackend::new(140, 30);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| render(f, state)).unwrap();
        buffer_text(&terminal)
    }

    #[test]
    fn test_overview_shows_kpis_and_recent_incidents() {
        let text = draw(&state());
        assert!(text.contains("ASF-Guardian"));
        assert!(text.contains("Auto-Recovered"));
        assert!(text.contains("Incidents by Severity"));
        assert!(text.contains("web-api - High CPU"));
    }

    #[test]
    fn test_incidents_tab_lists_rows() {
        let mut state = state();
        state.tab = Tab::Incidents;
        let text = draw(&state);
        assert!(text.contains("Incidents (1)"));
        assert!(text.contains("130.0 / 80.0"));
        assert!(text.contains("critical"));
        assert!(text.contains("s severity"));
    }

    #[test]
    fn test_incidents_tab_shows_active_filter() {
        let mut state = state();
        state.tab = Tab::Incidents;
        state.filter.severity = Some(Severity::Low);
        let text = draw(&state);
        assert!(text.contains("Incidents (0 of 1) [severity=low]"));
        assert!(!text.contains("web-api - High CPU"));
    }

    #[test]
    fn test_metrics_tab_shows_latest_readings() {
        let mut state = state();
        state.tab = Tab::Metrics;
        state.snapshot.metrics = vec![
            MetricReading {
                service_name: "system".to_string(),
                metric_name: "cpu".to_string(),
                value: 42.5,
                threshold: Some(80.0),
                is_healthy: true,
                samples: 3,
                timestamp: Utc::now(),
            },
            MetricReading {
                service_name: "web-api".to_string(),
                metric_name: "response_time".to_string(),
                value: 7200.0,
                threshold: Some(5000.0),
                is_healthy: false,
                samples: 1,
                timestamp: Utc::now(),
            },
        ];

        let text = draw(&state);
        assert!(text.contains("Latest Metrics (2)"));
        assert!(text.contains("42.5%"));
        assert!(text.contains("7200.0 ms"));
        assert!(text.contains("breach"));
        assert!(text.contains("healthy"));
        assert!(text.contains("Disk Usage"));
    }

    #[test]
    fn test_recovery_tab_shows_rules() {
        let mut state = state();
        state.tab = Tab::Recovery;
        state.status_line = Some("refresh failed".to_string());
        let text = draw(&state);
        assert!(text.contains("Recovery Rules"));
        assert!(text.contains("rollback_deployment"));
        assert!(text.contains("refresh failed"));
    }
}

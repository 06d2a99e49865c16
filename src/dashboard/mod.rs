//! Terminal dashboard

pub mod app;
pub mod widgets;

pub use app::{DashboardAction, DashboardSnapshot, DashboardState, IncidentFilter, MetricReading, Tab};

use crate::config::DashboardConfig;
use crate::database::Database;
use crate::incidents::IncidentDetector;
use crate::recovery::AutoRecovery;
use anyhow::Result;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::{Duration, Instant};

/// Run the dashboard until the user quits
pub async fn run(
    db: Database,
    detector: IncidentDetector,
    recovery: AutoRecovery,
    config: &DashboardConfig,
) -> Result<()> {
    if !io::stdout().is_tty() {
        return Err(anyhow::anyhow!(
            "The dashboard requires a terminal (TTY). Use `asf-guardian stats` for plain output."
        ));
    }

    let snapshot = DashboardSnapshot::load(&db, &detector, &recovery, config.incident_limit).await?;
    let mut state = DashboardState::new(snapshot);

    enable_raw_mode().map_err(|e| anyhow::anyhow!("Failed to enable raw mode: {}", e))?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)
        .map_err(|e| anyhow::anyhow!("Failed to setup terminal: {}", e))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal =
        Terminal::new(backend).map_err(|e| anyhow::anyhow!("Failed to create terminal: {}", e))?;

    let result = run_loop(&mut terminal, &mut state, &db, &detector, &recovery, config).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut DashboardState,
    db: &Database,
    detector: &IncidentDetector,
    recovery: &AutoRecovery,
    config: &DashboardConfig,
) -> Result<()> {
    let tick_rate = Duration::from_millis(250);
    let refresh_interval = Duration::from_secs(config.refresh_secs);
    let mut last_refresh = Instant::now();

    loop {
        terminal.draw(|f| widgets::render(f, state))?;

        let mut refresh = last_refresh.elapsed() >= refresh_interval;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                match state.handle_key(key) {
                    DashboardAction::Quit => return Ok(()),
                    DashboardAction::Refresh => refresh = true,
                    DashboardAction::None => {}
                }
            }
        }

        if refresh {
            match DashboardSnapshot::load(db, detector, recovery, config.incident_limit).await {
                Ok(snapshot) => {
                    state.snapshot = snapshot;
                    state.status_line = None;
                }
                Err(e) => {
                    tracing::warn!("Dashboard refresh failed: {}", e);
                    state.status_line = Some(format!("Refresh failed: {}", e));
                }
            }
            last_refresh = Instant::now();
        }
    }
}

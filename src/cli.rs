use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::advisor::AIAdvisor;
use crate::alerts::{Mailer, SmtpClient};
use crate::api::{ApiServerBuilder, AppState};
use crate::config::GuardianConfig;
use crate::database::{Database, Incident, Severity};
use crate::incidents::{IncidentDetector, Thresholds};
use crate::recovery::{AutoRecovery, RecoveryOutcome, SimulatedExecutor};
use crate::worker::{JobQueue, SystemStatsService, Worker, WorkerHandle};

/// ASF-Guardian - AI-Ops incident detection and auto-recovery
#[derive(Parser)]
#[command(name = "asf-guardian")]
#[command(about = "Detect metric threshold breaches, recover automatically and alert")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the REST API together with the background worker
    Serve {
        /// Listen address, overrides `api.bind`
        #[arg(long)]
        bind: Option<String>,

        /// Serve the API only; recovery runs as background tasks
        #[arg(long)]
        no_worker: bool,
    },

    /// Run the background worker only
    Worker,

    /// Open the terminal dashboard
    Dashboard,

    /// Create the database schema
    InitDb,

    /// Check a single metric value and recover if it breaches
    Check {
        service: String,
        metric: String,
        #[arg(value_parser = parse_metric_value, allow_negative_numbers = true)]
        value: f64,
    },

    /// Attempt recovery for an incident
    Recover { incident_id: i64 },

    /// Create an incident of the given severity and recover it
    Simulate {
        #[arg(default_value = "web-api")]
        service: String,

        #[arg(long, default_value = "cpu")]
        metric: String,

        #[arg(long, default_value = "high")]
        severity: Severity,
    },

    /// Generate random demo incidents and recover them
    Demo {
        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Ask the AI advisor a question
    Ask {
        question: String,

        /// Incident to use as context
        #[arg(long)]
        incident: Option<i64>,
    },

    /// Show incident and recovery statistics
    Stats {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show or create the configuration file
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration, secrets masked
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the configuration file location
    Path,

    /// Connect to the configured SMTP server and issue NOOP
    TestSmtp,
}

/// Core services shared by the commands
struct Services {
    db: Database,
    detector: IncidentDetector,
    recovery: AutoRecovery,
}

/// CLI command handler
pub struct CliHandler {
    config: GuardianConfig,
    config_path: Option<PathBuf>,
}

impl CliHandler {
    pub fn new(config: GuardianConfig, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    pub async fn handle_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Serve { bind, no_worker } => self.handle_serve(bind, no_worker).await,
            Commands::Worker => self.handle_worker().await,
            Commands::Dashboard => self.handle_dashboard().await,
            Commands::InitDb => self.handle_init_db().await,
            Commands::Check {
                service,
                metric,
                value,
            } => self.handle_check(&service, &metric, value).await,
            Commands::Recover { incident_id } => self.handle_recover(incident_id).await,
            Commands::Simulate {
                service,
                metric,
                severity,
            } => self.handle_simulate(&service, &metric, severity).await,
            Commands::Demo { seed } => self.handle_demo(seed).await,
            Commands::Ask { question, incident } => self.handle_ask(&question, incident).await,
            Commands::Stats { json } => self.handle_stats(json).await,
            Commands::Config(args) => self.handle_config(args).await,
        }
    }

    async fn services(&self) -> Result<Services> {
        let db = Database::new(&self.config.database.url, self.config.database.max_connections)
            .await
            .map_err(|e| anyhow!("Failed to open database {}: {}", self.config.database.url, e))?;
        let detector = IncidentDetector::new(db.clone(), Thresholds::new(self.config.thresholds.clone()));
        let recovery = AutoRecovery::new(
            db.clone(),
            Arc::new(SimulatedExecutor::from_config(&self.config.recovery)),
        );
        Ok(Services {
            db,
            detector,
            recovery,
        })
    }

    fn build_worker(&self, services: &Services, queue: JobQueue) -> Result<Worker> {
        let mailer = Mailer::new(self.config.smtp.clone(), services.detector.clone())?;
        if !mailer.is_configured() {
            tracing::warn!("SMTP credentials not configured, alerts will be skipped");
        }

        let worker = Worker::new(
            services.detector.clone(),
            services.recovery.clone(),
            mailer,
            queue,
            Box::new(SystemStatsService::new()),
            self.config.worker.services.clone(),
        );
        Ok(match self.config.recovery.seed {
            Some(seed) => worker.with_seed(seed),
            None => worker,
        })
    }

    async fn handle_serve(&self, bind: Option<String>, no_worker: bool) -> Result<()> {
        let services = self.services().await?;
        let bind = bind.unwrap_or_else(|| self.config.api.bind.clone());
        let listen: SocketAddr = bind
            .parse()
            .map_err(|e| anyhow!("Invalid listen address {}: {}", bind, e))?;

        let advisor = AIAdvisor::new(services.db.clone(), &self.config.advisor);
        let mut state = AppState::new(
            services.db.clone(),
            services.detector.clone(),
            services.recovery.clone(),
            advisor,
        );

        let worker = if no_worker {
            None
        } else {
            let (queue, rx) = JobQueue::new(self.config.worker.queue_capacity);
            let worker = self.build_worker(&services, queue.clone())?;
            state = state.with_queue(queue.clone());
            Some(WorkerHandle::start(self.config.worker.clone(), worker, queue, rx))
        };

        let api = ApiServerBuilder::new(listen, state).spawn().await?;
        println!("🛡️  ASF-Guardian API listening on http://{}", api.local_addr());
        println!("   Press Ctrl-C to stop");

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown requested");

        api.shutdown().await?;
        if let Some(worker) = worker {
            let stats = worker.shutdown().await;
            tracing::info!(
                processed = stats.jobs_processed,
                failed = stats.jobs_failed,
                "Worker stopped"
            );
        }
        Ok(())
    }

    async fn handle_worker(&self) -> Result<()> {
        let services = self.services().await?;
        let (queue, rx) = JobQueue::new(self.config.worker.queue_capacity);
        let worker = self.build_worker(&services, queue.clone())?;
        let handle = WorkerHandle::start(self.config.worker.clone(), worker, queue, rx);

        println!("⚙️  ASF-Guardian worker running, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;

        let stats = handle.shutdown().await;
        println!(
            "Processed {} jobs ({} failed), {} incidents created, {} recovered",
            stats.jobs_processed,
            stats.jobs_failed,
            stats.incidents_created,
            stats.recoveries_succeeded
        );
        Ok(())
    }

    async fn handle_dashboard(&self) -> Result<()> {
        let services = self.services().await?;
        crate::dashboard::run(
            services.db,
            services.detector,
            services.recovery,
            &self.config.dashboard,
        )
        .await
    }

    async fn handle_init_db(&self) -> Result<()> {
        self.services().await?;
        println!("✅ Database initialized at {}", self.config.database.url);
        Ok(())
    }

    async fn handle_check(&self, service: &str, metric: &str, value: f64) -> Result<()> {
        let services = self.services().await?;
        match services.detector.check_metric(service, metric, value).await? {
            None => println!("✅ {} {} = {} is within normal range", service, metric, value),
            Some(incident) => {
                print_incident(&incident);
                let outcome = services.recovery.attempt_recovery(incident.id).await?;
                print_outcome(&outcome);
            }
        }
        Ok(())
    }

    async fn handle_recover(&self, incident_id: i64) -> Result<()> {
        let services = self.services().await?;
        let outcome = services.recovery.attempt_recovery(incident_id).await?;
        print_outcome(&outcome);
        Ok(())
    }

    async fn handle_simulate(&self, service: &str, metric: &str, severity: Severity) -> Result<()> {
        let services = self.services().await?;
        let (queue, mut rx) = JobQueue::new(self.config.worker.queue_capacity);
        let mut worker = self.build_worker(&services, queue)?;

        let Some(incident) = worker.simulate_incident(service, metric, severity).await? else {
            println!("No incident created: {} has no threshold", metric);
            return Ok(());
        };
        print_incident(&incident);

        // Deliver the alert queued by the recovery
        while let Ok(job) = rx.try_recv() {
            worker.process(job).await;
        }

        if let Some(updated) = services.detector.get_incident_by_id(incident.id).await? {
            println!("   Status: {}", updated.status);
            if let Some(action) = updated.recovery_action {
                println!("   Recovery action: {}", action);
            }
        }
        Ok(())
    }

    async fn handle_demo(&self, seed: Option<u64>) -> Result<()> {
        let services = self.services().await?;
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let incidents = services.detector.generate_demo_incidents(&mut rng).await?;
        println!("🎲 Generated {} demo incidents", incidents.len());

        for incident in &incidents {
            print_incident(incident);
            let outcome = services.recovery.attempt_recovery(incident.id).await?;
            print_outcome(&outcome);
        }
        Ok(())
    }

    async fn handle_ask(&self, question: &str, incident_id: Option<i64>) -> Result<()> {
        let services = self.services().await?;
        let advisor = AIAdvisor::new(services.db, &self.config.advisor);
        let response = advisor.ask(question, incident_id).await;

        if let Some(answer) = &response.answer {
            println!("{}", answer);
        }
        if !response.success {
            if let Some(message) = &response.message {
                eprintln!("❌ {}", message);
            }
        }
        Ok(())
    }

    async fn handle_stats(&self, json: bool) -> Result<()> {
        let services = self.services().await?;
        let incidents = services.detector.get_incident_stats().await?;
        let recovery = services.recovery.get_recovery_stats().await?;

        if json {
            let body = serde_json::json!({ "incidents": incidents, "recovery": recovery });
            println!("{}", serde_json::to_string_pretty(&body)?);
            return Ok(());
        }

        println!("📊 Incidents");
        println!("   Total:          {}", incidents.total);
        println!("   Open:           {}", incidents.open);
        println!("   Resolved:       {}", incidents.resolved);
        println!("   Auto-recovered: {}", incidents.auto_recovered);
        println!("🔧 Recovery");
        println!("   Actions:        {}", recovery.total_actions);
        println!("   Successful:     {}", recovery.successful);
        println!("   Failed:         {}", recovery.failed);
        println!("   Success rate:   {:.2}%", recovery.success_rate);
        Ok(())
    }

    async fn handle_config(&self, args: ConfigArgs) -> Result<()> {
        match args.command {
            ConfigCommands::Show => {
                let mut shown = self.config.clone();
                mask_secrets(&mut shown);
                println!("{}", toml::to_string_pretty(&shown)?);
            }
            ConfigCommands::Init { force } => {
                let path = self.config_file()?;
                if path.exists() && !force {
                    return Err(anyhow!(
                        "{} already exists, use --force to overwrite",
                        path.display()
                    ));
                }
                GuardianConfig::default().save_to_file(&path).await?;
                println!("✅ Wrote default configuration to {}", path.display());
            }
            ConfigCommands::Path => println!("{}", self.config_file()?.display()),
            ConfigCommands::TestSmtp => {
                let smtp = &self.config.smtp;
                if !smtp.has_credentials() {
                    return Err(anyhow!(
                        "SMTP credentials not configured, set smtp.user and smtp.password"
                    ));
                }
                let client = SmtpClient::new(smtp)?;
                if client.test_connection().await? {
                    println!("✅ SMTP connection to {}:{} OK", smtp.host, smtp.port);
                } else {
                    return Err(anyhow!("SMTP server {}:{} rejected NOOP", smtp.host, smtp.port));
                }
            }
        }
        Ok(())
    }

    fn config_file(&self) -> Result<PathBuf> {
        self.config_path
            .clone()
            .or_else(GuardianConfig::default_path)
            .ok_or_else(|| anyhow!("Could not determine config directory, pass --config"))
    }
}

/// Metric values must be finite numbers
fn parse_metric_value(value: &str) -> Result<f64, String> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| format!("`{}` is not a number", value))?;
    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(format!("metric value must be a finite number, got `{}`", value))
    }
}

fn mask_secrets(config: &mut GuardianConfig) {
    for secret in [&mut config.smtp.password, &mut config.advisor.api_key] {
        if !secret.is_empty() {
            *secret = "********".to_string();
        }
    }
}

fn print_incident(incident: &Incident) {
    println!(
        "🚨 Incident #{} [{}] {}",
        incident.id, incident.severity, incident.title
    );
    println!("   {}", incident.description);
}

fn print_outcome(outcome: &RecoveryOutcome) {
    if outcome.success {
        println!(
            "✅ Recovered incident #{} with {} on {}",
            outcome.incident_id,
            outcome.action_type.as_deref().unwrap_or("-"),
            outcome.service_name.as_deref().unwrap_or("-")
        );
    } else {
        println!(
            "❌ Recovery failed for incident #{}: {}",
            outcome.incident_id,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
}

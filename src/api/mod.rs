//! REST API server

pub mod error;
pub mod handlers;

pub use error::{ApiError, ApiResult};

use crate::advisor::AIAdvisor;
use crate::database::Database;
use crate::incidents::IncidentDetector;
use crate::recovery::AutoRecovery;
use crate::worker::JobQueue;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state injected into the handlers
pub struct AppState {
    pub db: Database,
    pub detector: IncidentDetector,
    pub recovery: AutoRecovery,
    pub advisor: AIAdvisor,
    /// Worker queue for recovery jobs. Without one, recovery runs as a
    /// detached task.
    pub queue: Option<JobQueue>,
}

impl AppState {
    pub fn new(
        db: Database,
        detector: IncidentDetector,
        recovery: AutoRecovery,
        advisor: AIAdvisor,
    ) -> Self {
        Self {
            db,
            detector,
            recovery,
            advisor,
            queue: None,
        }
    }

    pub fn with_queue(mut self, queue: JobQueue) -> Self {
        self.queue = Some(queue);
        self
    }
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/incidents", get(handlers::list_incidents))
        .route("/api/incidents/check", post(handlers::check_metric))
        .route("/api/incidents/stats/summary", get(handlers::incident_stats))
        .route(
            "/api/incidents/:id",
            get(handlers::get_incident).put(handlers::update_incident),
        )
        .route("/api/recovery/attempt", post(handlers::attempt_recovery))
        .route("/api/recovery/history", get(handlers::recovery_history))
        .route("/api/recovery/stats", get(handlers::recovery_stats))
        .route("/api/recovery/strategies", get(handlers::recovery_strategies))
        .route("/api/metrics", get(handlers::list_metrics))
        .route("/api/advisor/ask", post(handlers::advisor_ask))
        .route("/api/advisor/analyze/:id", get(handlers::advisor_analyze))
        .route("/api/advisor/tips", get(handlers::advisor_tips))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Configures and spawns the API server
pub struct ApiServerBuilder {
    listen: SocketAddr,
    state: AppState,
}

impl ApiServerBuilder {
    pub fn new(listen: SocketAddr, state: AppState) -> Self {
        Self { listen, state }
    }

    /// Bind the listener and serve in a background task
    pub async fn spawn(self) -> anyhow::Result<ApiHandle> {
        let listener = TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "ASF-Guardian API listening");

        let app = router(Arc::new(self.state));

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "API server exited with error");
            }
        });

        Ok(ApiHandle {
            address: local_addr,
            task,
            shutdown: shutdown_tx,
        })
    }
}

/// Running API server
pub struct ApiHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl ApiHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Request graceful shutdown and wait for the server task to finish
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.map_err(|join| anyhow::anyhow!(join))?;
        info!("ASF-Guardian API stopped");
        Ok(())
    }
}

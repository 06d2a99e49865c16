use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::advisor::{AIAdvisor, AdvisorResponse};
use crate::database::{Incident, IncidentStatus, RecoveryAction, SystemMetric};
use crate::incidents::IncidentStats;
use crate::recovery::{RecoveryOutcome, RecoveryStats, Strategy, RECOVERY_STRATEGIES};
use crate::worker::Job;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

type Shared = State<Arc<AppState>>;

#[derive(Debug, Deserialize)]
pub struct MetricCheck {
    pub service_name: String,
    pub metric_name: String,
    pub metric_value: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident: Option<Incident>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct IncidentQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IncidentList {
    pub incidents: Vec<Incident>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct IncidentUpdate {
    pub status: String,
    pub recovery_action: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecoveryRequest {
    pub incident_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub incident_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecoveryHistory {
    pub history: Vec<RecoveryAction>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub service_name: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricList {
    pub metrics: Vec<SystemMetric>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub incident_id: Option<i64>,
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "service": "ASF-Guardian API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn check_metric(
    State(state): Shared,
    payload: Result<Json<MetricCheck>, JsonRejection>,
) -> ApiResult<Json<CheckResponse>> {
    let Json(metric) = payload?;

    let incident = state
        .detector
        .check_metric(&metric.service_name, &metric.metric_name, metric.metric_value)
        .await?;

    let Some(incident) = incident else {
        return Ok(Json(CheckResponse {
            status: "healthy".to_string(),
            incident: None,
            message: "Metric within normal range".to_string(),
        }));
    };

    schedule_recovery(&state, incident.id).await;

    Ok(Json(CheckResponse {
        status: "incident_created".to_string(),
        incident: Some(incident),
        message: "Threshold exceeded, incident created".to_string(),
    }))
}

/// Hand recovery to the worker queue, or run it in the background when the
/// server has no worker
async fn schedule_recovery(state: &AppState, incident_id: i64) {
    if let Some(queue) = &state.queue {
        match queue.enqueue(Job::TriggerRecovery { incident_id }).await {
            Ok(()) => return,
            Err(e) => warn!(incident_id, "Could not queue recovery, running inline: {}", e),
        }
    }

    let recovery = state.recovery.clone();
    tokio::spawn(async move {
        match recovery.attempt_recovery(incident_id).await {
            Ok(outcome) => info!(incident_id, success = outcome.success, "Auto-recovery finished"),
            Err(e) => warn!(incident_id, "Auto-recovery failed: {}", e),
        }
    });
}

pub async fn list_incidents(
    State(state): Shared,
    query: Result<Query<IncidentQuery>, QueryRejection>,
) -> ApiResult<Json<IncidentList>> {
    let Query(query) = query?;

    let incidents = if query.status.as_deref() == Some("open") {
        state.detector.get_open_incidents().await?
    } else {
        state
            .detector
            .get_incident_history(query.limit.unwrap_or(50))
            .await?
    };

    Ok(Json(IncidentList {
        count: incidents.len(),
        incidents,
    }))
}

pub async fn get_incident(
    State(state): Shared,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Incident>> {
    let Path(id) = id?;
    state
        .detector
        .get_incident_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(ApiError::incident_not_found)
}

pub async fn update_incident(
    State(state): Shared,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<IncidentUpdate>, JsonRejection>,
) -> ApiResult<Json<Incident>> {
    let Path(id) = id?;
    let Json(update) = payload?;
    let status: IncidentStatus = update.status.parse()?;

    state
        .detector
        .update_incident_status(id, status, update.recovery_action.as_deref())
        .await?
        .map(Json)
        .ok_or_else(ApiError::incident_not_found)
}

pub async fn incident_stats(State(state): Shared) -> ApiResult<Json<IncidentStats>> {
    Ok(Json(state.detector.get_incident_stats().await?))
}

pub async fn attempt_recovery(
    State(state): Shared,
    payload: Result<Json<RecoveryRequest>, JsonRejection>,
) -> ApiResult<Json<RecoveryOutcome>> {
    let Json(request) = payload?;
    Ok(Json(state.recovery.attempt_recovery(request.incident_id).await?))
}

pub async fn recovery_history(
    State(state): Shared,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<RecoveryHistory>> {
    let Query(query) = query?;
    let history = state.recovery.get_recovery_history(query.incident_id).await?;
    Ok(Json(RecoveryHistory {
        count: history.len(),
        history,
    }))
}

pub async fn recovery_stats(State(state): Shared) -> ApiResult<Json<RecoveryStats>> {
    Ok(Json(state.recovery.get_recovery_stats().await?))
}

pub async fn recovery_strategies() -> Json<BTreeMap<&'static str, &'static [Strategy]>> {
    Json(
        RECOVERY_STRATEGIES
            .iter()
            .map(|(metric, strategies)| (*metric, strategies.as_slice()))
            .collect(),
    )
}

pub async fn list_metrics(
    State(state): Shared,
    query: Result<Query<MetricsQuery>, QueryRejection>,
) -> ApiResult<Json<MetricList>> {
    let Query(query) = query?;
    let metrics = state
        .db
        .recent_metrics(query.service_name.as_deref(), query.limit.unwrap_or(100))
        .await?;
    Ok(Json(MetricList {
        count: metrics.len(),
        metrics,
    }))
}

pub async fn advisor_ask(
    State(state): Shared,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> ApiResult<Json<AdvisorResponse>> {
    let Json(request) = payload?;
    if request.question.trim().is_empty() {
        return Err(ApiError::BadRequest("Question must not be empty".to_string()));
    }
    Ok(Json(state.advisor.ask(&request.question, request.incident_id).await))
}

pub async fn advisor_analyze(
    State(state): Shared,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<AdvisorResponse>> {
    let Path(id) = id?;
    if state.detector.get_incident_by_id(id).await?.is_none() {
        return Err(ApiError::incident_not_found());
    }
    Ok(Json(state.advisor.analyze_incident(id).await))
}

pub async fn advisor_tips() -> Json<Value> {
    Json(json!({ "tips": AIAdvisor::quick_tips() }))
}

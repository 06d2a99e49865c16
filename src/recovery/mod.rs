//! Automated recovery
//!
//! Maps incident types to ordered recovery strategies and runs them through
//! an [`ActionExecutor`] until one succeeds.

pub mod engine;
pub mod executor;
pub mod strategies;

pub use engine::AutoRecovery;
pub use executor::{ActionExecutor, SimulatedExecutor};
pub use strategies::{strategies_for, Strategy, RECOVERY_STRATEGIES};

use crate::database::DatabaseError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Incident {0} not found")]
    IncidentNotFound(i64),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// Result of a recovery attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub success: bool,
    pub incident_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecoveryOutcome {
    pub fn success(incident_id: i64, action_type: &str, service_name: &str) -> Self {
        Self {
            success: true,
            incident_id,
            action_type: Some(action_type.to_string()),
            service_name: Some(service_name.to_string()),
            error: None,
        }
    }

    pub fn failure(incident_id: i64, error: &str) -> Self {
        Self {
            success: false,
            incident_id,
            action_type: None,
            service_name: None,
            error: Some(error.to_string()),
        }
    }
}

/// Aggregate recovery action counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStats {
    pub total_actions: i64,
    pub successful: i64,
    pub failed: i64,
    /// Percentage of successful actions, rounded to two decimals
    pub success_rate: f64,
}

impl RecoveryStats {
    pub fn new(total_actions: i64, successful: i64, failed: i64) -> Self {
        let success_rate = if total_actions > 0 {
            (successful as f64 / total_actions as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        Self {
            total_actions,
            successful,
            failed,
            success_rate,
        }
    }
}

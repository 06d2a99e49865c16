//! Incident detection engine
//!
//! Compares metric samples against static thresholds and opens incidents
//! for breaches.

pub mod detector;

pub use detector::{calculate_severity, IncidentDetector, IncidentStats, Thresholds};

/// Services used when generating demo incidents
pub const DEMO_SERVICES: [&str; 4] = ["web-api", "database", "cache-server", "auth-service"];

/// Metrics used when generating demo incidents
pub const DEMO_METRICS: [&str; 3] = ["cpu", "memory", "response_time"];

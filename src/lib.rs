pub mod advisor;
pub mod alerts;
pub mod api;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod database;
pub mod incidents;
pub mod recovery;
pub mod worker;

pub use config::GuardianConfig;

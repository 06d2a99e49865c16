//! Email alerts for incidents and daily summaries

pub mod mailer;
pub mod templates;
pub mod transport;

pub use mailer::Mailer;
pub use transport::{MailTransport, SmtpClient};

use crate::database::DatabaseError;
use thiserror::Error;

/// Alert delivery errors
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Incident {0} not found")]
    IncidentNotFound(i64),

    #[error("Invalid email address: {0}")]
    InvalidAddress(#[from] lettre::address::AddressError),

    #[error("Message build error: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

pub type AlertResult<T> = Result<T, AlertError>;

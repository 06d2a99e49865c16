//! Advisor error types

use crate::database::DatabaseError;
use std::time::Duration;
use thiserror::Error;

pub type AdvisorResult<T> = Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("OpenAI API key not configured")]
    NotConfigured,

    #[error("AI provider is unavailable: {message}")]
    ProviderUnavailable { message: String },

    #[error("Authentication failed: {provider}")]
    AuthenticationFailure { provider: String },

    #[error("Rate limit exceeded for provider: {provider}")]
    RateLimitExceeded { provider: String },

    #[error("Invalid response from AI provider: {details}")]
    InvalidResponse { details: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("AI provider timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl AdvisorError {
    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        AdvisorError::ProviderUnavailable {
            message: message.into(),
        }
    }

    pub fn auth_failure(provider: impl Into<String>) -> Self {
        AdvisorError::AuthenticationFailure {
            provider: provider.into(),
        }
    }

    pub fn rate_limit(provider: impl Into<String>) -> Self {
        AdvisorError::RateLimitExceeded {
            provider: provider.into(),
        }
    }

    pub fn invalid_response(details: impl Into<String>) -> Self {
        AdvisorError::InvalidResponse {
            details: details.into(),
        }
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        AdvisorError::NetworkError {
            message: message.into(),
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        AdvisorError::Timeout { timeout }
    }
}

impl From<reqwest::Error> for AdvisorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            AdvisorError::provider_unavailable(err.to_string())
        } else {
            AdvisorError::network_error(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AdvisorError {
    fn from(err: serde_json::Error) -> Self {
        AdvisorError::invalid_response(format!("JSON parsing error: {}", err))
    }
}

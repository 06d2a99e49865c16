//! OpenAI chat-completions provider

use super::error::AdvisorError;
use super::provider::{ChatMessage, ChatProvider};
use super::AdvisorResult;
use crate::config::AdvisorConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;

/// OpenAI API request structure
#[derive(Debug, Clone, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

/// OpenAI API response structure
#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
struct OpenAIResponse {
    #[serde(default)]
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
struct OpenAIChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIUsage {
    total_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_tokens: u32,
    temperature: f32,
    request_timeout: Duration,
}

impl OpenAIProvider {
    /// Create a provider from advisor settings. Returns `None` without an
    /// API key.
    pub fn from_config(config: &AdvisorConfig) -> Option<Self> {
        if config.api_key.trim().is_empty() {
            return None;
        }

        let request_timeout = config.request_timeout();
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();

        Some(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            request_timeout,
        })
    }

    async fn make_request(&self, messages: &[ChatMessage]) -> AdvisorResult<String> {
        let request = OpenAIRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = timeout(
            self.request_timeout,
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| AdvisorError::timeout(self.request_timeout))??;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            return match status.as_u16() {
                401 => Err(AdvisorError::auth_failure("OpenAI")),
                429 => Err(AdvisorError::rate_limit("OpenAI")),
                500..=599 => Err(AdvisorError::provider_unavailable(format!(
                    "OpenAI server error: {}",
                    status
                ))),
                _ => match serde_json::from_str::<OpenAIErrorResponse>(&error_text) {
                    Ok(error_response) => {
                        Err(AdvisorError::invalid_response(error_response.error.message))
                    }
                    Err(_) => Err(AdvisorError::invalid_response(format!(
                        "OpenAI API error {}: {}",
                        status, error_text
                    ))),
                },
            };
        }

        let openai_response: OpenAIResponse = response.json().await.map_err(|e| {
            AdvisorError::invalid_response(format!("Failed to parse OpenAI response: {}", e))
        })?;

        if let Some(usage) = &openai_response.usage {
            tracing::debug!("OpenAI request used {} tokens", usage.total_tokens);
        }

        openai_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| AdvisorError::invalid_response("No choices in OpenAI response"))
    }
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> AdvisorResult<String> {
        self.make_request(messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn mock_server(status: StatusCode, body: Value) -> String {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |Json(request): Json<Value>| {
                let body = body.clone();
                async move {
                    assert_eq!(request["model"], "gpt-3.5-turbo");
                    assert_eq!(request["max_tokens"], 500);
                    (status, Json(body))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1/chat/completions", addr)
    }

    fn provider(endpoint: String) -> OpenAIProvider {
        let config = AdvisorConfig {
            api_key: "test-key".to_string(),
            endpoint,
            ..AdvisorConfig::default()
        };
        OpenAIProvider::from_config(&config).unwrap()
    }

    #[test]
    fn test_missing_key_gives_no_provider() {
        assert!(OpenAIProvider::from_config(&AdvisorConfig::default()).is_none());
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let endpoint = mock_server(
            StatusCode::OK,
            json!({
                "model": "gpt-3.5-turbo",
                "choices": [{
                    "message": {"role": "assistant", "content": "  Restart the service.  "},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14}
            }),
        )
        .await;

        let reply = provider(endpoint)
            .complete(&[ChatMessage::user("cpu is high")])
            .await
            .unwrap();
        assert_eq!(reply, "Restart the service.");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let error = json!({"error": {"message": "bad things", "type": "x"}});

        let endpoint = mock_server(StatusCode::UNAUTHORIZED, error.clone()).await;
        let err = provider(endpoint).complete(&[]).await.unwrap_err();
        assert!(matches!(err, AdvisorError::AuthenticationFailure { .. }));

        let endpoint = mock_server(StatusCode::TOO_MANY_REQUESTS, error.clone()).await;
        let err = provider(endpoint).complete(&[]).await.unwrap_err();
        assert!(matches!(err, AdvisorError::RateLimitExceeded { .. }));

        let endpoint = mock_server(StatusCode::BAD_GATEWAY, error.clone()).await;
        let err = provider(endpoint).complete(&[]).await.unwrap_err();
        assert!(matches!(err, AdvisorError::ProviderUnavailable { .. }));

        let endpoint = mock_server(StatusCode::BAD_REQUEST, error).await;
        match provider(endpoint).complete(&[]).await.unwrap_err() {
            AdvisorError::InvalidResponse { details } => assert_eq!(details, "bad things"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_invalid() {
        let endpoint = mock_server(StatusCode::OK, json!({"choices": []})).await;
        let err = provider(endpoint).complete(&[]).await.unwrap_err();
        assert!(matches!(err, AdvisorError::InvalidResponse { .. }));
    }
}

//! AI advisor
//!
//! Wraps an OpenAI chat-completions provider with incident context pulled
//! from the store.

pub mod error;
pub mod openai;
pub mod provider;

pub use error::{AdvisorError, AdvisorResult};
pub use openai::OpenAIProvider;
pub use provider::{ChatMessage, ChatProvider};

use crate::config::AdvisorConfig;
use crate::database::Database;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::Arc;
use tracing::warn;

const SYSTEM_PROMPT: &str = "You are an expert DevOps and SRE AI advisor for ASF-Guardian, \
an incident management and auto-healing platform.

Your role is to:
1. Analyze incidents and provide root cause analysis
2. Suggest remediation actions and best practices
3. Recommend preventive measures
4. Explain technical concepts clearly
5. Provide actionable insights

Always be concise, professional, and focus on practical solutions.";

const CHAT_SYSTEM_PROMPT: &str = "You are an expert DevOps AI advisor for ASF-Guardian. \
Help users with incident management, system monitoring, and DevOps best practices.";

const NOT_CONFIGURED_ANSWER: &str = "Please configure your OpenAI API key to use the AI Advisor.";

const QUICK_TIPS: [&str; 8] = [
    "Configure alert thresholds based on your baseline metrics",
    "Review auto-recovery success rates regularly",
    "Monitor trends to predict future incidents",
    "Set up email alerts for critical incidents",
    "Use AI advisor for root cause analysis",
    "Track MTTR (Mean Time To Recovery) metrics",
    "Implement monitoring for security metrics",
    "Automate common recovery actions",
];

/// Reply from the advisor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisorResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AdvisorResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct AIAdvisor {
    db: Database,
    provider: Option<Arc<dyn ChatProvider>>,
}

impl AIAdvisor {
    pub fn new(db: Database, config: &AdvisorConfig) -> Self {
        let provider = OpenAIProvider::from_config(config)
            .map(|provider| Arc::new(provider) as Arc<dyn ChatProvider>);
        Self { db, provider }
    }

    pub fn with_provider(db: Database, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            db,
            provider: Some(provider),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Context text for the model: one incident with its recovery actions,
    /// or the five most recent incidents
    pub async fn get_incident_context(&self, incident_id: Option<i64>) -> AdvisorResult<String> {
        if let Some(id) = incident_id {
            if let Some(incident) = self.db.get_incident(id).await? {
                let mut context = format!(
                    "Incident #{}:\n- Title: {}\n- Severity: {}\n- Status: {}\n- Service: {}\n- Description: {}\n- Detected: {}\n- Auto-recovered: {}\n",
                    incident.id,
                    incident.title,
                    incident.severity,
                    incident.status,
                    incident.service_name,
                    incident.description,
                    incident.detected_at.to_rfc3339(),
                    incident.auto_recovered
                );

                let actions = self.db.list_recovery_actions(Some(id)).await?;
                if !actions.is_empty() {
                    context.push_str("\nRecovery Actions Attempted:\n");
                    for action in actions.iter().rev() {
                        let _ = writeln!(context, "- {}: {}", action.action_type, action.status);
                    }
                }
                return Ok(context);
            }
        }

        let mut context = String::from("Recent Incidents:\n");
        for incident in self.db.list_incidents(5).await? {
            let _ = writeln!(
                context,
                "- #{}: {} ({}, {})",
                incident.id, incident.title, incident.severity, incident.status
            );
        }
        Ok(context)
    }

    /// Ask a question, optionally about one incident
    pub async fn ask(&self, question: &str, incident_id: Option<i64>) -> AdvisorResponse {
        let Some(provider) = &self.provider else {
            return AdvisorResponse {
                answer: Some(NOT_CONFIGURED_ANSWER.to_string()),
                ..AdvisorResponse::failure(AdvisorError::NotConfigured.to_string())
            };
        };

        match self.try_ask(provider.as_ref(), question, incident_id).await {
            Ok(response) => response,
            Err(e) => {
                warn!("AI advisor request failed: {}", e);
                AdvisorResponse {
                    answer: Some(
                        "Sorry, I encountered an error processing your question. Please try again."
                            .to_string(),
                    ),
                    ..AdvisorResponse::failure(format!("Error: {}", e))
                }
            }
        }
    }

    async fn try_ask(
        &self,
        provider: &dyn ChatProvider,
        question: &str,
        incident_id: Option<i64>,
    ) -> AdvisorResult<AdvisorResponse> {
        let context = self.get_incident_context(incident_id).await?;
        let user_prompt = format!(
            "Context:\n{}\nQuestion: {}\n\nPlease provide a helpful, actionable response.",
            context, question
        );

        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user_prompt)];
        let answer = provider.complete(&messages).await?;

        Ok(AdvisorResponse {
            success: true,
            answer: Some(answer),
            message: None,
            context: Some(context),
            model: Some(provider.model().to_string()),
        })
    }

    /// Root cause, impact, actions and prevention for one incident
    pub async fn analyze_incident(&self, incident_id: i64) -> AdvisorResponse {
        match self.db.get_incident(incident_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return AdvisorResponse::failure("Incident not found"),
            Err(e) => return AdvisorResponse::failure(format!("Error: {}", e)),
        }

        let question = "Analyze this incident and provide:\n\
            1. Likely root cause\n\
            2. Impact assessment\n\
            3. Recommended actions\n\
            4. Prevention strategies";
        self.ask(question, Some(incident_id)).await
    }

    pub async fn suggest_recovery(&self, incident_id: i64) -> AdvisorResponse {
        let question = "What are the best recovery strategies for this incident? \
            Prioritize them and explain why.";
        self.ask(question, Some(incident_id)).await
    }

    pub async fn prevention_tips(&self, service_name: Option<&str>) -> AdvisorResponse {
        let question = match service_name {
            Some(service) => format!(
                "What are best practices for preventing incidents in {}?",
                service
            ),
            None => "What are general best practices for preventing system incidents?".to_string(),
        };
        self.ask(&question, None).await
    }

    /// Multi-turn conversation. A system message is prepended when the
    /// conversation has none.
    pub async fn chat(&self, mut messages: Vec<ChatMessage>) -> AdvisorResponse {
        let Some(provider) = &self.provider else {
            return AdvisorResponse::failure(AdvisorError::NotConfigured.to_string());
        };

        if !messages.iter().any(ChatMessage::is_system) {
            messages.insert(0, ChatMessage::system(CHAT_SYSTEM_PROMPT));
        }

        match provider.complete(&messages).await {
            Ok(answer) => AdvisorResponse {
                success: true,
                answer: Some(answer),
                model: Some(provider.model().to_string()),
                ..AdvisorResponse::default()
            },
            Err(e) => {
                warn!("AI advisor chat failed: {}", e);
                AdvisorResponse::failure(format!("Error: {}", e))
            }
        }
    }

    pub fn quick_tips() -> Vec<&'static str> {
        QUICK_TIPS.to_vec()
    }
}

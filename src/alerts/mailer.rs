use super::templates::{
    daily_summary_subject, incident_subject, DailySummaryTemplate, IncidentAlertTemplate,
};
use super::transport::{MailTransport, SmtpClient};
use super::{AlertError, AlertResult};
use crate::config::SmtpSettings;
use crate::incidents::IncidentDetector;
use crate::recovery::RecoveryOutcome;
use askama::Template;
use chrono::Utc;
use lettre::message::{header::ContentType, Mailbox};
use lettre::Message;
use std::sync::Arc;
use tracing::{info, warn};

/// Sends incident alerts and summaries to the configured recipient
#[derive(Clone)]
pub struct Mailer {
    settings: SmtpSettings,
    detector: IncidentDetector,
    transport: Option<Arc<dyn MailTransport>>,
}

impl Mailer {
    /// Build a mailer over SMTP. Without credentials no transport is
    /// created and every send is skipped.
    pub fn new(settings: SmtpSettings, detector: IncidentDetector) -> AlertResult<Self> {
        let transport: Option<Arc<dyn MailTransport>> = if settings.has_credentials() {
            Some(Arc::new(SmtpClient::new(&settings)?))
        } else {
            None
        };

        Ok(Self {
            settings,
            detector,
            transport,
        })
    }

    /// Build a mailer over a custom transport
    pub fn with_transport(
        settings: SmtpSettings,
        detector: IncidentDetector,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            settings,
            detector,
            transport: Some(transport),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    /// Send an HTML email. Returns `false` when sending was skipped.
    pub async fn send_email(
        &self,
        subject: &str,
        html_body: String,
        to_email: Option<&str>,
    ) -> AlertResult<bool> {
        let Some(transport) = &self.transport else {
            warn!("Email credentials not configured, skipping email: {}", subject);
            return Ok(false);
        };

        let to_email = to_email.unwrap_or(&self.settings.alert_email);
        let from: Mailbox = self.settings.user.parse()?;
        let to: Mailbox = to_email.parse()?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)?;

        transport.send(message).await?;
        info!("Email sent to {}: {}", to_email, subject);
        Ok(true)
    }

    /// Mail the details of an incident and, when given, how recovery went
    pub async fn send_incident_alert(
        &self,
        incident_id: i64,
        outcome: Option<&RecoveryOutcome>,
    ) -> AlertResult<bool> {
        let incident = self
            .detector
            .get_incident_by_id(incident_id)
            .await?
            .ok_or(AlertError::IncidentNotFound(incident_id))?;

        let subject = incident_subject(&incident, outcome);
        let body = IncidentAlertTemplate::new(&incident, outcome).render()?;
        self.send_email(&subject, body, None).await
    }

    pub async fn send_daily_summary(&self) -> AlertResult<bool> {
        let stats = self.detector.get_incident_stats().await?;
        let recent = self.detector.get_incident_history(10).await?;
        let today = Utc::now().date_naive();

        let subject = daily_summary_subject(today);
        let body = DailySummaryTemplate::new(&stats, &recent, today).render()?;
        self.send_email(&subject, body, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::incidents::Thresholds;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, message: Message) -> AlertResult<()> {
            let subject = message
                .headers()
                .get_raw("Subject")
                .unwrap_or_default()
                .to_string();
            let to = message
                .envelope()
                .to()
                .iter()
                .map(|addr| addr.to_string())
                .collect();
            self.sent.lock().unwrap().push((subject, to));
            Ok(())
        }
    }

    fn settings() -> SmtpSettings {
        SmtpSettings {
            user: "guardian@example.com".to_string(),
            password: "secret".to_string(),
            alert_email: "oncall@example.com".to_string(),
            ..SmtpSettings::default()
        }
    }

    async fn detector() -> IncidentDetector {
        let db = Database::new_in_memory().await.unwrap();
        IncidentDetector::new(db, Thresholds::default())
    }

    #[tokio::test]
    async fn test_missing_credentials_skip_sending() {
        let mailer = Mailer::new(SmtpSettings::default(), detector().await).unwrap();
        assert!(!mailer.is_configured());

        let sent = mailer
            .send_email("hello", "<p>hi</p>".to_string(), None)
            .await
            .unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_incident_alert_subject_and_recipient() {
        let detector = detector().await;
        let incident = detector.check_metric("web-api", "cpu", 125.0).await.unwrap().unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let mailer = Mailer::with_transport(settings(), detector, transport.clone());

        let outcome = RecoveryOutcome::success(incident.id, "restart_service", "web-api");
        assert!(mailer
            .send_incident_alert(incident.id, Some(&outcome))
            .await
            .unwrap());

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "[RESOLVED] CRITICAL: web-api - High CPU");
        assert_eq!(sent[0].1, vec!["oncall@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_alert_for_missing_incident() {
        let transport = Arc::new(RecordingTransport::default());
        let mailer = Mailer::with_transport(settings(), detector().await, transport);

        let err = mailer.send_incident_alert(99, None).await.unwrap_err();
        assert!(matches!(err, AlertError::IncidentNotFound(99)));
    }

    #[tokio::test]
    async fn test_daily_summary_is_sent() {
        let transport = Arc::new(RecordingTransport::default());
        let mailer = Mailer::with_transport(settings(), detector().await, transport.clone());

        tokio_test::assert_ok!(mailer.send_daily_summary().await);

        let sent = transport.sent.lock().unwrap();
        assert!(sent[0].0.starts_with("ASF-Guardian Daily Summary - "));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_an_error() {
        let transport = Arc::new(RecordingTransport::default());
        let mailer = Mailer::with_transport(settings(), detector().await, transport);

        let result = mailer
            .send_email("subject", String::new(), Some("not an address"))
            .await;
        assert!(matches!(result, Err(AlertError::InvalidAddress(_))));
    }
}

use super::AlertResult;
use crate::config::SmtpSettings;
use async_trait::async_trait;
use lettre::{
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        client::{Tls, TlsParameters},
        PoolConfig,
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;

/// Something that can deliver a built message
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: Message) -> AlertResult<()>;
}

/// SMTP client using STARTTLS and username/password authentication
#[derive(Clone)]
pub struct SmtpClient {
    host: String,
    port: u16,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpClient {
    pub fn new(settings: &SmtpSettings) -> AlertResult<Self> {
        let tls_parameters = TlsParameters::builder(settings.host.clone())
            .dangerous_accept_invalid_certs(false)
            .dangerous_accept_invalid_hostnames(false)
            .build()?;

        let credentials = Credentials::new(settings.user.clone(), settings.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            .port(settings.port)
            .timeout(Some(Duration::from_secs(30)))
            .pool_config(PoolConfig::new().max_size(4))
            .tls(Tls::Required(tls_parameters))
            .credentials(credentials)
            .authentication(vec![Mechanism::Plain, Mechanism::Login])
            .build();

        Ok(Self {
            host: settings.host.clone(),
            port: settings.port,
            transport,
        })
    }

    /// Open a connection and issue NOOP
    pub async fn test_connection(&self) -> AlertResult<bool> {
        let ok = self.transport.test_connection().await?;
        tracing::info!(
            "SMTP connection test for {}:{}: {}",
            self.host,
            self.port,
            if ok { "ok" } else { "failed" }
        );
        Ok(ok)
    }
}

#[async_trait]
impl MailTransport for SmtpClient {
    async fn send(&self, message: Message) -> AlertResult<()> {
        match self.transport.send(message).await {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!("Failed to send email via {}: {}", self.host, e);
                Err(e.into())
            }
        }
    }
}

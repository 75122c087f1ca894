use super::{EmailMessage, EmailProvider, ProviderError, ProviderResponse};
use crate::config::{SmtpConfig, TransportSecurity};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Delivers each message over its own SMTP session.
///
/// The transport is built inside `send` and dropped before it returns, so the
/// socket and any TLS state are released on success and on every error path.
pub struct SmtpProvider {
    config: SmtpConfig,
}

impl SmtpProvider {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn credentials(&self) -> Result<Option<Credentials>, ProviderError> {
        match (&self.config.username, &self.config.password) {
            (Some(user), Some(password)) => Ok(Some(Credentials::new(
                user.clone(),
                password.expose_secret().clone(),
            ))),
            (Some(_), None) => Err(ProviderError::Configuration(
                "SMTP_PASSWORD is required when SMTP_USERNAME is set".to_string(),
            )),
            (None, Some(_)) => Err(ProviderError::Configuration(
                "SMTP_USERNAME is required when SMTP_PASSWORD is set".to_string(),
            )),
            (None, None) if self.config.require_auth => Err(ProviderError::Configuration(
                "SMTP authentication is required but no credentials are configured".to_string(),
            )),
            (None, None) => Ok(None),
        }
    }

    fn transport(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, ProviderError> {
        let host = self.config.host.as_str();

        let builder = match self.config.security() {
            TransportSecurity::ImplicitTls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| {
                    ProviderError::Configuration(format!("Failed to create SMTPS relay: {}", e))
                })?,
            TransportSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host).map_err(|e| {
                    ProviderError::Configuration(format!("Failed to create SMTP relay: {}", e))
                })?
            }
            TransportSecurity::Plaintext => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        };

        let builder = builder.port(self.config.port).timeout(self.config.timeout);

        let builder = match credentials {
            Some(creds) => builder.credentials(creds),
            None => builder,
        };

        Ok(builder.build())
    }
}

fn parse_address(kind: &str, value: &str) -> Result<Address, ProviderError> {
    value
        .parse::<Address>()
        .map_err(|e| ProviderError::Configuration(format!("Invalid {} address '{}': {}", kind, value, e)))
}

/// Turn an [`EmailMessage`] into a plain-text MIME message.
pub fn build_message(email: &EmailMessage) -> Result<Message, ProviderError> {
    let from = Mailbox::new(email.from_name.clone(), parse_address("sender", &email.from)?);

    let mut builder = Message::builder().from(from).subject(&email.subject);

    if email.to.is_empty() {
        return Err(ProviderError::Configuration(
            "Email must have at least one recipient".to_string(),
        ));
    }
    for recipient in &email.to {
        builder = builder.to(Mailbox::new(None, parse_address("recipient", recipient)?));
    }

    if let Some(reply_to) = &email.reply_to {
        builder = builder.reply_to(Mailbox::new(None, parse_address("reply-to", reply_to)?));
    }

    builder
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|e| ProviderError::Configuration(format!("Failed to build message: {}", e)))
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    async fn send(&self, email: &EmailMessage) -> Result<ProviderResponse, ProviderError> {
        let credentials = self.credentials()?;
        let message = build_message(email)?;
        let transport = self.transport(credentials)?;

        tracing::debug!(
            host = %self.config.host,
            port = self.config.port,
            security = %self.config.security(),
            "Opening SMTP session"
        );

        // lettre's own timeout only covers the TCP connect; bound the whole
        // exchange here. Dropping the future on expiry closes the socket.
        let exchange = transport.send(message);
        let outcome = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!("SMTP session timed out after {}s", limit.as_secs())),
            },
            None => exchange.await.map_err(|e| e.to_string()),
        };

        let response = outcome.map_err(|e| {
            tracing::error!(
                host = %self.config.host,
                port = self.config.port,
                error = %e,
                "SMTP exchange failed"
            );
            ProviderError::Delivery(format!("Failed to send email: {}", e))
        })?;

        let provider_id = response.message().next().map(|s| s.to_string());

        tracing::info!(
            to = ?email.to,
            subject = %email.subject,
            "Email sent successfully"
        );

        Ok(ProviderResponse::success(provider_id))
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// Mock email provider for testing and for running without an SMTP relay.
#[derive(Default)]
pub struct MockEmailProvider {
    fail: bool,
    send_count: AtomicU64,
    sent: Mutex<Vec<EmailMessage>>,
}

impl MockEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider whose every send fails with a delivery error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    async fn send(&self, email: &EmailMessage) -> Result<ProviderResponse, ProviderError> {
        if self.fail {
            return Err(ProviderError::Delivery(
                "mock provider configured to fail".to_string(),
            ));
        }

        let count = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }

        tracing::info!(
            to = ?email.to,
            subject = %email.subject,
            "[MOCK] Email would be sent"
        );

        Ok(ProviderResponse::success(Some(format!("mock-email-{}", count))))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

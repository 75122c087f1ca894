pub mod email;

use async_trait::async_trait;
use service_core::error::AppError;
use thiserror::Error;

pub use email::{MockEmailProvider, SmtpProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Detected before any network I/O: missing credentials, bad addresses.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Any failure of the SMTP exchange itself.
    #[error("Delivery error: {0}")]
    Delivery(String),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Configuration(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
            ProviderError::Delivery(msg) => AppError::EmailError(msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub provider_id: Option<String>,
}

impl ProviderResponse {
    pub fn success(provider_id: Option<String>) -> Self {
        Self { provider_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub from_name: Option<String>,
    pub to: Vec<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> Result<ProviderResponse, ProviderError>;

    /// Label used in logs and metrics.
    fn name(&self) -> &'static str;
}

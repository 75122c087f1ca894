pub mod metrics;
pub mod notifier;
pub mod providers;

pub use metrics::{get_metrics, init_metrics, record_notification, record_provider_call};
pub use notifier::RegistrationNotifier;
pub use providers::{
    EmailMessage, EmailProvider, MockEmailProvider, ProviderError, ProviderResponse, SmtpProvider,
};

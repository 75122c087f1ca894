use super::metrics::record_provider_call;
use super::providers::{EmailMessage, EmailProvider, ProviderError, ProviderResponse};
use crate::config::NotificationConfig;
use crate::models::Registration;
use chrono::{Local, NaiveDateTime};
use lettre::Address;
use std::sync::Arc;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Turns registrations into admin notifications and hands them to a provider.
pub struct RegistrationNotifier {
    from_email: String,
    from_name: String,
    admin_email: String,
    copy_registrant: bool,
    provider: Arc<dyn EmailProvider>,
}

impl RegistrationNotifier {
    pub fn new(config: &NotificationConfig, provider: Arc<dyn EmailProvider>) -> Self {
        Self {
            from_email: config.smtp.from_email.clone(),
            from_name: config.smtp.from_name.clone(),
            admin_email: config.notify.admin_email.clone(),
            copy_registrant: config.notify.copy_registrant,
            provider,
        }
    }

    pub fn compose(&self, registration: &Registration, registered_at: NaiveDateTime) -> EmailMessage {
        let subject = format!("Nuevo usuario registrado: {}", registration.name);
        let body = format!(
            "Se ha registrado un nuevo usuario en el sistema:\n\
             \n\
             Nombre: {}\n\
             Email: {}\n\
             Teléfono: {}\n\
             Fecha de registro: {}\n\
             \n\
             Este es un mensaje automático del sistema de notificaciones.\n",
            registration.name,
            registration.email,
            registration.phone,
            registered_at.format(TIMESTAMP_FORMAT),
        );

        let mut to = vec![self.admin_email.clone()];

        // The registrant address is unvalidated input; drop it rather than fail the send.
        let reply_to = match registration.email.trim().parse::<Address>() {
            Ok(address) => Some(address.to_string()),
            Err(e) => {
                tracing::warn!(
                    email = %registration.email,
                    error = %e,
                    "Registrant email is not a valid address, omitting Reply-To"
                );
                None
            }
        };

        if self.copy_registrant {
            if let Some(address) = &reply_to {
                if !to.contains(address) {
                    to.push(address.clone());
                }
            }
        }

        EmailMessage {
            from: self.from_email.clone(),
            from_name: Some(self.from_name.clone()),
            to,
            reply_to,
            subject,
            body,
        }
    }

    /// Build the notification for `registration` and deliver it once.
    pub async fn notify(&self, registration: &Registration) -> Result<ProviderResponse, ProviderError> {
        let message = self.compose(registration, Local::now().naive_local());
        let provider = self.provider.name();

        match self.provider.send(&message).await {
            Ok(response) => {
                record_provider_call(provider, "success");
                Ok(response)
            }
            Err(e) => {
                record_provider_call(provider, "failure");
                Err(e)
            }
        }
    }
}

use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;

use crate::models::Registration;
use crate::services::record_notification;
use crate::startup::AppState;
use service_core::error::AppError;

pub const SUCCESS_MESSAGE: &str = "Notificación enviada exitosamente";

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// `POST /notify`: relay a registration to the admin mailbox.
///
/// The raw body is parsed so that a missing or wrong content type is treated
/// like any other malformed payload.
#[tracing::instrument(skip(state, body))]
pub async fn notify(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<NotifyResponse>, AppError> {
    let registration = Registration::from_json(&body).map_err(|e| {
        record_notification("rejected");
        tracing::warn!(error = %e, "Rejected notification request");
        e
    })?;

    match state.notifier.notify(&registration).await {
        Ok(response) => {
            record_notification("sent");
            tracing::info!(
                name = %registration.name,
                email = %registration.email,
                provider_id = ?response.provider_id,
                "Notification sent for user"
            );
            Ok(Json(NotifyResponse {
                status: "success",
                message: SUCCESS_MESSAGE,
            }))
        }
        Err(e) => {
            record_notification("failed");
            tracing::error!(
                name = %registration.name,
                email = %registration.email,
                error = %e,
                "Failed to send notification"
            );
            Err(e.into())
        }
    }
}

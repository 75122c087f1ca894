use axum::{response::IntoResponse, Json};
use serde_json::json;

/// Liveness check. Never touches SMTP, so it reports healthy whatever the
/// mail configuration looks like.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "notification-service",
        "message": "Servicio de notificaciones operativo",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

//! Application startup and lifecycle management.

use crate::config::NotificationConfig;
use crate::handlers::{health_check, metrics_endpoint, notify};
use crate::services::{EmailProvider, MockEmailProvider, RegistrationNotifier, SmtpProvider};
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware, REQUEST_ID_HEADER};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub notifier: Arc<RegistrationNotifier>,
}

impl AppState {
    pub fn new(config: &NotificationConfig, provider: Arc<dyn EmailProvider>) -> Self {
        Self {
            notifier: Arc::new(RegistrationNotifier::new(config, provider)),
        }
    }
}

/// Pick the email provider the configuration asks for.
pub fn email_provider(config: &NotificationConfig) -> Arc<dyn EmailProvider> {
    if config.smtp.enabled {
        tracing::info!(
            host = %config.smtp.host,
            port = config.smtp.port,
            security = %config.smtp.security(),
            require_auth = config.smtp.require_auth,
            "SMTP email provider initialized"
        );
        Arc::new(SmtpProvider::new(config.smtp.clone()))
    } else {
        tracing::info!("SMTP provider disabled, using mock email provider");
        Arc::new(MockEmailProvider::new())
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/notify", post(notify))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the provider selected by `config`.
    pub async fn build(config: NotificationConfig) -> Result<Self, AppError> {
        let provider = email_provider(&config);
        Self::build_with_provider(config, provider).await
    }

    /// Build the application around an explicit email provider.
    pub async fn build_with_provider(
        config: NotificationConfig,
        provider: Arc<dyn EmailProvider>,
    ) -> Result<Self, AppError> {
        // Port 0 binds a random port for tests
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            admin_email = %config.notify.admin_email,
            copy_registrant = config.notify.copy_registrant,
            "Notification service: HTTP on port {}",
            port
        );

        Ok(Self {
            port,
            listener,
            state: AppState::new(&config, provider),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                tracing::error!("HTTP server error: {}", e);
                e
            })
    }
}

//! `ItrackServer`: Axum router, middleware and listener.

use std::future::Future;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use itrack_settings::ServerSettings;

use crate::handlers;
use crate::health::{self, HealthResponse};
use crate::state::AppState;

pub struct ItrackServer {
    config: ServerSettings,
    state: AppState,
}

impl ItrackServer {
    pub fn new(config: ServerSettings, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &ServerSettings {
        &self.config
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let internships = Router::new()
            .route("/register", post(handlers::register))
            .route("/view/all", get(handlers::list))
            .route("/check", get(handlers::check))
            .route("/student/{student_id}", get(handlers::list_for_student))
            .route("/approval/{id}", post(handlers::approve))
            .route("/send-back/{id}", post(handlers::send_back))
            .route("/reject/{id}", post(handlers::reject))
            .route("/resubmit/{id}", post(handlers::resubmit))
            .route("/completion-update/{id}", post(handlers::register_completion))
            .route("/approval-status/{id}", get(handlers::approval_status))
            .route("/download-file/{id}", get(handlers::download))
            .route(
                "/{id}",
                get(handlers::view)
                    .put(handlers::amend)
                    .delete(handlers::delete),
            );

        Router::new()
            .route("/health", get(health_handler))
            .nest("/api/v1/internships", internships)
            .with_state(self.state.clone())
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_millis(
                self.config.request_timeout_ms,
            )))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local = listener.local_addr()?;
        info!(%local, "itrack server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("itrack server stopped");
        Ok(())
    }
}

/// Resolves on ctrl-c.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time))
}

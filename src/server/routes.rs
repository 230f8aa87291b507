//! Router configuration for the API server.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Ingest and invoice snapshots
        .route("/api/invoices", post(handlers::ingest_invoice))
        .route("/api/invoices/:invoice_id", get(handlers::get_invoice))
        // Review workflow
        .route(
            "/api/invoices/:invoice_id/corrections",
            post(handlers::submit_corrections),
        )
        .route(
            "/api/invoices/:invoice_id/approve",
            post(handlers::approve_invoice),
        )
        // Job status and manual retry
        .route("/api/jobs/:job_id/status", get(handlers::job_status))
        .route("/api/jobs/:job_id/retry", post(handlers::retry_job))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

//! HTTP surface for the pipeline: status queries, corrections, approval,
//! and upload registration.

mod error;
mod handlers;
mod routes;

pub use error::ApiError;
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::extraction::{ExtractionClient, LlmExtractionClient};
use crate::ocr::{RemoteOcrClient, TextRecognizer};
use crate::pipeline::{EventBus, JobEvent, Orchestrator, Worker};
use crate::repository::Database;
use crate::services::{IngestService, ReviewService, StatusService};
use crate::storage::{FileStore, LocalFileStore};

/// Shared state for the API server.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub status: Arc<StatusService>,
    pub review: Arc<ReviewService>,
    pub intake: Arc<IngestService>,
    pub bus: EventBus,
}

impl AppState {
    pub fn new(db: Database, store: Arc<dyn FileStore>, bus: EventBus, max_retries: u32) -> Self {
        Self {
            status: Arc::new(StatusService::new(&db)),
            review: Arc::new(ReviewService::new(&db)),
            intake: Arc::new(IngestService::new(&db, store, bus.clone(), max_retries)),
            db,
            bus,
        }
    }
}

/// Start the API server together with the processing worker.
pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let db = Database::open(&settings.database_path)?;
    let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(
        &settings.data_dir,
        settings.pipeline.url_ttl_secs,
    ));
    let recognizer: Arc<dyn TextRecognizer> =
        Arc::new(RemoteOcrClient::new(settings.ocr.clone())?);
    let extractor: Arc<dyn ExtractionClient> =
        Arc::new(LlmExtractionClient::new(settings.llm.clone())?);

    let (bus, triggers) = EventBus::new();
    let orchestrator = Arc::new(Orchestrator::new(
        &db,
        store.clone(),
        recognizer,
        extractor,
        bus.clone(),
        settings.pipeline.confidence_threshold,
    ));
    let worker = Worker::new(orchestrator, &db, bus.clone(), triggers)
        .with_retry_delay(Duration::from_secs(settings.pipeline.retry_delay_secs));
    tokio::spawn(worker.run());

    // Operator-visible trail of terminal jobs; notification senders
    // subscribe to the same channel.
    let mut notifications = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = notifications.recv().await {
            match event {
                JobEvent::Completed {
                    job_id, invoice_id, ..
                } => {
                    tracing::info!(%job_id, %invoice_id, "ocr job completed");
                }
                JobEvent::Failed {
                    job_id,
                    invoice_id,
                    error,
                    will_retry,
                    ..
                } => {
                    tracing::warn!(%job_id, %invoice_id, %error, will_retry, "ocr job failed");
                }
            }
        }
    });

    let state = AppState::new(db, store, bus, settings.pipeline.max_retries);
    let app = create_router(state);

    let addr: SocketAddr =
        format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!("starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use tower::ServiceExt;

    async fn setup_test_app() -> (axum::Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        let store: Arc<dyn FileStore> =
            Arc::new(LocalFileStore::new(&dir.path().join("files"), 300));
        let (bus, _triggers) = EventBus::new();
        let state = AppState::new(db, store, bus, 3);
        (create_router(state), dir)
    }

    fn get(uri: &str, tenant: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(tenant) = tenant {
            builder = builder.header("X-Tenant-Id", tenant);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = setup_test_app().await;
        let response = app.oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_rejects_malformed_job_id() {
        let (app, _dir) = setup_test_app().await;
        let response = app
            .oneshot(get("/api/jobs/not-a-uuid/status", Some("tenant-1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_requires_tenant_header() {
        let (app, _dir) = setup_test_app().await;
        let uri = format!("/api/jobs/{}/status", uuid::Uuid::new_v4());
        let response = app.oneshot(get(&uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_unknown_job_is_not_found() {
        let (app, _dir) = setup_test_app().await;
        let uri = format!("/api/jobs/{}/status", uuid::Uuid::new_v4());
        let response = app.oneshot(get(&uri, Some("tenant-1"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ingest_then_queued_status() {
        let (app, _dir) = setup_test_app().await;

        let body = serde_json::json!({
            "filename": "scan.pdf",
            "content": BASE64.encode(b"%PDF-1.7 test"),
        });
        let request = Request::builder()
            .method("POST")
            .uri("/api/invoices")
            .header("X-Tenant-Id", "tenant-1")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let job_id = created["job_id"].as_str().unwrap().to_string();
        assert_eq!(created["status"], "uploaded");

        // No worker is running in this test, so the job stays queued.
        let uri = format!("/api/jobs/{job_id}/status");
        let response = app.oneshot(get(&uri, Some("tenant-1"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = body_json(response).await;
        assert_eq!(status["status"], "queued");
        assert_eq!(status["queue_position"], 1);
    }

    #[tokio::test]
    async fn test_job_invisible_to_foreign_tenant() {
        let (app, _dir) = setup_test_app().await;

        let body = serde_json::json!({
            "filename": "scan.pdf",
            "content": BASE64.encode(b"%PDF-1.7 test"),
        });
        let request = Request::builder()
            .method("POST")
            .uri("/api/invoices")
            .header("X-Tenant-Id", "tenant-1")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let created = body_json(response).await;
        let job_id = created["job_id"].as_str().unwrap().to_string();

        let uri = format!("/api/jobs/{job_id}/status");
        let response = app.oneshot(get(&uri, Some("tenant-2"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_corrections_on_unknown_invoice_not_found() {
        let (app, _dir) = setup_test_app().await;
        let body = serde_json::json!({
            "corrections": [
                { "field_name": "currency", "corrected_value": "EUR", "original_value": null }
            ]
        });
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/invoices/{}/corrections", uuid::Uuid::new_v4()))
            .header("X-Tenant-Id", "tenant-1")
            .header("X-Actor-Id", "user-1")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

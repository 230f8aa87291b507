//! One-shot ingest command: register a file and run the pipeline on it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;

use crate::config::Settings;
use crate::extraction::LlmExtractionClient;
use crate::ocr::RemoteOcrClient;
use crate::pipeline::{EventBus, Orchestrator};
use crate::services::{ClientOcr, IngestService};
use crate::storage::{FileStore, LocalFileStore};

pub async fn cmd_ingest(
    settings: &Settings,
    file: &Path,
    tenant: &str,
    ocr_text: Option<PathBuf>,
    ocr_confidence: u8,
) -> anyhow::Result<()> {
    let db = settings.database()?;
    let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(
        &settings.data_dir,
        settings.pipeline.url_ttl_secs,
    ));
    let (bus, mut triggers) = EventBus::new();
    let intake = IngestService::new(&db, store.clone(), bus.clone(), settings.pipeline.max_retries);

    let content = std::fs::read(file)?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.bin");
    let client_ocr = match ocr_text {
        Some(path) => Some(ClientOcr {
            text: std::fs::read_to_string(path)?,
            confidence: ocr_confidence,
        }),
        None => None,
    };

    let (invoice, job) = intake.register(tenant, filename, &content, client_ocr).await?;
    println!(
        "{} Registered invoice {} (job {})",
        style("→").cyan(),
        invoice.id,
        job.id
    );

    let recognizer = Arc::new(RemoteOcrClient::new(settings.ocr.clone())?);
    let extractor = Arc::new(LlmExtractionClient::new(settings.llm.clone())?);
    let orchestrator = Orchestrator::new(
        &db,
        store,
        recognizer,
        extractor,
        bus,
        settings.pipeline.confidence_threshold,
    );

    let event = triggers
        .recv()
        .await
        .ok_or_else(|| anyhow::anyhow!("trigger queue closed unexpectedly"))?;
    if let Err(e) = orchestrator.process(&event).await {
        eprintln!("  {} Processing failed: {}", style("✗").red(), e);
        return Err(e.into());
    }

    let processed = db.invoices().get(&invoice.id)?;
    println!(
        "  {} Status: {} (overall confidence {})",
        style("✓").green(),
        processed.status.as_str(),
        processed
            .overall_confidence
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    for error in &processed.validation_errors {
        println!("    {} {}", style("!").yellow(), error);
    }
    Ok(())
}

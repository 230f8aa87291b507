//! Background worker: consumes upload triggers and schedules retries.
//!
//! Steps inside one job are strictly sequential, and so is the worker
//! itself: one trigger is processed to a terminal state before the next is
//! picked up. Retry scheduling is the worker's job, never the
//! orchestrator's.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::{EventBus, InvoiceUploaded, Orchestrator};
use crate::models::InvoiceStatus;
use crate::repository::{Database, InvoiceRepository, JobRepository};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Event-driven processing runtime around the orchestrator.
pub struct Worker {
    orchestrator: Arc<Orchestrator>,
    jobs: JobRepository,
    invoices: InvoiceRepository,
    bus: EventBus,
    triggers: mpsc::UnboundedReceiver<InvoiceUploaded>,
    retry_delay: Duration,
}

impl Worker {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        db: &Database,
        bus: EventBus,
        triggers: mpsc::UnboundedReceiver<InvoiceUploaded>,
    ) -> Self {
        Self {
            orchestrator,
            jobs: db.jobs(),
            invoices: db.invoices(),
            bus,
            triggers,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Shorten the delay between attempts (tests).
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Run until the trigger channel closes.
    pub async fn run(mut self) {
        info!("processing worker started");
        while let Some(event) = self.triggers.recv().await {
            self.handle(event).await;
        }
        info!("trigger channel closed; processing worker stopping");
    }

    async fn handle(&self, event: InvoiceUploaded) {
        let err = match self.orchestrator.process(&event).await {
            Ok(()) => return,
            Err(e) => e,
        };

        if !err.is_retriable() {
            // Bad state, duplicate, or missing record: retrying cannot
            // change the outcome, so no retry budget is spent.
            warn!(job_id = %event.job_id, error = %err, "job failed terminally");
            return;
        }

        match self.jobs.get(&event.job_id) {
            Ok(job) if job.will_retry() => {
                warn!(
                    job_id = %event.job_id,
                    attempt = job.retry_count + 1,
                    max_retries = job.max_retries,
                    error = %err,
                    "job failed; scheduling retry"
                );
                if let Err(e) = self.jobs.prepare_retry(&job.id) {
                    error!(job_id = %event.job_id, error = %e, "could not requeue job");
                    return;
                }
                let bus = self.bus.clone();
                let delay = self.retry_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    bus.trigger(event);
                });
            }
            Ok(_) => {
                warn!(
                    job_id = %event.job_id,
                    error = %err,
                    "retry budget exhausted; invoice marked failed"
                );
                if let Err(e) = self
                    .invoices
                    .set_status(&event.invoice_id, InvoiceStatus::Failed)
                {
                    error!(invoice_id = %event.invoice_id, error = %e, "could not mark invoice failed");
                }
            }
            Err(e) => {
                error!(job_id = %event.job_id, error = %e, "could not reload job after failure");
            }
        }
    }
}

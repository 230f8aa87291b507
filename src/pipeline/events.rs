//! Event bus connecting upload triggers, the worker, and downstream consumers.

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Trigger carried by an "invoice uploaded" event.
#[derive(Debug, Clone)]
pub struct InvoiceUploaded {
    pub invoice_id: String,
    pub tenant_id: String,
    pub file_ref: String,
    pub job_id: String,
}

/// Terminal job notifications for downstream consumers (status pollers,
/// notification senders).
#[derive(Debug, Clone)]
pub enum JobEvent {
    Completed {
        job_id: String,
        invoice_id: String,
        tenant_id: String,
    },
    Failed {
        job_id: String,
        invoice_id: String,
        tenant_id: String,
        error: String,
        will_retry: bool,
    },
}

const NOTIFICATION_CAPACITY: usize = 256;

/// In-process event bus: an unbounded trigger queue feeding the worker and
/// a broadcast channel for terminal notifications.
#[derive(Clone)]
pub struct EventBus {
    triggers: mpsc::UnboundedSender<InvoiceUploaded>,
    notifications: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create the bus together with the worker's end of the trigger queue.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InvoiceUploaded>) {
        let (triggers, rx) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        (
            Self {
                triggers,
                notifications,
            },
            rx,
        )
    }

    /// Queue an invoice for processing.
    pub fn trigger(&self, event: InvoiceUploaded) {
        debug!(invoice_id = %event.invoice_id, job_id = %event.job_id, "queueing processing trigger");
        if self.triggers.send(event).is_err() {
            warn!("processing worker is gone; trigger dropped");
        }
    }

    /// Publish a terminal job notification. Lossy when nobody listens.
    pub fn notify(&self, event: JobEvent) {
        let _ = self.notifications.send(event);
    }

    /// Subscribe to terminal job notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.notifications.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_reaches_worker_end() {
        let (bus, mut rx) = EventBus::new();
        bus.trigger(InvoiceUploaded {
            invoice_id: "inv".into(),
            tenant_id: "t".into(),
            file_ref: "f".into(),
            job_id: "j".into(),
        });
        let received = rx.recv().await.unwrap();
        assert_eq!(received.invoice_id, "inv");
    }

    #[tokio::test]
    async fn test_notifications_reach_subscribers() {
        let (bus, _rx) = EventBus::new();
        let mut sub = bus.subscribe();
        bus.notify(JobEvent::Completed {
            job_id: "j".into(),
            invoice_id: "inv".into(),
            tenant_id: "t".into(),
        });
        match sub.recv().await.unwrap() {
            JobEvent::Completed { job_id, .. } => assert_eq!(job_id, "j"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

//! Audit trail delivery.
//!
//! Mutations hand an [`AuditEvent`] to the [`AuditNotifier`] after their
//! transaction commits. The notifier never blocks: events go onto a bounded
//! queue drained by [`process_audit_events`], which retries the sink with
//! backoff and logs to the `audit_dead_letter` target once retries run out.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::middleware_helpers::retry::{with_retry, AlwaysRetry, RetryConfig};

pub mod sink;

pub use sink::{AuditSink, AuditSinkError, DbAuditSink};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    CreateProduct,
    AddStockMovement,
    UpdateStock,
    DeleteMovement,
    CreateStore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub user_id: i32,
    pub store_id: Option<i32>,
    pub action: AuditAction,
    pub details: String,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        user_id: i32,
        store_id: Option<i32>,
        action: AuditAction,
        details: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            store_id,
            action,
            details: details.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Cheap, cloneable handle services use to emit audit events.
#[derive(Debug, Clone)]
pub struct AuditNotifier {
    sender: mpsc::Sender<AuditEvent>,
}

impl AuditNotifier {
    pub fn new(sender: mpsc::Sender<AuditEvent>) -> Self {
        Self { sender }
    }

    /// Builds a notifier together with the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Queues an event without waiting. A full or closed queue drops the
    /// event with a warning; the caller's operation is never affected.
    pub fn emit(&self, event: AuditEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {
                counter!("stockflow_audit.queued", 1);
            }
            Err(TrySendError::Full(event)) => {
                counter!("stockflow_audit.dropped", 1, "reason" => "full");
                warn!(
                    action = %event.action,
                    user_id = event.user_id,
                    "Audit queue full, dropping event"
                );
            }
            Err(TrySendError::Closed(event)) => {
                counter!("stockflow_audit.dropped", 1, "reason" => "closed");
                warn!(
                    action = %event.action,
                    user_id = event.user_id,
                    "Audit queue closed, dropping event"
                );
            }
        }
    }
}

/// Drains the audit queue until every sender is dropped.
pub async fn process_audit_events(
    mut rx: mpsc::Receiver<AuditEvent>,
    sink: Arc<dyn AuditSink>,
    retry: RetryConfig,
) {
    info!("Starting audit event processing loop");

    while let Some(event) = rx.recv().await {
        debug!(action = %event.action, "Delivering audit event");

        let delivered =
            with_retry(&retry, AlwaysRetry, || async { sink.append(&event).await }).await;

        match delivered {
            Ok(()) => {
                counter!("stockflow_audit.delivered", 1);
            }
            Err(e) => {
                counter!("stockflow_audit.dead_letter", 1);
                error!(
                    target: "audit_dead_letter",
                    action = %event.action,
                    user_id = event.user_id,
                    store_id = ?event.store_id,
                    details = %event.details,
                    occurred_at = %event.occurred_at,
                    error = %e,
                    "Audit event could not be delivered"
                );
            }
        }
    }

    info!("Audit event processing loop stopped");
}

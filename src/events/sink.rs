use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};
use std::sync::Arc;

use super::AuditEvent;
use crate::entities::audit_log;

#[derive(Debug, thiserror::Error)]
pub enum AuditSinkError {
    #[error("audit store write failed: {0}")]
    Store(#[from] DbErr),
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for audit events. Implementations append only.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditSinkError>;
}

/// Writes audit events to the `audit_logs` table.
#[derive(Clone)]
pub struct DbAuditSink {
    db: Arc<DatabaseConnection>,
}

impl DbAuditSink {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for DbAuditSink {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        let row = audit_log::ActiveModel {
            user_id: Set(event.user_id),
            store_id: Set(event.store_id),
            action: Set(event.action.to_string()),
            details: Set(event.details.clone()),
            created_at: Set(event.occurred_at),
            ..Default::default()
        };
        row.insert(self.db.as_ref()).await?;
        Ok(())
    }
}

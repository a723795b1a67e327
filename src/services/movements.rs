use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::ledger::{
    check_delete, check_record, check_update, compute_stock, lock_stock_scope,
    reserve_store_writes, MovementType,
};
use super::StoreScope;
use crate::{
    entities::{product, stock_movement},
    errors::ServiceError,
    events::{AuditAction, AuditEvent, AuditNotifier},
};

#[derive(Debug, Clone)]
pub struct RecordMovement {
    pub product_id: i32,
    pub kind: MovementType,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub product_id: Option<i32>,
}

/// Result of a successful ledger mutation together with the stock it left.
#[derive(Debug, Clone)]
pub struct MovementOutcome {
    pub movement: stock_movement::Model,
    pub stock_after: i64,
}

/// Owns every write to the movement ledger.
///
/// Each mutation runs in a single transaction that first takes the
/// `(store, product)` scope lock, then derives stock on the same connection,
/// validates the change and writes. Audit events go out only after commit.
#[derive(Clone)]
pub struct MovementService {
    db: Arc<DatabaseConnection>,
    audit: AuditNotifier,
}

impl MovementService {
    pub fn new(db: Arc<DatabaseConnection>, audit: AuditNotifier) -> Self {
        Self { db, audit }
    }

    #[instrument(skip(self), fields(store_id = scope.store_id))]
    pub async fn record_movement(
        &self,
        scope: StoreScope,
        input: RecordMovement,
    ) -> Result<MovementOutcome, ServiceError> {
        ensure_positive(input.quantity)?;
        let started = Instant::now();
        let store_id = scope.store_id;
        let kind = input.kind.clone();

        let result = self
            .db
            .transaction::<_, MovementOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    lock_stock_scope(txn, store_id, input.product_id).await?;
                    ensure_product_exists(txn, input.product_id).await?;

                    let current = compute_stock(txn, store_id, input.product_id).await?;
                    let stock_after = check_record(current, &input.kind, input.quantity)?;

                    let movement = stock_movement::ActiveModel {
                        store_id: Set(store_id),
                        product_id: Set(input.product_id),
                        movement_type: Set(input.kind.to_string()),
                        quantity: Set(input.quantity),
                        recorded_at: Set(Utc::now()),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                    Ok(MovementOutcome {
                        movement,
                        stock_after,
                    })
                })
            })
            .await
            .map_err(ServiceError::from);

        histogram!(
            "stockflow_movements.record.duration",
            started.elapsed().as_secs_f64()
        );
        let outcome = observe("record", result)?;

        info!(
            movement_id = outcome.movement.id,
            product_id = outcome.movement.product_id,
            movement_type = %kind,
            stock_after = outcome.stock_after,
            "Stock movement recorded"
        );
        self.audit.emit(AuditEvent::new(
            scope.user_id,
            Some(store_id),
            AuditAction::AddStockMovement,
            format!(
                "Product ID: {}, Type: {}, Qty: {}, Movement ID: {}",
                outcome.movement.product_id, kind, outcome.movement.quantity, outcome.movement.id
            ),
        ));

        Ok(outcome)
    }

    /// Changes a movement's quantity. The new quantity is validated against
    /// current stock the same way a fresh movement would be.
    #[instrument(skip(self), fields(store_id = scope.store_id))]
    pub async fn update_movement_quantity(
        &self,
        scope: StoreScope,
        movement_id: i32,
        new_quantity: i32,
    ) -> Result<MovementOutcome, ServiceError> {
        ensure_positive(new_quantity)?;
        let store_id = scope.store_id;

        let result = self
            .db
            .transaction::<_, MovementOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let movement = find_scoped_locked(txn, store_id, movement_id).await?;

                    let current = compute_stock(txn, store_id, movement.product_id).await?;
                    let stock_after =
                        check_update(current, &movement.kind(), movement.quantity, new_quantity)?;

                    let mut active: stock_movement::ActiveModel = movement.into();
                    active.quantity = Set(new_quantity);
                    let movement = active.update(txn).await.map_err(ServiceError::db_error)?;

                    Ok(MovementOutcome {
                        movement,
                        stock_after,
                    })
                })
            })
            .await
            .map_err(ServiceError::from);

        let outcome = observe("update", result)?;

        info!(
            movement_id,
            new_quantity,
            stock_after = outcome.stock_after,
            "Stock movement updated"
        );
        self.audit.emit(AuditEvent::new(
            scope.user_id,
            Some(store_id),
            AuditAction::UpdateStock,
            format!(
                "Updated movement ID: {}, New Quantity: {}",
                movement_id, new_quantity
            ),
        ));

        Ok(outcome)
    }

    /// Removes a movement unless doing so would leave derived stock negative.
    #[instrument(skip(self), fields(store_id = scope.store_id))]
    pub async fn delete_movement(
        &self,
        scope: StoreScope,
        movement_id: i32,
    ) -> Result<MovementOutcome, ServiceError> {
        let store_id = scope.store_id;

        let result = self
            .db
            .transaction::<_, MovementOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let movement = find_scoped_locked(txn, store_id, movement_id).await?;

                    let current = compute_stock(txn, store_id, movement.product_id).await?;
                    let stock_after = check_delete(current, &movement.kind(), movement.quantity)?;

                    stock_movement::Entity::delete_by_id(movement.id)
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    Ok(MovementOutcome {
                        movement,
                        stock_after,
                    })
                })
            })
            .await
            .map_err(ServiceError::from);

        let outcome = observe("delete", result)?;

        info!(
            movement_id,
            stock_after = outcome.stock_after,
            "Stock movement deleted"
        );
        self.audit.emit(AuditEvent::new(
            scope.user_id,
            Some(store_id),
            AuditAction::DeleteMovement,
            format!(
                "Deleted movement ID: {}, Quantity before deletion: {}",
                movement_id, outcome.movement.quantity
            ),
        ));

        Ok(outcome)
    }

    /// Movements of one store, newest first.
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        store_id: i32,
        filter: MovementFilter,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let mut query = stock_movement::Entity::find()
            .filter(stock_movement::Column::StoreId.eq(store_id));

        if let Some(start) = filter.start {
            query = query.filter(stock_movement::Column::RecordedAt.gte(start));
        }
        if let Some(end) = filter.end {
            query = query.filter(stock_movement::Column::RecordedAt.lte(end));
        }
        if let Some(product_id) = filter.product_id {
            query = query.filter(stock_movement::Column::ProductId.eq(product_id));
        }

        let movements = query
            .order_by_desc(stock_movement::Column::RecordedAt)
            .order_by_desc(stock_movement::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        debug!(count = movements.len(), "Listed stock movements");
        Ok(movements)
    }

    /// Derived stock for one product in one store.
    pub async fn current_stock(&self, store_id: i32, product_id: i32) -> Result<i64, ServiceError> {
        compute_stock(self.db.as_ref(), store_id, product_id).await
    }
}

fn ensure_positive(quantity: i32) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "quantity must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

async fn ensure_product_exists(txn: &DatabaseTransaction, product_id: i32) -> Result<(), ServiceError> {
    product::Entity::find_by_id(product_id)
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .map(|_| ())
        .ok_or_else(|| ServiceError::ValidationError(format!("Product {} does not exist", product_id)))
}

async fn find_scoped(
    txn: &DatabaseTransaction,
    store_id: i32,
    movement_id: i32,
) -> Result<stock_movement::Model, ServiceError> {
    stock_movement::Entity::find_by_id(movement_id)
        .filter(stock_movement::Column::StoreId.eq(store_id))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound("Stock movement not found".to_string()))
}

/// Looks the movement up within the caller's store, locks its scope and
/// reads it again so a concurrent writer cannot slip in between.
async fn find_scoped_locked(
    txn: &DatabaseTransaction,
    store_id: i32,
    movement_id: i32,
) -> Result<stock_movement::Model, ServiceError> {
    reserve_store_writes(txn, store_id).await?;
    let movement = find_scoped(txn, store_id, movement_id).await?;
    lock_stock_scope(txn, store_id, movement.product_id).await?;
    find_scoped(txn, store_id, movement_id).await
}

fn observe<T>(operation: &'static str, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
    match &result {
        Ok(_) => {
            counter!("stockflow_movements.ok", 1, "operation" => operation);
        }
        Err(ServiceError::InsufficientStock(msg)) | Err(ServiceError::InvariantViolation(msg)) => {
            counter!("stockflow_movements.rejected", 1, "operation" => operation);
            warn!(operation, reason = %msg, "Ledger change rejected");
        }
        Err(_) => {
            counter!("stockflow_movements.error", 1, "operation" => operation);
        }
    }
    result
}

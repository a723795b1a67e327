//! Stock aggregation over the movement ledger.
//!
//! Derived stock for a `(store, product)` pair is the sum of `stock_in`
//! quantities minus the sum of every other movement type. Nothing here
//! stores that number; it is recomputed inside the same transaction that is
//! about to write.

use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, QueryFilter,
    QuerySelect, Statement,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

use crate::entities::stock_movement;
use crate::errors::ServiceError;

pub(crate) const SIGNED_QUANTITY_SQL: &str =
    "COALESCE(SUM(CASE WHEN stock_movements.movement_type = 'stock_in' \
     THEN stock_movements.quantity ELSE -stock_movements.quantity END), 0)";

/// Movement kinds. Matching is exact and case-sensitive; anything that is
/// not `stock_in` removes stock.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MovementType {
    StockIn,
    Sale,
    ManualRemoval,
    Other(String),
}

impl MovementType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stock_in" => Self::StockIn,
            "sale" => Self::Sale,
            "manual_removal" => Self::ManualRemoval,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::StockIn => "stock_in",
            Self::Sale => "sale",
            Self::ManualRemoval => "manual_removal",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_egress(&self) -> bool {
        !matches!(self, Self::StockIn)
    }

    /// Contribution of `quantity` units of this kind to derived stock.
    pub fn signed(&self, quantity: i32) -> i64 {
        let quantity = i64::from(quantity);
        if self.is_egress() {
            -quantity
        } else {
            quantity
        }
    }
}

impl From<String> for MovementType {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<MovementType> for String {
    fn from(kind: MovementType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory fold with the same semantics as the SQL aggregate.
pub fn derive_stock<'a, I>(movements: I) -> i64
where
    I: IntoIterator<Item = (&'a MovementType, i32)>,
{
    movements
        .into_iter()
        .map(|(kind, quantity)| kind.signed(quantity))
        .sum()
}

/// Stock after recording a new movement, or `InsufficientStock`.
pub fn check_record(current: i64, kind: &MovementType, quantity: i32) -> Result<i64, ServiceError> {
    if kind.is_egress() && current < i64::from(quantity) {
        return Err(ServiceError::InsufficientStock(format!(
            "requested {}, available {}",
            quantity, current
        )));
    }
    Ok(current + kind.signed(quantity))
}

/// Stock after changing a movement's quantity in place.
pub fn check_update(
    current: i64,
    kind: &MovementType,
    old_quantity: i32,
    new_quantity: i32,
) -> Result<i64, ServiceError> {
    let next = current - kind.signed(old_quantity) + kind.signed(new_quantity);
    if next < 0 {
        return Err(ServiceError::InvariantViolation(format!(
            "Cannot update - would cause negative stock ({})",
            next
        )));
    }
    Ok(next)
}

/// Stock after removing a movement from the ledger.
pub fn check_delete(current: i64, kind: &MovementType, quantity: i32) -> Result<i64, ServiceError> {
    let next = current - kind.signed(quantity);
    if next < 0 {
        return Err(ServiceError::InvariantViolation(format!(
            "Cannot delete - would cause negative stock ({})",
            next
        )));
    }
    Ok(next)
}

/// Current derived stock for `(store_id, product_id)`. No rows yields 0.
#[instrument(skip(conn))]
pub async fn compute_stock<C>(conn: &C, store_id: i32, product_id: i32) -> Result<i64, ServiceError>
where
    C: ConnectionTrait,
{
    let stock = stock_movement::Entity::find()
        .select_only()
        .column_as(Expr::cust(SIGNED_QUANTITY_SQL), "stock")
        .filter(stock_movement::Column::StoreId.eq(store_id))
        .filter(stock_movement::Column::ProductId.eq(product_id))
        .into_tuple::<i64>()
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .unwrap_or(0);

    debug!(store_id, product_id, stock, "computed derived stock");
    Ok(stock)
}

/// Serializes writers on one `(store, product)` scope until the surrounding
/// transaction ends. Must be the first statement of the transaction.
#[instrument(skip(conn))]
pub async fn lock_stock_scope<C>(conn: &C, store_id: i32, product_id: i32) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let backend = conn.get_database_backend();
    let stmt = match backend {
        DbBackend::Postgres => Statement::from_sql_and_values(
            backend,
            "SELECT pg_advisory_xact_lock($1, $2)",
            [store_id.into(), product_id.into()],
        ),
        DbBackend::Sqlite => return reserve_store_writes(conn, store_id).await,
        DbBackend::MySql => Statement::from_sql_and_values(
            backend,
            "SELECT id FROM products WHERE id = ? FOR UPDATE",
            [product_id.into()],
        ),
    };

    conn.execute(stmt).await.map_err(ServiceError::db_error)?;
    Ok(())
}

/// Takes SQLite's single write lock before the transaction reads anything,
/// so a deferred read-to-write upgrade can never fail with SQLITE_BUSY.
/// Other backends lock per product in [`lock_stock_scope`] and skip this.
#[instrument(skip(conn))]
pub async fn reserve_store_writes<C>(conn: &C, store_id: i32) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let backend = conn.get_database_backend();
    if backend != DbBackend::Sqlite {
        return Ok(());
    }

    conn.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE stores SET id = id WHERE id = ?",
        [store_id.into()],
    ))
    .await
    .map_err(ServiceError::db_error)?;
    Ok(())
}

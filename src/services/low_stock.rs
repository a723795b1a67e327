use metrics::counter;
use sea_orm::{
    sea_query::{Expr, IntoCondition},
    DatabaseConnection, EntityTrait, FromQueryResult, JoinType, QueryOrder, QuerySelect,
    RelationTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

use super::ledger::SIGNED_QUANTITY_SQL;
use crate::{
    cache::CacheBackend,
    entities::{product, stock_movement},
    errors::ServiceError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromQueryResult, ToSchema)]
pub struct LowStockItem {
    pub product_id: i32,
    pub name: String,
    pub stock: i64,
}

pub fn cache_key(store_id: i32, threshold: i64) -> String {
    format!("low_stock:{}:{}", store_id, threshold)
}

/// Products of the global catalog whose derived stock in one store is below
/// a threshold. Results are cached per `(store, threshold)` and are never
/// invalidated on write, only by expiry.
#[derive(Clone)]
pub struct LowStockService {
    db: Arc<DatabaseConnection>,
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl LowStockService {
    pub fn new(db: Arc<DatabaseConnection>, cache: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { db, cache, ttl }
    }

    #[instrument(skip(self))]
    pub async fn get_low_stock(
        &self,
        store_id: i32,
        threshold: i64,
    ) -> Result<Vec<LowStockItem>, ServiceError> {
        let key = cache_key(store_id, threshold);

        match self.cache.get(&key).await {
            Ok(Some(payload)) => match serde_json::from_str::<Vec<LowStockItem>>(&payload) {
                Ok(items) => {
                    counter!("stockflow_low_stock.cache_hit", 1);
                    debug!(%key, "Low-stock cache hit");
                    return Ok(items);
                }
                Err(e) => warn!(%key, error = %e, "Discarding unreadable low-stock cache entry"),
            },
            Ok(None) => {}
            Err(e) => {
                counter!("stockflow_low_stock.cache_error", 1);
                warn!(%key, error = %e, "Low-stock cache read failed, computing directly");
            }
        }

        counter!("stockflow_low_stock.cache_miss", 1);
        let items = self.compute_low_stock(store_id, threshold).await?;

        match serde_json::to_string(&items) {
            Ok(payload) => {
                if let Err(e) = self.cache.set(&key, &payload, Some(self.ttl)).await {
                    counter!("stockflow_low_stock.cache_error", 1);
                    warn!(%key, error = %e, "Failed to store low-stock report in cache");
                }
            }
            Err(e) => warn!(%key, error = %e, "Failed to serialize low-stock report"),
        }

        Ok(items)
    }

    /// Aggregates straight from the ledger. Products with no movements in the
    /// store count as stock 0.
    #[instrument(skip(self))]
    pub async fn compute_low_stock(
        &self,
        store_id: i32,
        threshold: i64,
    ) -> Result<Vec<LowStockItem>, ServiceError> {
        let rows = product::Entity::find()
            .select_only()
            .column_as(product::Column::Id, "product_id")
            .column_as(product::Column::Name, "name")
            .column_as(Expr::cust(SIGNED_QUANTITY_SQL), "stock")
            .join(
                JoinType::LeftJoin,
                product::Relation::StockMovement
                    .def()
                    .on_condition(move |_left, right| {
                        Expr::col((right, stock_movement::Column::StoreId))
                            .eq(store_id)
                            .into_condition()
                    }),
            )
            .group_by(product::Column::Id)
            .group_by(product::Column::Name)
            .order_by_asc(product::Column::Id)
            .into_model::<LowStockItem>()
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        Ok(rows
            .into_iter()
            .filter(|item| item.stock < threshold)
            .collect())
    }
}

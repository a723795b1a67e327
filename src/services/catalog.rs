use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use std::sync::Arc;
use tracing::{info, instrument};

use super::Actor;
use crate::{
    entities::{product, store},
    errors::ServiceError,
    events::{AuditAction, AuditEvent, AuditNotifier},
};

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewStore {
    pub name: String,
    pub location: Option<String>,
}

/// Global product catalog and store registry.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    audit: AuditNotifier,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, audit: AuditNotifier) -> Self {
        Self { db, audit }
    }

    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        actor: Actor,
        input: NewProduct,
    ) -> Result<product::Model, ServiceError> {
        let name = required_name(&input.name, "Product")?;
        if input.price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "price must be greater than zero".to_string(),
            ));
        }

        let product = product::ActiveModel {
            name: Set(name),
            description: Set(input.description),
            price: Set(input.price),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(ServiceError::db_error)?;

        info!(product_id = product.id, "Product created");
        self.audit.emit(AuditEvent::new(
            actor.user_id,
            actor.store_id,
            AuditAction::CreateProduct,
            format!(
                "Created product: Name = {}, Price = {}",
                product.name, product.price
            ),
        ));

        Ok(product)
    }

    pub async fn list_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        product::Entity::find()
            .order_by_asc(product::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn create_store(
        &self,
        actor: Actor,
        input: NewStore,
    ) -> Result<store::Model, ServiceError> {
        let name = required_name(&input.name, "Store")?;

        let store = store::ActiveModel {
            name: Set(name),
            location: Set(input.location),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(ServiceError::db_error)?;

        info!(store_id = store.id, "Store created");
        self.audit.emit(AuditEvent::new(
            actor.user_id,
            actor.store_id,
            AuditAction::CreateStore,
            format!(
                "Created store: Name = {}, Location = {}",
                store.name,
                store.location.as_deref().unwrap_or("N/A")
            ),
        ));

        Ok(store)
    }

    pub async fn list_stores(&self) -> Result<Vec<store::Model>, ServiceError> {
        store::Entity::find()
            .order_by_asc(store::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn get_store(&self, id: i32) -> Result<store::Model, ServiceError> {
        store::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound("Store not found".to_string()))
    }
}

fn required_name(raw: &str, what: &str) -> Result<String, ServiceError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ServiceError::ValidationError(format!(
            "{} name is required",
            what
        )));
    }
    Ok(name.to_string())
}

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stockflow API",
        version = "0.1.0",
        description = r#"
# Stockflow Inventory API

Tracks stock across stores from a ledger of movements. Stock levels are never
stored; every read sums the movement ledger of one store.

## Authentication

Register with `POST /auth/register`, then exchange credentials for a token with
`POST /auth/login`. Send the token on every `/api/v1` request:

```
Authorization: Bearer <your-jwt-token>
```

The store bound to the token scopes every movement and low-stock request.

## Consistency

Writes that would make a product's stock negative in a store are rejected with
`400`. The low-stock report is cached per store and threshold for a few
minutes and may lag behind recent movements.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    tags(
        (name = "auth", description = "Registration and login"),
        (name = "movements", description = "Stock movement ledger"),
        (name = "products", description = "Product catalog and low-stock report"),
        (name = "stores", description = "Store registry")
    ),
    paths(
        crate::auth::register_handler,
        crate::auth::login_handler,
        crate::handlers::movements::list_movements,
        crate::handlers::movements::record_movement,
        crate::handlers::movements::update_movement,
        crate::handlers::movements::delete_movement,
        crate::handlers::products::list_products,
        crate::handlers::products::create_product,
        crate::handlers::products::get_low_stock,
        crate::handlers::stores::create_store,
        crate::handlers::stores::list_stores,
        crate::handlers::stores::get_store,
    ),
    components(
        schemas(
            crate::auth::RegisterRequest,
            crate::auth::LoginRequest,
            crate::auth::TokenResponse,
            crate::handlers::movements::RecordMovementRequest,
            crate::handlers::movements::UpdateMovementRequest,
            crate::handlers::movements::MovementResponse,
            crate::handlers::movements::MovementChangeResponse,
            crate::handlers::products::CreateProductRequest,
            crate::handlers::stores::CreateStoreRequest,
            crate::services::low_stock::LowStockItem,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_ledger_routes() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Stockflow API"));
        assert!(json.contains("/api/v1/movements/{id}"));
        assert!(json.contains("/api/v1/products/low-stock"));
        assert!(json.contains("bearer_auth"));
    }
}

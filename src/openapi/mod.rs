use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Food Order API",
        version = "0.1.0",
        description = r#"
# Food Order API

Carts, order placement with hosted checkout sessions, and payment verification.

## Authentication

Customer and admin endpoints take a JWT issued by `/api/user/login`:

```
Authorization: Bearer <your-jwt-token>
```

The storefront's legacy `token: <jwt>` header is accepted as well.

## Error Handling

Failures share one envelope:

```json
{
  "success": false,
  "message": "Order not found",
  "request_id": "6f1c..."
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:4000", description = "Local development")
    ),
    tags(
        (name = "Orders", description = "Order placement, verification and administration"),
        (name = "Cart", description = "Per-user cart"),
        (name = "Users", description = "Registration and login")
    ),
    paths(
        // Orders
        crate::handlers::orders::place_order,
        crate::handlers::orders::verify_order,
        crate::handlers::orders::user_orders,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::update_status,
        crate::handlers::orders::stripe_webhook,

        // Cart
        crate::handlers::cart::add_to_cart,
        crate::handlers::cart::remove_from_cart,
        crate::handlers::cart::get_cart,

        // Users
        crate::handlers::users::register,
        crate::handlers::users::login,
    ),
    components(
        schemas(
            crate::MessageResponse,
            crate::ResponseMeta,
            crate::entities::order::OrderLine,
            crate::services::orders::PlaceOrderRequest,
            crate::services::orders::PlaceOrderResponse,
            crate::services::orders::UpdateOrderStatusRequest,
            crate::services::orders::OrderResponse,
            crate::services::payments::VerifyPaymentRequest,
            crate::services::cart::CartItemRequest,
            crate::services::users::RegisterRequest,
            crate::services::users::LoginRequest,
            crate::services::users::AuthResponse,
            crate::services::users::UserSummary,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
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
        .url(OPENAPI_JSON_PATH, ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from(OPENAPI_JSON_PATH).try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_order_routes_and_bearer_scheme() {
        let openapi = ApiDoc::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Food Order API"));
        assert!(json.contains("/api/order/place"));
        assert!(json.contains("/api/order/verify"));
        assert!(json.contains("/api/cart/add"));
        assert!(json.contains("\"Bearer\""));
    }
}

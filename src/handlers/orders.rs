use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    auth::{AdminUser, AuthUser},
    errors::ServiceError,
    services::{
        orders::{OrderResponse, PlaceOrderRequest, PlaceOrderResponse, UpdateOrderStatusRequest},
        payments::{PaymentService, VerifyPaymentRequest, WebhookOutcome},
    },
    ApiResponse, ApiResult, AppState,
};

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// Place an order and open a checkout session
#[utoipa::path(
    post,
    path = "/api/order/place",
    summary = "Place order",
    description = "Persist an order for the authenticated user, clear their cart and return a checkout redirect URL",
    request_body = PlaceOrderRequest,
    responses(
        (status = 200, description = "Checkout session created", body = PlaceOrderResponse,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid order", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Order stored but no checkout session", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    payload: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<Json<PlaceOrderResponse>, ServiceError> {
    let Json(request) = payload?;
    let response = state
        .services
        .orders
        .place_order(auth_user.user_id, request)
        .await?;
    Ok(Json(response))
}

/// Reconcile a checkout redirect with the order ledger
#[utoipa::path(
    post,
    path = "/api/order/verify",
    summary = "Verify payment",
    description = "Mark the order paid, delete it, or leave it pending depending on the payment outcome",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Verification applied; `success` reports whether the order is paid", body = crate::MessageResponse),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 500, description = "Provider lookup failed", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn verify_order(
    State(state): State<AppState>,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Json(request) = payload?;
    let (order_id, hint) = PaymentService::parse_request(request)?;
    let outcome = state.services.payments.verify(order_id, hint).await?;
    Ok(Json(ApiResponse::message(outcome.success(), outcome.message())))
}

/// Orders of the authenticated user, newest first
#[utoipa::path(
    post,
    path = "/api/order/userOrders",
    summary = "List my orders",
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<Vec<OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn user_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<OrderResponse>> {
    let orders = state
        .services
        .orders
        .orders_for_user(auth_user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// All orders, newest first
#[utoipa::path(
    get,
    path = "/api/order/list",
    summary = "List all orders",
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<Vec<OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Vec<OrderResponse>> {
    let orders = state.services.orders.list_orders().await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Update an order's status
#[utoipa::path(
    put,
    path = "/api/order/status",
    summary = "Update order status",
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = crate::MessageResponse),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn update_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<UpdateOrderStatusRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Json(request) = payload?;
    let order_id = request.order_id;
    state.services.orders.update_status(request).await?;
    info!(order_id = %order_id, admin_id = %admin.user_id, "Order status changed by admin");
    Ok(Json(ApiResponse::message(true, "Status Updated")))
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Stripe event receiver
#[utoipa::path(
    post,
    path = "/api/order/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event accepted"),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 503, description = "Webhook secret not configured", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAck>), ServiceError> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let payments = &state.services.payments;
    let event = payments.parse_webhook(&body, signature)?;
    let event_type = event.event_type.clone();

    match payments.handle_event(event).await? {
        WebhookOutcome::Ignored => info!(event_type = %event_type, "Webhook event ignored"),
        WebhookOutcome::MarkedPaid(order_id) => {
            info!(event_type = %event_type, order_id = %order_id, "Webhook settled order")
        }
        WebhookOutcome::Deleted(order_id) => {
            warn!(event_type = %event_type, order_id = %order_id, "Webhook removed unpaid order")
        }
    }

    Ok((StatusCode::OK, Json(WebhookAck { received: true })))
}

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::order::{Model as OrderModel, OrderLine},
    errors::ServiceError,
    repositories::{NewOrder, OrderLedger, OrderUpdate, UserStore},
    services::checkout::CheckoutSessionBuilder,
};

/// Status written when no checkout session could be obtained for an order.
pub const PAYMENT_FAILED_STATUS: &str = "Payment Failed";

/// Body of `POST /api/order/place`.
///
/// Every field is optional at the wire level so that missing input surfaces as
/// a validation error rather than a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    /// Ignored when the caller is authenticated; the token subject wins.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<OrderLine>>,
    /// Client-computed total; recomputed server-side.
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schema(value_type = Option<f64>, example = 100.0)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub address: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderResponse {
    pub success: bool,
    #[serde(rename = "session_url")]
    pub session_url: String,
    pub order_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, message = "status is required"))]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(value_type = Vec<OrderLine>)]
    pub items: Value,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub amount: Decimal,
    #[schema(value_type = Object)]
    pub address: Value,
    pub status: String,
    pub payment: bool,
    pub date: DateTime<Utc>,
}

impl From<OrderModel> for OrderResponse {
    fn from(model: OrderModel) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            items: model.items,
            amount: model.amount,
            address: model.address,
            status: model.status,
            payment: model.payment,
            date: model.date,
        }
    }
}

/// Placement input after every precondition has been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOrder {
    pub items: Vec<OrderLine>,
    pub client_amount: Decimal,
    pub address: Value,
}

/// Checks every placement precondition without touching any store.
pub fn validate_place_request(request: PlaceOrderRequest) -> Result<ValidatedOrder, ServiceError> {
    let items = match request.items {
        Some(items) if !items.is_empty() => items,
        _ => {
            return Err(ServiceError::ValidationError(
                "items must contain at least one entry".into(),
            ))
        }
    };

    for (index, item) in items.iter().enumerate() {
        if item.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "items[{}].name is required",
                index
            )));
        }
        if item.price.is_sign_negative() && !item.price.is_zero() {
            return Err(ServiceError::ValidationError(format!(
                "items[{}].price must not be negative",
                index
            )));
        }
        if item.quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "items[{}].quantity must be at least 1",
                index
            )));
        }
    }

    let client_amount = request
        .amount
        .ok_or_else(|| ServiceError::ValidationError("amount is required".into()))?;

    let address = match request.address {
        Some(Value::Null) | None => {
            return Err(ServiceError::ValidationError("address is required".into()))
        }
        Some(address) => address,
    };

    Ok(ValidatedOrder {
        items,
        client_amount,
        address,
    })
}

/// `Σ price × quantity + delivery_fee`
pub fn order_total(items: &[OrderLine], delivery_fee: Decimal) -> Result<Decimal, ServiceError> {
    items
        .iter()
        .try_fold(delivery_fee, |acc, item| {
            item.price
                .checked_mul(Decimal::from(item.quantity))
                .and_then(|line| acc.checked_add(line))
        })
        .ok_or_else(|| ServiceError::ValidationError("order total overflows".into()))
}

/// Order placement orchestration plus the query/admin surface over the ledger.
#[derive(Clone)]
pub struct OrderService {
    ledger: Arc<dyn OrderLedger>,
    users: Arc<dyn UserStore>,
    checkout: CheckoutSessionBuilder,
    default_status: String,
}

impl OrderService {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        users: Arc<dyn UserStore>,
        checkout: CheckoutSessionBuilder,
        default_status: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            users,
            checkout,
            default_status: default_status.into(),
        }
    }

    /// Validates, persists, clears the cart and opens a checkout session.
    ///
    /// The order is written before the session is requested. If pricing or the
    /// provider call fails afterwards the order is kept and marked
    /// [`PAYMENT_FAILED_STATUS`].
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<PlaceOrderResponse, ServiceError> {
        if let Some(body_user) = request.user_id.as_deref() {
            if body_user != user_id.to_string() {
                debug!(body_user, "Ignoring userId from body in favour of token subject");
            }
        }

        let validated = validate_place_request(request)?;
        let amount = order_total(&validated.items, self.checkout.delivery_fee())?;
        if amount != validated.client_amount {
            warn!(
                client_amount = %validated.client_amount,
                server_amount = %amount,
                "Client amount differs from computed total; using computed total"
            );
        }

        let order = self
            .ledger
            .create(NewOrder {
                user_id,
                items: validated.items,
                amount,
                address: validated.address,
                status: self.default_status.clone(),
            })
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to persist order");
                e
            })?;
        let order_id = order.id;
        info!(order_id = %order_id, amount = %amount, "Order persisted");

        if let Err(e) = self.users.update_cart(user_id, Value::Object(Default::default())).await {
            warn!(error = %e, order_id = %order_id, "Failed to clear cart after placing order");
        }

        let session = match self.open_session(&order).await {
            Ok(session) => session,
            Err(e) => {
                counter!("food_order.checkout.session_failed", 1);
                error!(error = %e, order_id = %order_id, "Checkout session could not be created");
                self.mark_payment_failed(order_id).await;
                return Err(e);
            }
        };

        if let Err(e) = self
            .ledger
            .update(order_id, OrderUpdate::session(session.id.clone()))
            .await
        {
            warn!(error = %e, order_id = %order_id, session_id = %session.id, "Failed to record checkout session id");
        }

        counter!("food_order.orders.placed", 1);
        info!(order_id = %order_id, session_id = %session.id, "Checkout session created");

        Ok(PlaceOrderResponse {
            success: true,
            session_url: session.url.unwrap_or_default(),
            order_id,
        })
    }

    async fn open_session(
        &self,
        order: &OrderModel,
    ) -> Result<crate::services::stripe::CheckoutSession, ServiceError> {
        let lines = order
            .lines()
            .map_err(|e| ServiceError::ItemDataError(format!("stored items unreadable: {}", e)))?;
        let line_items = self.checkout.line_items(&lines)?;
        self.checkout.create_session(order.id, line_items).await
    }

    async fn mark_payment_failed(&self, order_id: Uuid) {
        if let Err(e) = self
            .ledger
            .update(order_id, OrderUpdate::status(PAYMENT_FAILED_STATUS))
            .await
        {
            error!(error = %e, order_id = %order_id, "Failed to mark order as payment failed");
        }
    }

    /// Orders placed by `user_id`, newest first.
    #[instrument(skip(self))]
    pub async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<OrderResponse>, ServiceError> {
        let orders = self.ledger.find_by_user(user_id).await?;
        debug!(count = orders.len(), "Fetched user orders");
        Ok(orders.into_iter().map(OrderResponse::from).collect())
    }

    /// All orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<OrderResponse>, ServiceError> {
        let orders = self.ledger.find_all().await?;
        Ok(orders.into_iter().map(OrderResponse::from).collect())
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id, new_status = %request.status))]
    pub async fn update_status(&self, request: UpdateOrderStatusRequest) -> Result<(), ServiceError> {
        request.validate()?;
        let status = request.status.trim();
        if status.is_empty() {
            return Err(ServiceError::ValidationError("status is required".into()));
        }

        self.ledger
            .update(request.order_id, OrderUpdate::status(status))
            .await?;
        info!("Order status updated");
        Ok(())
    }
}

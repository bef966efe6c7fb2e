use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{errors::ServiceError, repositories::UserStore};

/// Item id to quantity
pub type Cart = BTreeMap<String, i64>;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItemRequest {
    #[validate(length(min = 1, message = "itemId is required"))]
    pub item_id: String,
}

/// Per-user cart kept on the user record.
#[derive(Clone)]
pub struct CartService {
    users: Arc<dyn UserStore>,
}

impl CartService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    async fn load(&self, user_id: Uuid) -> Result<Cart, ServiceError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))?;

        Ok(serde_json::from_value(user.cart_data).unwrap_or_else(|e| {
            warn!(error = %e, user_id = %user_id, "Unreadable cart data; starting from empty cart");
            Cart::new()
        }))
    }

    async fn store(&self, user_id: Uuid, cart: &Cart) -> Result<(), ServiceError> {
        let value = serde_json::to_value(cart)
            .map_err(|e| ServiceError::InternalError(format!("Failed to encode cart: {}", e)))?;
        self.users.update_cart(user_id, value).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, user_id: Uuid) -> Result<Cart, ServiceError> {
        self.load(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn add(&self, user_id: Uuid, item_id: &str) -> Result<Cart, ServiceError> {
        let mut cart = self.load(user_id).await?;
        *cart.entry(item_id.to_string()).or_insert(0) += 1;
        self.store(user_id, &cart).await?;
        Ok(cart)
    }

    /// Decrements the item; entries reaching zero are dropped.
    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, item_id: &str) -> Result<Cart, ServiceError> {
        let mut cart = self.load(user_id).await?;
        if let Some(quantity) = cart.get_mut(item_id) {
            *quantity -= 1;
            if *quantity <= 0 {
                cart.remove(item_id);
            }
            self.store(user_id, &cart).await?;
        }
        Ok(cart)
    }

    /// Replaces the cart with an empty map.
    pub async fn clear(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.users
            .update_cart(user_id, Value::Object(Default::default()))
            .await
    }
}

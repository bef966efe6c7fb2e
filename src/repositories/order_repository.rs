use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::entities::order::{
    ActiveModel as OrderActiveModel, Column, Entity as Order, Model as OrderModel, OrderLine,
};
use crate::errors::ServiceError;
use crate::repositories::Repository;

use super::BaseRepository;

/// Fields supplied when an order is first written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub items: Vec<OrderLine>,
    pub amount: Decimal,
    pub address: Value,
    pub status: String,
}

/// Per-field changes; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderUpdate {
    pub payment: Option<bool>,
    pub status: Option<String>,
    pub payment_session_id: Option<String>,
}

impl OrderUpdate {
    pub fn paid() -> Self {
        Self {
            payment: Some(true),
            ..Default::default()
        }
    }

    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Default::default()
        }
    }

    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            payment_session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.payment.is_none() && self.status.is_none() && self.payment_session_id.is_none()
    }
}

/// Durable order store. Every operation touches a single record.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn create(&self, order: NewOrder) -> Result<OrderModel, ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderModel>, ServiceError>;

    /// Orders owned by `user_id`, newest first.
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<OrderModel>, ServiceError>;

    /// Every order, newest first.
    async fn find_all(&self) -> Result<Vec<OrderModel>, ServiceError>;

    /// Applies `changes` to the order; `NotFound` when no row matches.
    async fn update(&self, id: Uuid, changes: OrderUpdate) -> Result<(), ServiceError>;

    /// Removes the order. A missing id is not an error.
    async fn delete_by_id(&self, id: Uuid) -> Result<(), ServiceError>;
}

/// sea-orm backed [`OrderLedger`]
#[derive(Debug, Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

impl Repository for OrderRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl OrderLedger for OrderRepository {
    async fn create(&self, order: NewOrder) -> Result<OrderModel, ServiceError> {
        let items = serde_json::to_value(&order.items)
            .map_err(|e| ServiceError::InternalError(format!("Failed to encode items: {}", e)))?;

        let model = OrderActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(order.user_id),
            items: Set(items),
            amount: Set(order.amount),
            address: Set(order.address),
            status: Set(order.status),
            payment: Set(false),
            payment_session_id: Set(None),
            date: Set(Utc::now()),
        };

        model.insert(self.get_db()).await.map_err(|e| {
            error!(error = %e, user_id = %order.user_id, "Failed to insert order");
            ServiceError::DatabaseError(e)
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find_by_id(id).one(self.get_db()).await?)
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(Order::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::Date)
            .all(self.get_db())
            .await?)
    }

    async fn find_all(&self) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(Order::find()
            .order_by_desc(Column::Date)
            .all(self.get_db())
            .await?)
    }

    async fn update(&self, id: Uuid, changes: OrderUpdate) -> Result<(), ServiceError> {
        if changes.is_empty() {
            return match self.find_by_id(id).await? {
                Some(_) => Ok(()),
                None => Err(ServiceError::NotFound(format!("Order {} not found", id))),
            };
        }

        let mut query = Order::update_many().filter(Column::Id.eq(id));
        if let Some(payment) = changes.payment {
            query = query.col_expr(Column::Payment, Expr::value(payment));
        }
        if let Some(status) = changes.status {
            query = query.col_expr(Column::Status, Expr::value(status));
        }
        if let Some(session_id) = changes.payment_session_id {
            query = query.col_expr(Column::PaymentSessionId, Expr::value(session_id));
        }

        let result = query.exec(self.get_db()).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Order {} not found", id)));
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<(), ServiceError> {
        Order::delete_by_id(id).exec(self.get_db()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::test_db;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn new_order(user_id: Uuid, name: &str) -> NewOrder {
        NewOrder {
            user_id,
            items: vec![OrderLine {
                name: name.to_string(),
                price: dec!(10),
                quantity: 2,
            }],
            amount: dec!(100),
            address: json!({"street": "1 Main St"}),
            status: "Food Processing".to_string(),
        }
    }

    #[tokio::test]
    async fn create_persists_unpaid_order_with_items_in_order() {
        let repo = OrderRepository::new(test_db().await);
        let user_id = Uuid::new_v4();

        let mut order = new_order(user_id, "Pizza");
        order.items.push(OrderLine {
            name: "Burger".into(),
            price: dec!(8),
            quantity: 1,
        });

        let created = repo.create(order).await.unwrap();
        assert!(!created.payment);
        assert_eq!(created.status, "Food Processing");

        let stored = repo.find_by_id(created.id).await.unwrap().unwrap();
        let names: Vec<_> = stored.lines().unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["Pizza", "Burger"]);
    }

    #[tokio::test]
    async fn find_by_user_returns_newest_first() {
        let repo = OrderRepository::new(test_db().await);
        let user_id = Uuid::new_v4();

        let first = repo.create(new_order(user_id, "First")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = repo.create(new_order(user_id, "Second")).await.unwrap();
        repo.create(new_order(Uuid::new_v4(), "Other")).await.unwrap();

        let orders = repo.find_by_user(user_id).await.unwrap();
        let ids: Vec<_> = orders.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        assert_eq!(repo.find_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn update_touches_only_given_fields() {
        let repo = OrderRepository::new(test_db().await);
        let created = repo.create(new_order(Uuid::new_v4(), "Pizza")).await.unwrap();

        repo.update(created.id, OrderUpdate::paid()).await.unwrap();
        repo.update(created.id, OrderUpdate::status("Out for delivery"))
            .await
            .unwrap();

        let stored = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert!(stored.payment);
        assert_eq!(stored.status, "Out for delivery");
        assert_eq!(stored.items, created.items);
    }

    #[tokio::test]
    async fn update_missing_order_is_not_found() {
        let repo = OrderRepository::new(test_db().await);
        let err = repo
            .update(Uuid::new_v4(), OrderUpdate::paid())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_silent_for_missing_ids() {
        let repo = OrderRepository::new(test_db().await);
        let created = repo.create(new_order(Uuid::new_v4(), "Pizza")).await.unwrap();

        repo.delete_by_id(created.id).await.unwrap();
        assert!(repo.find_by_id(created.id).await.unwrap().is_none());
        repo.delete_by_id(created.id).await.unwrap();
    }
}

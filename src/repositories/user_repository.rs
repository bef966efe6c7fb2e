use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::entities::user::{ActiveModel as UserActiveModel, Column, Entity as User, Model as UserModel};
use crate::errors::ServiceError;
use crate::repositories::Repository;

use super::BaseRepository;

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

/// User records as seen by ordering and cart flows.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserModel>, ServiceError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, ServiceError>;

    async fn create(&self, user: NewUser) -> Result<UserModel, ServiceError>;

    /// Replaces the stored cart wholesale.
    async fn update_cart(&self, id: Uuid, cart: Value) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
pub struct UserRepository {
    base: BaseRepository,
}

impl UserRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

impl Repository for UserRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserModel>, ServiceError> {
        Ok(User::find_by_id(id).one(self.get_db()).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, ServiceError> {
        Ok(User::find()
            .filter(Column::Email.eq(email))
            .one(self.get_db())
            .await?)
    }

    async fn create(&self, user: NewUser) -> Result<UserModel, ServiceError> {
        let model = UserActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(user.name),
            email: Set(user.email),
            password_hash: Set(user.password_hash),
            role: Set(user.role),
            cart_data: Set(Value::Object(Default::default())),
            created_at: Set(Utc::now()),
        };
        Ok(model.insert(self.get_db()).await?)
    }

    async fn update_cart(&self, id: Uuid, cart: Value) -> Result<(), ServiceError> {
        let result = User::update_many()
            .col_expr(Column::CartData, Expr::value(cart))
            .filter(Column::Id.eq(id))
            .exec(self.get_db())
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("User {} not found", id)));
        }
        Ok(())
    }
}

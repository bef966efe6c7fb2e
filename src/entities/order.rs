use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order record: a purchase intent and its settlement state.
///
/// `items` and `address` are stored as JSON; `items` is written once at
/// creation and only `payment`, `status` and `payment_session_id` change
/// afterwards.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    #[sea_orm(column_type = "Json")]
    pub items: Json, // Vec<OrderLine> serialized
    pub amount: Decimal,
    #[sea_orm(column_type = "Json")]
    pub address: Json,
    pub status: String,
    pub payment: bool,
    #[sea_orm(nullable)]
    pub payment_session_id: Option<String>,
    pub date: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// One purchased item as submitted by the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderLine {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 10.0)]
    pub price: Decimal,
    pub quantity: i64,
}

impl Model {
    /// Decodes the stored item list, preserving submission order.
    pub fn lines(&self) -> Result<Vec<OrderLine>, serde_json::Error> {
        serde_json::from_value(self.items.clone())
    }
}

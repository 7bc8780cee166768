//! `SeaORM` Entity for storefront and back-office orders

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "Order")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    /// Distributor credited with the sale
    #[sea_orm(column_name = "distributorId", column_type = "Text")]
    pub distributor_id: String,
    /// Retail customer buying through a storefront
    #[sea_orm(column_name = "customerId", column_type = "Text", nullable)]
    pub customer_id: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total: Decimal,
    #[sea_orm(column_name = "paymentStatus")]
    pub payment_status: super::sea_orm_active_enums::PaymentStatus,
    pub status: super::sea_orm_active_enums::OrderStatus,
    #[sea_orm(column_name = "stripeSessionId", column_type = "Text", nullable)]
    pub stripe_session_id: Option<String>,
    #[sea_orm(column_name = "paidAt", nullable)]
    pub paid_at: Option<DateTime>,
    #[sea_orm(column_name = "createdAt")]
    pub created_at: DateTime,
    #[sea_orm(column_name = "updatedAt")]
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! `SeaORM` Entity for processed orders
//!
//! The primary key on `orderId` is what keeps a second commission batch for
//! the same order out of the database.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "CommissionRun")]
pub struct Model {
    #[sea_orm(
        primary_key,
        auto_increment = false,
        column_name = "orderId",
        column_type = "Text"
    )]
    pub order_id: String,
    #[sea_orm(column_name = "recordCount")]
    pub record_count: i32,
    #[sea_orm(column_name = "totalAmount", column_type = "Decimal(Some((12, 2)))")]
    pub total_amount: Decimal,
    #[sea_orm(column_name = "ruleSetVersion")]
    pub rule_set_version: i32,
    #[sea_orm(column_name = "createdAt")]
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::commission::Entity")]
    Commission,
}

impl Related<super::commission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Commission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! `SeaORM` Entity for commission records

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "Commission")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_name = "recipientId", column_type = "Text")]
    pub recipient_id: String,
    #[sea_orm(column_name = "orderId", column_type = "Text")]
    pub order_id: String,
    #[sea_orm(column_name = "sourceDistributorId", column_type = "Text")]
    pub source_distributor_id: String,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub amount: Decimal,
    #[sea_orm(column_name = "type")]
    pub commission_type: super::sea_orm_active_enums::CommissionType,
    #[sea_orm(nullable)]
    pub level: Option<i32>,
    #[sea_orm(column_name = "rankId", column_type = "Text", nullable)]
    pub rank_id: Option<String>,
    pub status: super::sea_orm_active_enums::CommissionStatus,
    #[sea_orm(column_name = "createdAt")]
    pub created_at: DateTime,
    #[sea_orm(column_name = "updatedAt")]
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::commission_run::Entity",
        from = "Column::OrderId",
        to = "super::commission_run::Column::OrderId",
        on_update = "Cascade",
        on_delete = "Restrict"
    )]
    CommissionRun,
}

impl Related<super::commission_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CommissionRun.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! `SeaORM` Entity for distributor accounts

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "Distributor")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    /// Enrollment sponsor, null for the root account
    #[sea_orm(column_name = "sponsorId", column_type = "Text", nullable)]
    pub sponsor_id: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub rank: String,
    pub status: super::sea_orm_active_enums::DistributorStatus,
    #[sea_orm(column_name = "autoshipActive")]
    pub autoship_active: bool,
    /// Monthly autoship amount
    #[sea_orm(column_name = "autoshipAmount", column_type = "Decimal(Some((12, 2)))")]
    pub autoship_amount: Decimal,
    #[sea_orm(column_type = "Text", nullable)]
    pub email: Option<String>,
    #[sea_orm(column_name = "createdAt")]
    pub created_at: DateTime,
    #[sea_orm(column_name = "updatedAt")]
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::matrix_position::Entity")]
    MatrixPosition,
}

impl Related<super::matrix_position::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MatrixPosition.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

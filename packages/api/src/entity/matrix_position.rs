//! `SeaORM` Entity for forced-matrix placements

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "MatrixPosition")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_name = "userId", column_type = "Text", unique)]
    pub user_id: String,
    /// Distributor occupying the upline slot
    #[sea_orm(column_name = "parentId", column_type = "Text", nullable)]
    pub parent_id: Option<String>,
    pub level: i32,
    /// Slot index within the parent's width
    #[sea_orm(column_name = "legPosition")]
    pub leg_position: i32,
    #[sea_orm(column_name = "createdAt")]
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::distributor::Entity",
        from = "Column::UserId",
        to = "super::distributor::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Distributor,
}

impl Related<super::distributor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Distributor.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

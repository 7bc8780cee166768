//! `SeaORM` Entity for rank achievement history

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per rank a distributor has ever reached
///
/// The table carries a unique index on `("distributorId", "rankId")`
/// (`RankAchievement_distributorId_rankId_key`), which the commit relies on
/// to pay each rank bonus once.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "RankAchievement")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_name = "distributorId", column_type = "Text")]
    pub distributor_id: String,
    #[sea_orm(column_name = "rankId", column_type = "Text")]
    pub rank_id: String,
    /// Order whose volume triggered the promotion
    #[sea_orm(column_name = "orderId", column_type = "Text", nullable)]
    pub order_id: Option<String>,
    #[sea_orm(column_name = "achievedAt")]
    pub achieved_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::distributor::Entity",
        from = "Column::DistributorId",
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

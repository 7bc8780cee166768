//! PostgreSQL commission store implementation using SeaORM
//!
//! Reads go straight to the Prisma-managed tables. `commit_batch` writes the
//! rank history, the run marker and the commission rows in one transaction.
//! Only the `CommissionRun` primary key turns a second batch for the same
//! order into a conflict. A rank already held under the
//! `(distributorId, rankId)` unique index is skipped with `ON CONFLICT DO
//! NOTHING` and its bonus record is dropped from the batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use matrix_commission::{
    CommissionBatch, CommissionKind, CommissionRecord, CommissionRun, CommissionStatus,
    CommissionStore, Distributor, DistributorStatus, LineItem, MatrixPosition, Order, OrderStatus,
    PaymentStatus, QualifyingPeriod, RuleSetConfig, StoreError, StoreResult,
    sum_commissionable_value,
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait, TryInsertResult,
    sea_query::OnConflict,
};
use std::sync::Arc;

use crate::entity::{
    commission, commission_rule_set, commission_run, distributor, matrix_position, order,
    order_item, rank_achievement,
    sea_orm_active_enums::{
        CommissionStatus as EntityCommissionStatus, CommissionType as EntityCommissionType,
        DistributorStatus as EntityDistributorStatus, OrderStatus as EntityOrderStatus,
        PaymentStatus as EntityPaymentStatus,
    },
};

#[derive(Debug, Clone)]
pub struct PostgresCommissionStore {
    db: Arc<DatabaseConnection>,
    fallback_rule_set: Option<RuleSetConfig>,
}

impl PostgresCommissionStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            fallback_rule_set: None,
        }
    }

    /// Rule set used when no active `CommissionRuleSet` row exists
    pub fn with_fallback_rule_set(mut self, config: Option<RuleSetConfig>) -> Self {
        self.fallback_rule_set = config;
        self
    }
}

fn db_err(e: DbErr) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Only used on the `CommissionRun` insert, whose primary key is the order id
fn run_conflict_or_db(e: DbErr) -> StoreError {
    match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => StoreError::Conflict(detail),
        _ => db_err(e),
    }
}

// Conversion helpers
fn entity_distributor_status_to_type(s: EntityDistributorStatus) -> DistributorStatus {
    match s {
        EntityDistributorStatus::Active => DistributorStatus::Active,
        EntityDistributorStatus::Inactive => DistributorStatus::Inactive,
    }
}

fn entity_payment_status_to_type(s: EntityPaymentStatus) -> PaymentStatus {
    match s {
        EntityPaymentStatus::Pending => PaymentStatus::Pending,
        EntityPaymentStatus::Paid => PaymentStatus::Paid,
        EntityPaymentStatus::Failed => PaymentStatus::Failed,
        EntityPaymentStatus::Refunded => PaymentStatus::Refunded,
    }
}

fn entity_order_status_to_type(s: EntityOrderStatus) -> OrderStatus {
    match s {
        EntityOrderStatus::Pending => OrderStatus::Pending,
        EntityOrderStatus::Processing => OrderStatus::Processing,
        EntityOrderStatus::Completed => OrderStatus::Completed,
        EntityOrderStatus::Cancelled => OrderStatus::Cancelled,
    }
}

fn type_order_status_to_entity(s: OrderStatus) -> EntityOrderStatus {
    match s {
        OrderStatus::Pending => EntityOrderStatus::Pending,
        OrderStatus::Processing => EntityOrderStatus::Processing,
        OrderStatus::Completed => EntityOrderStatus::Completed,
        OrderStatus::Cancelled => EntityOrderStatus::Cancelled,
    }
}

fn entity_kind_to_type(k: EntityCommissionType) -> CommissionKind {
    match k {
        EntityCommissionType::Retail => CommissionKind::Retail,
        EntityCommissionType::Matrix => CommissionKind::Matrix,
        EntityCommissionType::RankBonus => CommissionKind::RankBonus,
        EntityCommissionType::Matching => CommissionKind::Matching,
    }
}

fn type_kind_to_entity(k: CommissionKind) -> EntityCommissionType {
    match k {
        CommissionKind::Retail => EntityCommissionType::Retail,
        CommissionKind::Matrix => EntityCommissionType::Matrix,
        CommissionKind::RankBonus => EntityCommissionType::RankBonus,
        CommissionKind::Matching => EntityCommissionType::Matching,
    }
}

fn entity_commission_status_to_type(s: EntityCommissionStatus) -> CommissionStatus {
    match s {
        EntityCommissionStatus::Pending => CommissionStatus::Pending,
        EntityCommissionStatus::Approved => CommissionStatus::Approved,
        EntityCommissionStatus::Paid => CommissionStatus::Paid,
        EntityCommissionStatus::Rejected => CommissionStatus::Rejected,
    }
}

fn type_commission_status_to_entity(s: CommissionStatus) -> EntityCommissionStatus {
    match s {
        CommissionStatus::Pending => EntityCommissionStatus::Pending,
        CommissionStatus::Approved => EntityCommissionStatus::Approved,
        CommissionStatus::Paid => EntityCommissionStatus::Paid,
        CommissionStatus::Rejected => EntityCommissionStatus::Rejected,
    }
}

fn to_naive(dt: DateTime<Utc>) -> sea_orm::prelude::DateTime {
    dt.naive_utc()
}

fn from_naive(dt: sea_orm::prelude::DateTime) -> DateTime<Utc> {
    dt.and_utc()
}

fn non_negative(value: i32, field: &str) -> StoreResult<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("negative {}: {}", field, value)))
}

fn distributor_model_to_record(m: distributor::Model) -> Distributor {
    Distributor {
        id: m.id,
        sponsor_id: m.sponsor_id,
        rank: m.rank,
        status: entity_distributor_status_to_type(m.status),
        autoship_active: m.autoship_active,
        autoship_amount: m.autoship_amount,
        email: m.email,
    }
}

fn position_model_to_record(m: matrix_position::Model) -> StoreResult<MatrixPosition> {
    Ok(MatrixPosition {
        level: non_negative(m.level, "matrix level")?,
        position: non_negative(m.leg_position, "leg position")?,
        distributor_id: m.user_id,
        parent_id: m.parent_id,
    })
}

fn item_model_to_record(m: order_item::Model) -> StoreResult<LineItem> {
    Ok(LineItem {
        quantity: non_negative(m.quantity, "quantity")?,
        product_id: m.product_id,
        unit_price: m.unit_price,
        commissionable_value: m.commissionable_value,
    })
}

fn order_model_to_record(m: order::Model, items: Vec<LineItem>) -> Order {
    Order {
        id: m.id,
        distributor_id: m.distributor_id,
        customer_id: m.customer_id,
        items,
        total: m.total,
        payment_status: entity_payment_status_to_type(m.payment_status),
        status: entity_order_status_to_type(m.status),
        paid_at: m.paid_at.map(from_naive),
        created_at: from_naive(m.created_at),
    }
}

fn commission_model_to_record(m: commission::Model) -> StoreResult<CommissionRecord> {
    let level = match m.level {
        Some(level) => Some(u8::try_from(level).map_err(|_| {
            StoreError::Serialization(format!("commission level out of range: {}", level))
        })?),
        None => None,
    };

    Ok(CommissionRecord {
        id: m.id,
        recipient_id: m.recipient_id,
        order_id: m.order_id,
        source_distributor_id: m.source_distributor_id,
        amount: m.amount,
        kind: entity_kind_to_type(m.commission_type),
        level,
        rank_id: m.rank_id,
        status: entity_commission_status_to_type(m.status),
        created_at: from_naive(m.created_at),
    })
}

fn run_model_to_record(m: commission_run::Model) -> CommissionRun {
    CommissionRun {
        order_id: m.order_id,
        record_count: m.record_count.max(0) as u32,
        total_amount: m.total_amount,
        rule_set_version: m.rule_set_version,
        created_at: from_naive(m.created_at),
    }
}

#[async_trait]
impl CommissionStore for PostgresCommissionStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn get_distributor(&self, distributor_id: &str) -> StoreResult<Option<Distributor>> {
        let model = distributor::Entity::find_by_id(distributor_id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(model.map(distributor_model_to_record))
    }

    async fn get_matrix_position(
        &self,
        distributor_id: &str,
    ) -> StoreResult<Option<MatrixPosition>> {
        matrix_position::Entity::find()
            .filter(matrix_position::Column::UserId.eq(distributor_id))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .map(position_model_to_record)
            .transpose()
    }

    async fn get_children(&self, parent_id: &str) -> StoreResult<Vec<MatrixPosition>> {
        matrix_position::Entity::find()
            .filter(matrix_position::Column::ParentId.eq(parent_id))
            .order_by_asc(matrix_position::Column::LegPosition)
            .order_by_asc(matrix_position::Column::UserId)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(position_model_to_record)
            .collect()
    }

    async fn update_distributor_rank(
        &self,
        distributor_id: &str,
        rank_id: &str,
    ) -> StoreResult<()> {
        let model = distributor::Entity::find_by_id(distributor_id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::NotFound(format!("distributor {}", distributor_id)))?;

        let mut active: distributor::ActiveModel = model.into();
        active.rank = Set(rank_id.to_string());
        active.updated_at = Set(Utc::now().naive_utc());
        active.update(self.db.as_ref()).await.map_err(db_err)?;
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        let Some(model) = order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
        else {
            return Ok(None);
        };

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(item_model_to_record)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Some(order_model_to_record(model, items)))
    }

    async fn personal_volume(
        &self,
        distributor_id: &str,
        period: &QualifyingPeriod,
    ) -> StoreResult<Decimal> {
        let start = to_naive(period.start);
        let end = to_naive(period.end);

        // Orders without a payment timestamp fall back to their creation time
        let in_period = Condition::any()
            .add(order::Column::PaidAt.between(start, end))
            .add(
                Condition::all()
                    .add(order::Column::PaidAt.is_null())
                    .add(order::Column::CreatedAt.between(start, end)),
            );

        let order_ids: Vec<String> = order::Entity::find()
            .filter(order::Column::DistributorId.eq(distributor_id))
            .filter(order::Column::PaymentStatus.eq(EntityPaymentStatus::Paid))
            .filter(in_period)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(|o| o.id)
            .collect();

        if order_ids.is_empty() {
            return Ok(Decimal::ZERO);
        }

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(item_model_to_record)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(sum_commissionable_value(&items))
    }

    async fn mark_order_paid(&self, order_id: &str, paid_at: DateTime<Utc>) -> StoreResult<()> {
        let model = order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))?;

        let mut active: order::ActiveModel = model.into();
        active.payment_status = Set(EntityPaymentStatus::Paid);
        active.status = Set(EntityOrderStatus::Processing);
        active.paid_at = Set(Some(to_naive(paid_at)));
        active.updated_at = Set(Utc::now().naive_utc());
        active.update(self.db.as_ref()).await.map_err(db_err)?;
        Ok(())
    }

    async fn set_order_status(&self, order_id: &str, status: OrderStatus) -> StoreResult<()> {
        let model = order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))?;

        let mut active: order::ActiveModel = model.into();
        active.status = Set(type_order_status_to_entity(status));
        active.updated_at = Set(Utc::now().naive_utc());
        active.update(self.db.as_ref()).await.map_err(db_err)?;
        Ok(())
    }

    async fn commissions_for_order(&self, order_id: &str) -> StoreResult<Vec<CommissionRecord>> {
        commission::Entity::find()
            .filter(commission::Column::OrderId.eq(order_id))
            .order_by_asc(commission::Column::CreatedAt)
            .order_by_asc(commission::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(commission_model_to_record)
            .collect()
    }

    async fn commissions_for_recipient(
        &self,
        recipient_id: &str,
        status: Option<CommissionStatus>,
    ) -> StoreResult<Vec<CommissionRecord>> {
        let mut query =
            commission::Entity::find().filter(commission::Column::RecipientId.eq(recipient_id));

        if let Some(status) = status {
            query = query.filter(commission::Column::Status.eq(type_commission_status_to_entity(status)));
        }

        query
            .order_by_desc(commission::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(commission_model_to_record)
            .collect()
    }

    async fn get_commission_run(&self, order_id: &str) -> StoreResult<Option<CommissionRun>> {
        let model = commission_run::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(model.map(run_model_to_record))
    }

    async fn has_rank_achievement(
        &self,
        distributor_id: &str,
        rank_id: &str,
    ) -> StoreResult<bool> {
        let count = rank_achievement::Entity::find()
            .filter(rank_achievement::Column::DistributorId.eq(distributor_id))
            .filter(rank_achievement::Column::RankId.eq(rank_id))
            .count(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(count > 0)
    }

    async fn commit_batch(&self, mut batch: CommissionBatch) -> StoreResult<CommissionBatch> {
        let txn = self.db.begin().await.map_err(db_err)?;

        let mut held = Vec::new();
        for a in &batch.achievements {
            let row = rank_achievement::ActiveModel {
                id: Set(a.id.clone()),
                distributor_id: Set(a.distributor_id.clone()),
                rank_id: Set(a.rank_id.clone()),
                order_id: Set(a.order_id.clone()),
                achieved_at: Set(to_naive(a.achieved_at)),
            };
            let result = rank_achievement::Entity::insert(row)
                .on_conflict(
                    OnConflict::columns([
                        rank_achievement::Column::DistributorId,
                        rank_achievement::Column::RankId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .do_nothing()
                .exec(&txn)
                .await
                .map_err(db_err)?;
            if matches!(result, TryInsertResult::Conflicted) {
                held.push((a.distributor_id.clone(), a.rank_id.clone()));
            }
        }
        for (distributor_id, rank_id) in held {
            tracing::info!(
                order_id = %batch.order_id(),
                distributor_id = %distributor_id,
                rank = %rank_id,
                "Rank already awarded by a concurrent run, dropping its bonus"
            );
            batch.drop_achievement(&distributor_id, &rank_id);
        }

        commission_run::ActiveModel {
            order_id: Set(batch.run.order_id.clone()),
            record_count: Set(batch.run.record_count as i32),
            total_amount: Set(batch.run.total_amount),
            rule_set_version: Set(batch.run.rule_set_version),
            created_at: Set(to_naive(batch.run.created_at)),
        }
        .insert(&txn)
        .await
        .map_err(run_conflict_or_db)?;

        if !batch.records.is_empty() {
            let rows = batch.records.iter().cloned().map(|r| commission::ActiveModel {
                id: Set(r.id),
                recipient_id: Set(r.recipient_id),
                order_id: Set(r.order_id),
                source_distributor_id: Set(r.source_distributor_id),
                amount: Set(r.amount),
                commission_type: Set(type_kind_to_entity(r.kind)),
                level: Set(r.level.map(i32::from)),
                rank_id: Set(r.rank_id),
                status: Set(type_commission_status_to_entity(r.status)),
                created_at: Set(to_naive(r.created_at)),
                updated_at: Set(to_naive(r.created_at)),
            });
            commission::Entity::insert_many(rows)
                .exec(&txn)
                .await
                .map_err(db_err)?;
        }

        txn.commit().await.map_err(db_err)?;
        Ok(batch)
    }

    async fn load_rule_set(&self) -> StoreResult<Option<RuleSetConfig>> {
        let active = commission_rule_set::Entity::find()
            .filter(commission_rule_set::Column::Active.eq(true))
            .order_by_desc(commission_rule_set::Column::Version)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;

        match active {
            Some(row) => {
                let mut config: RuleSetConfig = serde_json::from_value(row.config)
                    .map_err(|e| {
                        StoreError::MalformedRuleSet(format!("rule set {}: {}", row.id, e))
                    })?;
                config.version = row.version;
                Ok(Some(config))
            }
            None => Ok(self.fallback_rule_set.clone()),
        }
    }
}

//! Types for the commission persistence seam

use crate::rules::RuleSetConfig;
use crate::types::{
    CommissionKind, CommissionRecord, CommissionStatus, Distributor, MatrixPosition, Order,
    OrderStatus, QualifyingPeriod, RankAchievement,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Marker row written once per processed order
///
/// Backends key it by `order_id`, which is the uniqueness constraint behind
/// at-most-once commission creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionRun {
    pub order_id: String,
    pub record_count: u32,
    pub total_amount: Decimal,
    pub rule_set_version: i32,
    pub created_at: DateTime<Utc>,
}

/// Everything one calculation writes, committed all-or-nothing
#[derive(Clone, Debug)]
pub struct CommissionBatch {
    pub run: CommissionRun,
    pub records: Vec<CommissionRecord>,
    pub achievements: Vec<RankAchievement>,
}

impl CommissionBatch {
    pub fn order_id(&self) -> &str {
        &self.run.order_id
    }

    /// Remove an achievement that another run already recorded, together with
    /// the rank bonus it carried
    ///
    /// Backends call this while committing, once they hold whatever guards
    /// `(distributor_id, rank_id)` uniqueness. Run totals are recomputed.
    pub fn drop_achievement(&mut self, distributor_id: &str, rank_id: &str) -> bool {
        let before = self.achievements.len();
        self.achievements
            .retain(|a| !(a.distributor_id == distributor_id && a.rank_id == rank_id));
        if self.achievements.len() == before {
            return false;
        }

        self.records.retain(|r| {
            !(r.kind == CommissionKind::RankBonus
                && r.recipient_id == distributor_id
                && r.rank_id.as_deref() == Some(rank_id))
        });
        self.run.record_count = self.records.len() as u32;
        self.run.total_amount = self.records.iter().map(|r| r.amount).sum();
        true
    }
}

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A stored rule set that does not decode into [`RuleSetConfig`]
    #[error("Malformed rule set: {0}")]
    MalformedRuleSet(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for commission storage backends
#[async_trait]
pub trait CommissionStore: Send + Sync + Debug {
    /// Get backend name for logging
    fn backend_name(&self) -> &'static str;

    // ========================================================================
    // Genealogy
    // ========================================================================

    async fn get_distributor(&self, distributor_id: &str) -> StoreResult<Option<Distributor>>;

    async fn get_matrix_position(
        &self,
        distributor_id: &str,
    ) -> StoreResult<Option<MatrixPosition>>;

    /// Direct children of a matrix slot, ordered by position
    async fn get_children(&self, parent_id: &str) -> StoreResult<Vec<MatrixPosition>>;

    /// Persist a recalculated rank
    async fn update_distributor_rank(&self, distributor_id: &str, rank_id: &str)
    -> StoreResult<()>;

    // ========================================================================
    // Orders
    // ========================================================================

    /// Get an order with its line items
    async fn get_order(&self, order_id: &str) -> StoreResult<Option<Order>>;

    /// Commissionable value of the distributor's own paid orders in the period
    async fn personal_volume(
        &self,
        distributor_id: &str,
        period: &QualifyingPeriod,
    ) -> StoreResult<Decimal>;

    /// Record a confirmed payment: payment status `Paid`, order status
    /// `Processing` until a commission run completes
    async fn mark_order_paid(&self, order_id: &str, paid_at: DateTime<Utc>) -> StoreResult<()>;

    async fn set_order_status(&self, order_id: &str, status: OrderStatus) -> StoreResult<()>;

    // ========================================================================
    // Commissions
    // ========================================================================

    async fn commissions_for_order(&self, order_id: &str) -> StoreResult<Vec<CommissionRecord>>;

    async fn commissions_for_recipient(
        &self,
        recipient_id: &str,
        status: Option<CommissionStatus>,
    ) -> StoreResult<Vec<CommissionRecord>>;

    async fn get_commission_run(&self, order_id: &str) -> StoreResult<Option<CommissionRun>>;

    async fn has_rank_achievement(&self, distributor_id: &str, rank_id: &str)
    -> StoreResult<bool>;

    /// Write the batch atomically and return what was actually written
    ///
    /// Returns [`StoreError::Conflict`] when a run for the order already exists,
    /// in which case nothing is written. Achievements already held for the same
    /// `(distributor_id, rank_id)` are not a conflict: they are left out, along
    /// with their rank bonus (see [`CommissionBatch::drop_achievement`]).
    async fn commit_batch(&self, batch: CommissionBatch) -> StoreResult<CommissionBatch>;

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Active rule set configuration, unvalidated
    ///
    /// A stored rule set that cannot be decoded is
    /// [`StoreError::MalformedRuleSet`].
    async fn load_rule_set(&self) -> StoreResult<Option<RuleSetConfig>>;
}

//! In-memory commission store
//!
//! Used by tests and local runs. All state sits behind one lock, so a batch
//! commit is atomic with respect to every other reader and writer.

use super::{CommissionBatch, CommissionRun, CommissionStore, StoreError, StoreResult};
use crate::money::sum_commissionable_value;
use crate::rules::RuleSetConfig;
use crate::types::{
    CommissionRecord, CommissionStatus, Distributor, MatrixPosition, Order, OrderStatus,
    PaymentStatus, QualifyingPeriod, RankAchievement,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct MemoryState {
    distributors: HashMap<String, Distributor>,
    positions: HashMap<String, MatrixPosition>,
    orders: HashMap<String, Order>,
    records: Vec<CommissionRecord>,
    achievements: Vec<RankAchievement>,
    runs: HashMap<String, CommissionRun>,
    /// Decoded on write, a decode error is kept and reported on load
    rule_set: Option<Result<RuleSetConfig, String>>,
}

#[derive(Debug)]
pub struct InMemoryCommissionStore {
    state: Arc<RwLock<MemoryState>>,
    fail_commits: AtomicBool,
}

impl InMemoryCommissionStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            fail_commits: AtomicBool::new(false),
        }
    }

    pub fn insert_distributor(&self, distributor: Distributor) {
        self.state
            .write()
            .distributors
            .insert(distributor.id.clone(), distributor);
    }

    pub fn insert_position(&self, position: MatrixPosition) {
        self.state
            .write()
            .positions
            .insert(position.distributor_id.clone(), position);
    }

    pub fn insert_order(&self, order: Order) {
        self.state.write().orders.insert(order.id.clone(), order);
    }

    pub fn insert_achievement(&self, achievement: RankAchievement) {
        self.state.write().achievements.push(achievement);
    }

    pub fn set_rule_set(&self, config: RuleSetConfig) {
        self.state.write().rule_set = Some(Ok(config));
    }

    /// Store a rule set as loosely-typed JSON, the way a database row holds it
    pub fn set_raw_rule_set(&self, raw: serde_json::Value) {
        let decoded = serde_json::from_value::<RuleSetConfig>(raw).map_err(|e| e.to_string());
        self.state.write().rule_set = Some(decoded);
    }

    /// Make every following `commit_batch` fail before writing anything
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn distributor(&self, distributor_id: &str) -> Option<Distributor> {
        self.state.read().distributors.get(distributor_id).cloned()
    }

    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.state.read().orders.get(order_id).cloned()
    }

    pub fn records(&self) -> Vec<CommissionRecord> {
        self.state.read().records.clone()
    }

    pub fn achievements(&self) -> Vec<RankAchievement> {
        self.state.read().achievements.clone()
    }

    pub fn run_count(&self) -> usize {
        self.state.read().runs.len()
    }
}

impl Default for InMemoryCommissionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommissionStore for InMemoryCommissionStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_distributor(&self, distributor_id: &str) -> StoreResult<Option<Distributor>> {
        Ok(self.distributor(distributor_id))
    }

    async fn get_matrix_position(
        &self,
        distributor_id: &str,
    ) -> StoreResult<Option<MatrixPosition>> {
        Ok(self.state.read().positions.get(distributor_id).cloned())
    }

    async fn get_children(&self, parent_id: &str) -> StoreResult<Vec<MatrixPosition>> {
        let state = self.state.read();
        let mut children: Vec<MatrixPosition> = state
            .positions
            .values()
            .filter(|p| p.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then_with(|| a.distributor_id.cmp(&b.distributor_id))
        });
        Ok(children)
    }

    async fn update_distributor_rank(
        &self,
        distributor_id: &str,
        rank_id: &str,
    ) -> StoreResult<()> {
        let mut state = self.state.write();
        let distributor = state
            .distributors
            .get_mut(distributor_id)
            .ok_or_else(|| StoreError::NotFound(format!("distributor {}", distributor_id)))?;
        distributor.rank = rank_id.to_string();
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.order(order_id))
    }

    async fn personal_volume(
        &self,
        distributor_id: &str,
        period: &QualifyingPeriod,
    ) -> StoreResult<Decimal> {
        let state = self.state.read();
        Ok(state
            .orders
            .values()
            .filter(|o| o.distributor_id == distributor_id)
            .filter(|o| o.payment_status == PaymentStatus::Paid)
            .filter(|o| period.contains(o.effective_date()))
            .map(|o| sum_commissionable_value(&o.items))
            .sum())
    }

    async fn mark_order_paid(&self, order_id: &str, paid_at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.write();
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))?;
        order.payment_status = PaymentStatus::Paid;
        order.status = OrderStatus::Processing;
        order.paid_at = Some(paid_at);
        Ok(())
    }

    async fn set_order_status(&self, order_id: &str, status: OrderStatus) -> StoreResult<()> {
        let mut state = self.state.write();
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))?;
        order.status = status;
        Ok(())
    }

    async fn commissions_for_order(&self, order_id: &str) -> StoreResult<Vec<CommissionRecord>> {
        let state = self.state.read();
        Ok(state
            .records
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn commissions_for_recipient(
        &self,
        recipient_id: &str,
        status: Option<CommissionStatus>,
    ) -> StoreResult<Vec<CommissionRecord>> {
        let state = self.state.read();
        Ok(state
            .records
            .iter()
            .filter(|r| r.recipient_id == recipient_id)
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect())
    }

    async fn get_commission_run(&self, order_id: &str) -> StoreResult<Option<CommissionRun>> {
        Ok(self.state.read().runs.get(order_id).cloned())
    }

    async fn has_rank_achievement(
        &self,
        distributor_id: &str,
        rank_id: &str,
    ) -> StoreResult<bool> {
        let state = self.state.read();
        Ok(state
            .achievements
            .iter()
            .any(|a| a.distributor_id == distributor_id && a.rank_id == rank_id))
    }

    async fn commit_batch(&self, mut batch: CommissionBatch) -> StoreResult<CommissionBatch> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Database(format!(
                "commit rejected for order {}",
                batch.order_id()
            )));
        }

        let mut state = self.state.write();
        if state.runs.contains_key(batch.order_id()) {
            return Err(StoreError::Conflict(format!(
                "commissions already recorded for order {}",
                batch.order_id()
            )));
        }

        // Another order may have awarded the same rank since the batch was built
        let held: Vec<(String, String)> = batch
            .achievements
            .iter()
            .filter(|a| {
                state
                    .achievements
                    .iter()
                    .any(|h| h.distributor_id == a.distributor_id && h.rank_id == a.rank_id)
            })
            .map(|a| (a.distributor_id.clone(), a.rank_id.clone()))
            .collect();
        for (distributor_id, rank_id) in held {
            tracing::info!(
                order_id = %batch.order_id(),
                distributor_id = %distributor_id,
                rank = %rank_id,
                "Rank already awarded by a concurrent run, dropping its bonus"
            );
            batch.drop_achievement(&distributor_id, &rank_id);
        }

        state.records.extend(batch.records.iter().cloned());
        state.achievements.extend(batch.achievements.iter().cloned());
        state
            .runs
            .insert(batch.run.order_id.clone(), batch.run.clone());
        Ok(batch)
    }

    async fn load_rule_set(&self) -> StoreResult<Option<RuleSetConfig>> {
        match &self.state.read().rule_set {
            Some(Ok(config)) => Ok(Some(config.clone())),
            Some(Err(detail)) => Err(StoreError::MalformedRuleSet(detail.clone())),
            None => Ok(None),
        }
    }
}

//! Per-order commission pipeline
//!
//! 1. Idempotency guard: an order with a recorded run is never paid twice
//! 2. Retail commission to the purchasing (or storefront) distributor
//! 3. Matrix bonuses up the placement chain, gated by rank depth and qualification
//! 4. One-time rank bonuses for uplines promoted by this order's volume
//! 5. Matching bonuses to the sponsors of every matrix bonus recipient
//! 6. Atomic commit of the whole batch
//!
//! Fatal problems abort with nothing written. A broken individual link only
//! drops that line and is reported in [`CalculationResult::skipped`].

use crate::config::EngineConfig;
use crate::error::{CommissionError, CommissionResult};
use crate::genealogy::{GenealogyWalker, UplineChain};
use crate::money::{round_cents, sum_commissionable_value};
use crate::rank::RankStats;
use crate::rules::RuleSet;
use crate::store::{CommissionBatch, CommissionRun, CommissionStore, StoreError};
use crate::types::{
    CommissionKind, CommissionRecord, CommissionStatus, Distributor, Order, PaymentStatus,
    QualifyingPeriod, RankAchievement,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationOutcome {
    Created,
    /// Commissions already existed, nothing new was written
    AlreadyProcessed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The upline above this level has no matrix position
    BrokenLink,
    /// A matrix position points at a missing distributor row
    MissingDistributor,
    /// The upline's rank does not unlock this level
    RankLocked,
    /// Inactive, or autoship below the minimum
    NotQualified,
    /// Sponsor reference points at a missing distributor row
    MissingSponsor,
}

/// A commission line that was not paid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedLine {
    pub kind: CommissionKind,
    pub level: Option<u8>,
    pub distributor_id: Option<String>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub order_id: String,
    pub outcome: CalculationOutcome,
    /// The order's commission records, new or pre-existing
    pub records: Vec<CommissionRecord>,
    /// Records written by this invocation
    pub created_count: usize,
    pub total_amount: Decimal,
    pub skipped: Vec<SkippedLine>,
    pub rule_set_version: Option<i32>,
}

impl CalculationResult {
    fn already_processed(order_id: &str, records: Vec<CommissionRecord>) -> Self {
        Self {
            order_id: order_id.to_string(),
            outcome: CalculationOutcome::AlreadyProcessed,
            total_amount: records.iter().map(|r| r.amount).sum(),
            records,
            created_count: 0,
            skipped: Vec::new(),
            rule_set_version: None,
        }
    }

    pub fn is_already_processed(&self) -> bool {
        self.outcome == CalculationOutcome::AlreadyProcessed
    }
}

/// Accumulates one order's batch while the pipeline runs
struct BatchBuilder<'a> {
    order: &'a Order,
    now: DateTime<Utc>,
    records: Vec<CommissionRecord>,
    achievements: Vec<RankAchievement>,
    skipped: Vec<SkippedLine>,
}

impl<'a> BatchBuilder<'a> {
    fn new(order: &'a Order) -> Self {
        Self {
            order,
            now: Utc::now(),
            records: Vec::new(),
            achievements: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Round and add a record, zero amounts are dropped
    fn credit(
        &mut self,
        recipient_id: &str,
        source_distributor_id: &str,
        amount: Decimal,
        kind: CommissionKind,
        level: Option<u8>,
        rank_id: Option<&str>,
    ) -> Option<Decimal> {
        let amount = round_cents(amount);
        if amount <= Decimal::ZERO {
            return None;
        }

        self.records.push(CommissionRecord {
            id: crate::create_id(),
            recipient_id: recipient_id.to_string(),
            order_id: self.order.id.clone(),
            source_distributor_id: source_distributor_id.to_string(),
            amount,
            kind,
            level,
            rank_id: rank_id.map(str::to_string),
            status: CommissionStatus::Pending,
            created_at: self.now,
        });
        Some(amount)
    }

    fn skip(
        &mut self,
        kind: CommissionKind,
        level: Option<u8>,
        distributor_id: Option<&str>,
        reason: SkipReason,
    ) {
        tracing::warn!(
            order_id = %self.order.id,
            kind = %kind,
            level = ?level,
            distributor_id = ?distributor_id,
            reason = ?reason,
            "Commission line skipped"
        );
        self.skipped.push(SkippedLine {
            kind,
            level,
            distributor_id: distributor_id.map(str::to_string),
            reason,
        });
    }
}

#[derive(Debug, Clone)]
pub struct CommissionCalculator {
    store: Arc<dyn CommissionStore>,
    config: EngineConfig,
}

impl CommissionCalculator {
    pub fn new(store: Arc<dyn CommissionStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CommissionStore> {
        &self.store
    }

    /// Load and validate the active rule set
    pub async fn load_rule_set(&self) -> CommissionResult<RuleSet> {
        let config = match self.store.load_rule_set().await {
            Ok(Some(config)) => config,
            Ok(None) => return Err(CommissionError::not_found("rule set", "active")),
            Err(StoreError::MalformedRuleSet(detail)) => {
                return Err(CommissionError::InvalidRuleSet(detail));
            }
            Err(e) => return Err(e.into()),
        };
        RuleSet::from_config(config)
    }

    /// Run the pipeline for a paid order
    #[tracing::instrument(name = "commission.calculate", skip(self), fields(backend = self.store.backend_name()))]
    pub async fn calculate(&self, order_id: &str) -> CommissionResult<CalculationResult> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| CommissionError::not_found("order", order_id))?;

        if let Some(prior) = self.prior_result(order_id).await? {
            tracing::info!(
                order_id = %order_id,
                records = prior.records.len(),
                "Commissions already processed for order"
            );
            return Ok(prior);
        }

        if order.payment_status != PaymentStatus::Paid {
            return Err(CommissionError::OrderNotPaid {
                order_id: order.id,
                status: order.payment_status,
            });
        }

        let rules = self.load_rule_set().await?;
        let (batch, skipped) = self.build_batch(&order, &rules).await?;

        let written = match self.store.commit_batch(batch).await {
            Ok(written) => written,
            Err(StoreError::Conflict(detail)) => {
                tracing::info!(
                    order_id = %order_id,
                    detail = %detail,
                    "Concurrent run won the commit, treating as processed"
                );
                let existing = self.store.commissions_for_order(order_id).await?;
                return Ok(CalculationResult::already_processed(order_id, existing));
            }
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Commission batch commit failed");
                return Err(e.into());
            }
        };
        let created_count = written.records.len();
        let total_amount = written.run.total_amount;

        tracing::info!(
            order_id = %order_id,
            records = created_count,
            total = %total_amount,
            skipped = skipped.len(),
            rule_set_version = rules.version(),
            "Commissions created"
        );

        Ok(CalculationResult {
            order_id: order_id.to_string(),
            outcome: CalculationOutcome::Created,
            records: written.records,
            created_count,
            total_amount,
            skipped,
            rule_set_version: Some(rules.version()),
        })
    }

    async fn prior_result(&self, order_id: &str) -> CommissionResult<Option<CalculationResult>> {
        let records = self.store.commissions_for_order(order_id).await?;
        if !records.is_empty() || self.store.get_commission_run(order_id).await?.is_some() {
            return Ok(Some(CalculationResult::already_processed(order_id, records)));
        }
        Ok(None)
    }

    async fn build_batch(
        &self,
        order: &Order,
        rules: &RuleSet,
    ) -> CommissionResult<(CommissionBatch, Vec<SkippedLine>)> {
        let cv = sum_commissionable_value(&order.items);
        let mut batch = BatchBuilder::new(order);

        if order.is_retail_customer_order() {
            tracing::debug!(
                order_id = %order.id,
                storefront = %order.distributor_id,
                "Retail customer order, crediting the storefront owner"
            );
        }

        batch.credit(
            &order.distributor_id,
            &order.distributor_id,
            cv * rules.retail_rate(),
            CommissionKind::Retail,
            None,
            None,
        );

        let walker =
            GenealogyWalker::new(self.store.clone()).with_matrix_width(rules.matrix_width());
        let chain = walker
            .upline_chain(&order.distributor_id, rules.matrix_depth())
            .await?;

        let matrix_paid = Self::matrix_bonuses(&chain, cv, order, rules, &mut batch);
        self.rank_bonuses(&walker, &chain, cv, order, rules, &mut batch)
            .await?;
        for (recipient, bonus) in &matrix_paid {
            self.matching_bonuses(recipient, *bonus, rules, &mut batch)
                .await?;
        }

        let total_amount: Decimal = batch.records.iter().map(|r| r.amount).sum();
        let run = CommissionRun {
            order_id: order.id.clone(),
            record_count: batch.records.len() as u32,
            total_amount,
            rule_set_version: rules.version(),
            created_at: batch.now,
        };

        Ok((
            CommissionBatch {
                run,
                records: batch.records,
                achievements: batch.achievements,
            },
            batch.skipped,
        ))
    }

    /// Credit matrix levels, returning each paid upline with its rounded bonus
    fn matrix_bonuses(
        chain: &UplineChain,
        cv: Decimal,
        order: &Order,
        rules: &RuleSet,
        batch: &mut BatchBuilder<'_>,
    ) -> Vec<(Distributor, Decimal)> {
        let paid_levels = rules.paid_matrix_levels();
        let mut paid = Vec::new();

        for entry in chain.entries.iter().filter(|e| e.level <= paid_levels) {
            let Some(rate) = rules.matrix_rate(entry.level) else {
                continue;
            };
            let Some(upline) = &entry.distributor else {
                batch.skip(
                    CommissionKind::Matrix,
                    Some(entry.level),
                    Some(entry.distributor_id.as_str()),
                    SkipReason::MissingDistributor,
                );
                continue;
            };

            let rank = rules.resolve_rank(&upline.rank);
            if !rank.unlocks_level(entry.level) {
                batch.skip(
                    CommissionKind::Matrix,
                    Some(entry.level),
                    Some(upline.id.as_str()),
                    SkipReason::RankLocked,
                );
                continue;
            }
            if !rules.is_qualified(upline) {
                batch.skip(
                    CommissionKind::Matrix,
                    Some(entry.level),
                    Some(upline.id.as_str()),
                    SkipReason::NotQualified,
                );
                continue;
            }

            if let Some(amount) = batch.credit(
                &upline.id,
                &order.distributor_id,
                cv * rate,
                CommissionKind::Matrix,
                Some(entry.level),
                None,
            ) {
                paid.push((upline.clone(), amount));
            }
        }

        if let Some(broken_at) = chain.broken_at {
            for level in broken_at.saturating_add(1)..=paid_levels {
                batch.skip(
                    CommissionKind::Matrix,
                    Some(level),
                    None,
                    SkipReason::BrokenLink,
                );
            }
        }

        paid
    }

    /// Award every rank an upline gained because this order's volume now
    /// counts towards their team
    async fn rank_bonuses(
        &self,
        walker: &GenealogyWalker,
        chain: &UplineChain,
        cv: Decimal,
        order: &Order,
        rules: &RuleSet,
        batch: &mut BatchBuilder<'_>,
    ) -> CommissionResult<()> {
        if cv <= Decimal::ZERO {
            return Ok(());
        }

        let depth = self.config.downline_depth;
        let period = QualifyingPeriod::ending_at(
            order.effective_date(),
            self.config.qualifying_period_days,
        );

        for entry in &chain.entries {
            // The order only shows up in downlines that reach the purchaser
            if u32::from(entry.level) > depth {
                break;
            }
            // No row to promote, or no position to expand a downline from
            if entry.distributor.is_none() || chain.broken_at == Some(entry.level) {
                continue;
            }

            let tree = walker
                .downline_tree(&entry.distributor_id, depth, &period)
                .await?;
            let after = tree.stats();

            // The direct child of this upline on the path to the purchaser
            let leg_id = if entry.level == 1 {
                order.distributor_id.as_str()
            } else {
                match chain.get(entry.level - 1) {
                    Some(below) => below.distributor_id.as_str(),
                    None => continue,
                }
            };
            let leg_volume = tree
                .child(leg_id)
                .map(|leg| leg.team_volume)
                .unwrap_or_default();
            let leg_was_idle = leg_volume > Decimal::ZERO && leg_volume - cv <= Decimal::ZERO;

            let before = RankStats {
                personal_sales: after.personal_sales,
                team_volume: (after.team_volume - cv).max(Decimal::ZERO),
                active_legs: after.active_legs.saturating_sub(u32::from(leg_was_idle)),
            };

            let before_rank = rules.rank_for_stats(&before).ordinal;
            let after_rank = rules.rank_for_stats(&after).ordinal;
            if after_rank <= before_rank {
                continue;
            }

            for rank in &rules.ranks()[before_rank + 1..=after_rank] {
                if self
                    .store
                    .has_rank_achievement(&entry.distributor_id, &rank.id)
                    .await?
                {
                    tracing::debug!(
                        distributor_id = %entry.distributor_id,
                        rank = %rank.id,
                        "Rank already achieved, no bonus"
                    );
                    continue;
                }

                tracing::info!(
                    order_id = %order.id,
                    distributor_id = %entry.distributor_id,
                    rank = %rank.id,
                    "Rank achieved"
                );
                batch.achievements.push(RankAchievement {
                    id: crate::create_id(),
                    distributor_id: entry.distributor_id.clone(),
                    rank_id: rank.id.clone(),
                    order_id: Some(order.id.clone()),
                    achieved_at: batch.now,
                });
                batch.credit(
                    &entry.distributor_id,
                    &order.distributor_id,
                    rank.bonus,
                    CommissionKind::RankBonus,
                    None,
                    Some(rank.id.as_str()),
                );
            }
        }

        Ok(())
    }

    /// Pay each sponsor generation above a matrix bonus recipient
    async fn matching_bonuses(
        &self,
        recipient: &Distributor,
        bonus: Decimal,
        rules: &RuleSet,
        batch: &mut BatchBuilder<'_>,
    ) -> CommissionResult<()> {
        // The rule set bounds the walk, the visited set catches cycles within it
        let mut visited = HashSet::from([recipient.id.clone()]);
        let mut current = recipient.clone();

        for (index, rate) in rules.matching_rates().iter().enumerate() {
            let generation = index as u8 + 1;
            let Some(sponsor_id) = current.sponsor_id.clone() else {
                break;
            };

            if !visited.insert(sponsor_id.clone()) {
                return Err(CommissionError::corrupt(
                    sponsor_id,
                    format!("sponsor chain above {} revisits a distributor", recipient.id),
                ));
            }

            let Some(sponsor) = self.store.get_distributor(&sponsor_id).await? else {
                batch.skip(
                    CommissionKind::Matching,
                    Some(generation),
                    Some(sponsor_id.as_str()),
                    SkipReason::MissingSponsor,
                );
                break;
            };

            if rules.is_qualified(&sponsor) {
                batch.credit(
                    &sponsor.id,
                    &recipient.id,
                    bonus * rate,
                    CommissionKind::Matching,
                    Some(generation),
                    None,
                );
            } else {
                batch.skip(
                    CommissionKind::Matching,
                    Some(generation),
                    Some(sponsor.id.as_str()),
                    SkipReason::NotQualified,
                );
            }

            current = sponsor;
        }

        Ok(())
    }
}

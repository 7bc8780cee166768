//! End-to-end tests for the commission pipeline against the in-memory store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use async_trait::async_trait;
use matrix_commission::{
    CalculationOutcome, CommissionBatch, CommissionCalculator, CommissionError, CommissionKind,
    CommissionRecord, CommissionRun, CommissionStatus, CommissionStore, Distributor,
    DistributorStatus, EngineConfig, InMemoryCommissionStore, LineItem, MatrixPosition, Order,
    OrderStatus, PaymentStatus, QualifyingPeriod, RankAchievement, RankConfig, RuleSetConfig,
    SkipReason, StoreResult,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;

fn paid_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap()
}

fn rank(id: &str, team: Decimal, legs: u32, unlocked: u8, bonus: Decimal) -> RankConfig {
    RankConfig {
        id: id.to_string(),
        name: None,
        min_personal_sales: Decimal::ZERO,
        min_team_volume: team,
        min_active_legs: legs,
        unlocked_depth: unlocked,
        bonus,
    }
}

fn scenario_rules() -> RuleSetConfig {
    RuleSetConfig {
        version: 7,
        retail_rate: dec!(0.25),
        matrix_rates: vec![dec!(0.10), dec!(0.05)],
        matching_rates: vec![dec!(0.10)],
        min_autoship: dec!(50),
        matrix_width: 5,
        matrix_depth: 9,
        ranks: vec![
            rank("member", dec!(0), 0, 1, dec!(0)),
            rank("builder", dec!(0), 0, 2, dec!(0)),
        ],
    }
}

fn distributor(id: &str, sponsor: Option<&str>, rank: &str) -> Distributor {
    Distributor {
        id: id.to_string(),
        sponsor_id: sponsor.map(str::to_string),
        rank: rank.to_string(),
        status: DistributorStatus::Active,
        autoship_active: true,
        autoship_amount: dec!(100),
        email: None,
    }
}

fn place(store: &InMemoryCommissionStore, id: &str, parent: Option<&str>, level: u32) {
    store.insert_position(MatrixPosition {
        distributor_id: id.to_string(),
        parent_id: parent.map(str::to_string),
        level,
        position: 1,
    });
}

fn order(id: &str, owner: &str, cv: Decimal, at: DateTime<Utc>) -> Order {
    Order {
        id: id.to_string(),
        distributor_id: owner.to_string(),
        customer_id: None,
        items: vec![LineItem {
            product_id: "starter-kit".to_string(),
            quantity: 1,
            unit_price: cv + dec!(20),
            commissionable_value: cv,
        }],
        total: cv + dec!(20),
        payment_status: PaymentStatus::Paid,
        status: OrderStatus::Processing,
        paid_at: Some(at),
        created_at: at - Duration::minutes(5),
    }
}

/// grandparent -> parent -> buyer, sponsors mirroring the placement
fn scenario_store() -> Arc<InMemoryCommissionStore> {
    let store = Arc::new(InMemoryCommissionStore::new());
    store.insert_distributor(distributor("grandparent", None, "builder"));
    store.insert_distributor(distributor("parent", Some("grandparent"), "builder"));
    store.insert_distributor(distributor("buyer", Some("parent"), "member"));
    place(&store, "grandparent", None, 1);
    place(&store, "parent", Some("grandparent"), 2);
    place(&store, "buyer", Some("parent"), 3);
    store.insert_order(order("order-1", "buyer", dec!(100.00), paid_at()));
    store.set_rule_set(scenario_rules());
    store
}

fn calculator(store: &Arc<InMemoryCommissionStore>) -> CommissionCalculator {
    CommissionCalculator::new(store.clone(), EngineConfig::default())
}

fn amount_for(
    records: &[matrix_commission::CommissionRecord],
    recipient: &str,
    kind: CommissionKind,
) -> Option<Decimal> {
    records
        .iter()
        .find(|r| r.recipient_id == recipient && r.kind == kind)
        .map(|r| r.amount)
}

#[tokio::test]
async fn hundred_dollar_order_pays_retail_matrix_and_matching() {
    let store = scenario_store();
    let result = calculator(&store).calculate("order-1").await.unwrap();

    assert_eq!(result.outcome, CalculationOutcome::Created);
    assert_eq!(result.created_count, 4);
    assert_eq!(result.total_amount, dec!(41.00));
    assert_eq!(result.rule_set_version, Some(7));
    assert!(result.skipped.is_empty());

    let records = store.records();
    assert_eq!(amount_for(&records, "buyer", CommissionKind::Retail), Some(dec!(25.00)));
    assert_eq!(amount_for(&records, "parent", CommissionKind::Matrix), Some(dec!(10.00)));
    assert_eq!(amount_for(&records, "grandparent", CommissionKind::Matrix), Some(dec!(5.00)));
    assert_eq!(amount_for(&records, "grandparent", CommissionKind::Matching), Some(dec!(1.00)));

    let parent_matrix = records
        .iter()
        .find(|r| r.recipient_id == "parent" && r.kind == CommissionKind::Matrix)
        .unwrap();
    assert_eq!(parent_matrix.level, Some(1));
    assert_eq!(parent_matrix.source_distributor_id, "buyer");

    let matching = records
        .iter()
        .find(|r| r.kind == CommissionKind::Matching)
        .unwrap();
    assert_eq!(matching.source_distributor_id, "parent");
    assert_eq!(matching.level, Some(1));
}

#[tokio::test]
async fn reinvoking_same_order_is_already_processed() {
    let store = scenario_store();
    let calculator = calculator(&store);

    let first = calculator.calculate("order-1").await.unwrap();
    let second = calculator.calculate("order-1").await.unwrap();

    assert_eq!(second.outcome, CalculationOutcome::AlreadyProcessed);
    assert!(second.is_already_processed());
    assert_eq!(second.created_count, 0);
    assert_eq!(second.total_amount, first.total_amount);
    assert_eq!(store.records().len(), 4);
    assert_eq!(store.run_count(), 1);

    let mut first_ids: Vec<_> = first.records.iter().map(|r| r.id.clone()).collect();
    let mut second_ids: Vec<_> = second.records.iter().map(|r| r.id.clone()).collect();
    first_ids.sort();
    second_ids.sort();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn concurrent_duplicate_invocations_create_one_batch() {
    let store = scenario_store();
    let calculator = calculator(&store);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let calculator = calculator.clone();
            tokio::spawn(async move { calculator.calculate("order-1").await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        if result.outcome == CalculationOutcome::Created {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(store.records().len(), 4);
    assert_eq!(store.run_count(), 1);
}

#[tokio::test]
async fn disqualified_upline_receives_no_matrix_bonus() {
    let store = scenario_store();
    let mut parent = distributor("parent", Some("grandparent"), "builder");
    parent.autoship_amount = dec!(20);
    store.insert_distributor(parent);

    let result = calculator(&store).calculate("order-1").await.unwrap();
    let records = store.records();

    assert_eq!(amount_for(&records, "parent", CommissionKind::Matrix), None);
    assert_eq!(amount_for(&records, "grandparent", CommissionKind::Matrix), Some(dec!(5.00)));
    // No matrix bonus for parent means nothing to match
    assert_eq!(amount_for(&records, "grandparent", CommissionKind::Matching), None);
    assert_eq!(result.total_amount, dec!(30.00));
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].reason, SkipReason::NotQualified);
    assert_eq!(result.skipped[0].level, Some(1));
}

#[tokio::test]
async fn inactive_sponsor_receives_no_matching_bonus() {
    let store = scenario_store();
    let mut grandparent = distributor("grandparent", None, "builder");
    grandparent.status = DistributorStatus::Inactive;
    store.insert_distributor(grandparent);

    let result = calculator(&store).calculate("order-1").await.unwrap();

    assert_eq!(result.total_amount, dec!(35.00));
    let reasons: Vec<_> = result.skipped.iter().map(|s| (s.kind, s.reason)).collect();
    assert!(reasons.contains(&(CommissionKind::Matrix, SkipReason::NotQualified)));
    assert!(reasons.contains(&(CommissionKind::Matching, SkipReason::NotQualified)));
}

#[tokio::test]
async fn rank_locked_level_is_skipped() {
    let store = scenario_store();
    store.insert_distributor(distributor("grandparent", None, "member"));

    let result = calculator(&store).calculate("order-1").await.unwrap();

    assert_eq!(
        amount_for(&store.records(), "grandparent", CommissionKind::Matrix),
        None
    );
    assert_eq!(result.skipped[0].reason, SkipReason::RankLocked);
    assert_eq!(result.skipped[0].level, Some(2));
    // Matching on the parent's level 1 bonus is still paid
    assert_eq!(result.total_amount, dec!(36.00));
}

#[tokio::test]
async fn unknown_rank_is_treated_as_base() {
    let store = scenario_store();
    store.insert_distributor(distributor("grandparent", None, "retired-title"));

    let result = calculator(&store).calculate("order-1").await.unwrap();
    assert!(
        result
            .skipped
            .iter()
            .any(|s| s.reason == SkipReason::RankLocked && s.level == Some(2))
    );
}

#[tokio::test]
async fn broken_link_skips_only_unreachable_levels() {
    let store = Arc::new(InMemoryCommissionStore::new());
    store.insert_distributor(distributor("parent", None, "builder"));
    store.insert_distributor(distributor("buyer", Some("parent"), "member"));
    // parent has no matrix position of its own
    place(&store, "buyer", Some("parent"), 3);
    store.insert_order(order("order-1", "buyer", dec!(100), paid_at()));
    store.set_rule_set(scenario_rules());

    let result = calculator(&store).calculate("order-1").await.unwrap();

    assert_eq!(result.outcome, CalculationOutcome::Created);
    assert_eq!(result.total_amount, dec!(35.00));
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].reason, SkipReason::BrokenLink);
    assert_eq!(result.skipped[0].level, Some(2));
}

#[tokio::test]
async fn missing_upline_row_skips_that_level() {
    let store = scenario_store();
    let store_without_parent = Arc::new(InMemoryCommissionStore::new());
    store_without_parent.insert_distributor(store.distributor("grandparent").unwrap());
    store_without_parent.insert_distributor(store.distributor("buyer").unwrap());
    place(&store_without_parent, "grandparent", None, 1);
    place(&store_without_parent, "parent", Some("grandparent"), 2);
    place(&store_without_parent, "buyer", Some("parent"), 3);
    store_without_parent.insert_order(order("order-1", "buyer", dec!(100), paid_at()));
    store_without_parent.set_rule_set(scenario_rules());

    let result = calculator(&store_without_parent)
        .calculate("order-1")
        .await
        .unwrap();

    assert_eq!(result.skipped[0].reason, SkipReason::MissingDistributor);
    assert_eq!(result.total_amount, dec!(30.00));
}

#[tokio::test]
async fn missing_purchaser_position_is_fatal() {
    let store = Arc::new(InMemoryCommissionStore::new());
    store.insert_distributor(distributor("buyer", None, "member"));
    store.insert_order(order("order-1", "buyer", dec!(100), paid_at()));
    store.set_rule_set(scenario_rules());

    let err = calculator(&store).calculate("order-1").await.unwrap_err();

    assert!(matches!(err, CommissionError::NotFound { entity: "matrix position", .. }));
    assert!(store.records().is_empty());
    assert_eq!(store.run_count(), 0);
}

#[tokio::test]
async fn missing_order_and_rule_set_are_not_found() {
    let store = scenario_store();
    let err = calculator(&store).calculate("nope").await.unwrap_err();
    assert!(matches!(err, CommissionError::NotFound { entity: "order", .. }));

    let store = Arc::new(InMemoryCommissionStore::new());
    store.insert_order(order("order-1", "buyer", dec!(100), paid_at()));
    let err = calculator(&store).calculate("order-1").await.unwrap_err();
    assert!(matches!(err, CommissionError::NotFound { entity: "rule set", .. }));
}

#[tokio::test]
async fn unpaid_order_is_rejected() {
    let store = scenario_store();
    let mut pending = order("order-2", "buyer", dec!(100), paid_at());
    pending.payment_status = PaymentStatus::Pending;
    pending.paid_at = None;
    store.insert_order(pending);

    let err = calculator(&store).calculate("order-2").await.unwrap_err();
    assert!(matches!(
        err,
        CommissionError::OrderNotPaid {
            status: PaymentStatus::Pending,
            ..
        }
    ));
}

#[tokio::test]
async fn invalid_rule_set_blocks_calculation() {
    let store = scenario_store();
    let mut rules = scenario_rules();
    rules.matrix_rates = vec![dec!(0.8), dec!(0.3)];
    store.set_rule_set(rules);

    let err = calculator(&store).calculate("order-1").await.unwrap_err();
    assert!(matches!(err, CommissionError::InvalidRuleSet(_)));
    assert!(store.records().is_empty());
}

#[tokio::test]
async fn undecodable_stored_rule_set_is_invalid() {
    let store = scenario_store();
    store.set_raw_rule_set(json!({
        "retail_rate": "0.25",
        "matrix_rates": "ten percent",
        "ranks": [],
    }));

    let err = calculator(&store).calculate("order-1").await.unwrap_err();

    assert!(matches!(err, CommissionError::InvalidRuleSet(_)));
    assert!(store.records().is_empty());
    assert_eq!(store.run_count(), 0);
}

#[tokio::test]
async fn cyclic_matrix_is_corrupt_and_writes_nothing() {
    let store = scenario_store();
    place(&store, "grandparent", Some("buyer"), 1);

    let err = calculator(&store).calculate("order-1").await.unwrap_err();

    assert!(matches!(err, CommissionError::CorruptGenealogy { .. }));
    assert!(store.records().is_empty());
    assert_eq!(store.run_count(), 0);
}

#[tokio::test]
async fn cyclic_sponsor_chain_is_corrupt_and_writes_nothing() {
    let store = scenario_store();
    // Placement stays a tree, only the sponsor references loop
    store.insert_distributor(distributor("grandparent", Some("parent"), "builder"));
    let mut rules = scenario_rules();
    rules.matching_rates = vec![dec!(0.10), dec!(0.05)];
    store.set_rule_set(rules);

    let err = calculator(&store).calculate("order-1").await.unwrap_err();

    assert!(matches!(err, CommissionError::CorruptGenealogy { .. }));
    assert!(store.records().is_empty());
    assert!(store.achievements().is_empty());
    assert_eq!(store.run_count(), 0);
}

#[tokio::test]
async fn matching_continues_past_an_unqualified_sponsor() {
    let store = scenario_store();
    // "great" sponsors grandparent but holds no matrix position
    store.insert_distributor(distributor("great", None, "builder"));
    let mut grandparent = distributor("grandparent", Some("great"), "builder");
    grandparent.status = DistributorStatus::Inactive;
    store.insert_distributor(grandparent);
    let mut rules = scenario_rules();
    rules.matching_rates = vec![dec!(0.10), dec!(0.05)];
    store.set_rule_set(rules);

    let result = calculator(&store).calculate("order-1").await.unwrap();
    let records = store.records();

    assert_eq!(amount_for(&records, "parent", CommissionKind::Matrix), Some(dec!(10.00)));
    assert_eq!(amount_for(&records, "grandparent", CommissionKind::Matching), None);
    let matching = records
        .iter()
        .find(|r| r.kind == CommissionKind::Matching)
        .unwrap();
    assert_eq!(matching.recipient_id, "great");
    assert_eq!(matching.amount, dec!(0.50));
    assert_eq!(matching.level, Some(2));
    assert_eq!(matching.source_distributor_id, "parent");
    assert_eq!(result.total_amount, dec!(35.50));

    let skips: Vec<_> = result
        .skipped
        .iter()
        .map(|s| (s.kind, s.level, s.reason))
        .collect();
    assert!(skips.contains(&(CommissionKind::Matrix, Some(2), SkipReason::NotQualified)));
    assert!(skips.contains(&(CommissionKind::Matching, Some(1), SkipReason::NotQualified)));
}

#[tokio::test]
async fn failed_commit_leaves_no_records_and_can_be_retried() {
    let store = scenario_store();
    let calculator = calculator(&store);

    store.set_fail_commits(true);
    let err = calculator.calculate("order-1").await.unwrap_err();
    assert!(matches!(err, CommissionError::Store(_)));
    assert!(store.records().is_empty());
    assert_eq!(store.run_count(), 0);

    store.set_fail_commits(false);
    let result = calculator.calculate("order-1").await.unwrap();
    assert_eq!(result.outcome, CalculationOutcome::Created);
    assert_eq!(store.records().len(), 4);
}

#[tokio::test]
async fn retail_customer_order_credits_storefront_owner() {
    let store = scenario_store();
    let mut retail = order("order-2", "parent", dec!(40), paid_at());
    retail.customer_id = Some("customer-9".to_string());
    store.insert_order(retail);

    let result = calculator(&store).calculate("order-2").await.unwrap();
    let retail_record = result
        .records
        .iter()
        .find(|r| r.kind == CommissionKind::Retail)
        .unwrap();

    assert_eq!(retail_record.recipient_id, "parent");
    assert_eq!(retail_record.amount, dec!(10.00));
    assert_eq!(
        amount_for(&result.records, "grandparent", CommissionKind::Matrix),
        Some(dec!(4.00))
    );
}

#[tokio::test]
async fn amounts_round_half_up_per_record() {
    let store = scenario_store();
    let mut rules = scenario_rules();
    rules.retail_rate = dec!(0.0375);
    store.set_rule_set(rules);
    store.insert_order(order("order-2", "buyer", dec!(33.33), paid_at()));

    let result = calculator(&store).calculate("order-2").await.unwrap();

    // 33.33 * 0.0375 = 1.249875
    assert_eq!(
        amount_for(&result.records, "buyer", CommissionKind::Retail),
        Some(dec!(1.25))
    );
    // 33.33 * 0.05 = 1.6665
    assert_eq!(
        amount_for(&result.records, "grandparent", CommissionKind::Matrix),
        Some(dec!(1.67))
    );
    for record in &result.records {
        assert_eq!(record.amount, record.amount.round_dp(2));
    }
}

#[tokio::test]
async fn zero_amount_lines_are_not_written() {
    let store = scenario_store();
    let mut rules = scenario_rules();
    rules.retail_rate = Decimal::ZERO;
    store.set_rule_set(rules);

    let result = calculator(&store).calculate("order-1").await.unwrap();

    assert!(result.records.iter().all(|r| r.kind != CommissionKind::Retail));
    assert_eq!(result.created_count, 3);
}

#[tokio::test]
async fn commissions_never_exceed_configured_rates() {
    let rules = RuleSetConfig {
        version: 1,
        retail_rate: dec!(0.2),
        matrix_rates: vec![dec!(0.1), dec!(0.07), dec!(0.05), dec!(0.03), dec!(0.02)],
        matching_rates: vec![dec!(0.15)],
        min_autoship: Decimal::ZERO,
        matrix_width: 5,
        matrix_depth: 9,
        ranks: vec![rank("all", dec!(0), 0, 9, dec!(0))],
    };
    let cv = dec!(87.77);
    let bound_rate = rules.retail_rate
        + rules.matrix_rates.iter().sum::<Decimal>()
        + rules.matching_rates[0];

    for depth in [0usize, 1, 3, 5, 8, 12] {
        let store = Arc::new(InMemoryCommissionStore::new());
        store.set_rule_set(rules.clone());
        store.insert_distributor(distributor("u0", None, "all"));
        place(&store, "u0", None, 1);
        for i in 1..=depth {
            let id = format!("u{}", i);
            let up = format!("u{}", i - 1);
            store.insert_distributor(distributor(&id, Some(&up), "all"));
            place(&store, &id, Some(&up), i as u32 + 1);
        }
        let buyer = format!("u{}", depth);
        store.insert_order(order("order-1", &buyer, cv, paid_at()));

        let result = calculator(&store).calculate("order-1").await.unwrap();
        let paid: Decimal = result
            .records
            .iter()
            .filter(|r| r.kind != CommissionKind::RankBonus)
            .map(|r| r.amount)
            .sum();
        // Each record may round up by at most half a cent
        let tolerance = dec!(0.005) * Decimal::from(result.records.len());

        assert!(
            paid <= cv * bound_rate + tolerance,
            "depth {}: paid {} over bound",
            depth,
            paid
        );
        let matrix_levels = result
            .records
            .iter()
            .filter(|r| r.kind == CommissionKind::Matrix)
            .count();
        assert_eq!(matrix_levels, depth.min(5));
    }
}

fn rank_bonus_store() -> Arc<InMemoryCommissionStore> {
    let store = scenario_store();
    let mut rules = scenario_rules();
    rules.ranks = vec![
        rank("member", dec!(0), 0, 2, dec!(0)),
        rank("bronze", dec!(100), 1, 2, dec!(50)),
        rank("silver", dec!(10000), 3, 2, dec!(500)),
    ];
    store.set_rule_set(rules);
    for id in ["grandparent", "parent", "buyer"] {
        let mut d = store.distributor(id).unwrap();
        d.rank = "member".to_string();
        store.insert_distributor(d);
    }
    store
}

#[tokio::test]
async fn rank_bonus_paid_once_when_order_promotes_uplines() {
    let store = rank_bonus_store();
    let calculator = calculator(&store);

    let result = calculator.calculate("order-1").await.unwrap();
    let bonuses: Vec<_> = result
        .records
        .iter()
        .filter(|r| r.kind == CommissionKind::RankBonus)
        .collect();

    assert_eq!(bonuses.len(), 2);
    assert!(bonuses.iter().all(|r| r.amount == dec!(50.00)));
    assert!(bonuses.iter().all(|r| r.rank_id.as_deref() == Some("bronze")));
    assert_eq!(store.achievements().len(), 2);

    // More volume keeps everyone at bronze, nothing new to award
    store.insert_order(order("order-2", "buyer", dec!(100), paid_at() + Duration::hours(1)));
    let result = calculator.calculate("order-2").await.unwrap();
    assert!(result.records.iter().all(|r| r.kind != CommissionKind::RankBonus));
    assert_eq!(store.achievements().len(), 2);
}

#[tokio::test]
async fn previously_achieved_rank_is_not_rewarded() {
    let store = rank_bonus_store();
    store.insert_achievement(RankAchievement {
        id: "history-1".to_string(),
        distributor_id: "grandparent".to_string(),
        rank_id: "bronze".to_string(),
        order_id: None,
        achieved_at: paid_at() - Duration::days(400),
    });

    let result = calculator(&store).calculate("order-1").await.unwrap();
    let bonuses: Vec<_> = result
        .records
        .iter()
        .filter(|r| r.kind == CommissionKind::RankBonus)
        .map(|r| r.recipient_id.as_str())
        .collect();

    assert_eq!(bonuses, vec!["parent"]);
}

#[tokio::test]
async fn uplines_beyond_downline_depth_gain_no_rank_from_order() {
    let store = rank_bonus_store();
    let calculator =
        CommissionCalculator::new(store.clone(), EngineConfig::default().with_downline_depth(1));

    let result = calculator.calculate("order-1").await.unwrap();
    let bonuses: Vec<_> = result
        .records
        .iter()
        .filter(|r| r.kind == CommissionKind::RankBonus)
        .map(|r| r.recipient_id.as_str())
        .collect();

    assert_eq!(bonuses, vec!["parent"]);
}

/// Lets other tasks run between the achievement lookup and the commit
#[derive(Debug)]
struct InterleavingStore {
    inner: Arc<InMemoryCommissionStore>,
}

#[async_trait]
impl CommissionStore for InterleavingStore {
    fn backend_name(&self) -> &'static str {
        "interleaving"
    }

    async fn get_distributor(&self, distributor_id: &str) -> StoreResult<Option<Distributor>> {
        self.inner.get_distributor(distributor_id).await
    }

    async fn get_matrix_position(
        &self,
        distributor_id: &str,
    ) -> StoreResult<Option<MatrixPosition>> {
        self.inner.get_matrix_position(distributor_id).await
    }

    async fn get_children(&self, parent_id: &str) -> StoreResult<Vec<MatrixPosition>> {
        self.inner.get_children(parent_id).await
    }

    async fn update_distributor_rank(
        &self,
        distributor_id: &str,
        rank_id: &str,
    ) -> StoreResult<()> {
        self.inner.update_distributor_rank(distributor_id, rank_id).await
    }

    async fn get_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        self.inner.get_order(order_id).await
    }

    async fn personal_volume(
        &self,
        distributor_id: &str,
        period: &QualifyingPeriod,
    ) -> StoreResult<Decimal> {
        self.inner.personal_volume(distributor_id, period).await
    }

    async fn mark_order_paid(&self, order_id: &str, paid_at: DateTime<Utc>) -> StoreResult<()> {
        self.inner.mark_order_paid(order_id, paid_at).await
    }

    async fn set_order_status(&self, order_id: &str, status: OrderStatus) -> StoreResult<()> {
        self.inner.set_order_status(order_id, status).await
    }

    async fn commissions_for_order(&self, order_id: &str) -> StoreResult<Vec<CommissionRecord>> {
        self.inner.commissions_for_order(order_id).await
    }

    async fn commissions_for_recipient(
        &self,
        recipient_id: &str,
        status: Option<CommissionStatus>,
    ) -> StoreResult<Vec<CommissionRecord>> {
        self.inner.commissions_for_recipient(recipient_id, status).await
    }

    async fn get_commission_run(&self, order_id: &str) -> StoreResult<Option<CommissionRun>> {
        self.inner.get_commission_run(order_id).await
    }

    async fn has_rank_achievement(
        &self,
        distributor_id: &str,
        rank_id: &str,
    ) -> StoreResult<bool> {
        let held = self.inner.has_rank_achievement(distributor_id, rank_id).await;
        tokio::task::yield_now().await;
        held
    }

    async fn commit_batch(&self, batch: CommissionBatch) -> StoreResult<CommissionBatch> {
        self.inner.commit_batch(batch).await
    }

    async fn load_rule_set(&self) -> StoreResult<Option<RuleSetConfig>> {
        self.inner.load_rule_set().await
    }
}

#[tokio::test]
async fn concurrent_orders_award_a_shared_rank_once() {
    let store = Arc::new(InMemoryCommissionStore::new());
    store.insert_distributor(distributor("parent", None, "member"));
    store.insert_distributor(distributor("b1", Some("parent"), "member"));
    store.insert_distributor(distributor("b2", Some("parent"), "member"));
    place(&store, "parent", None, 1);
    place(&store, "b1", Some("parent"), 2);
    place(&store, "b2", Some("parent"), 2);
    store.insert_order(order("o-b1", "b1", dec!(100), paid_at()));
    store.insert_order(order("o-b2", "b2", dec!(100), paid_at()));
    let mut rules = scenario_rules();
    rules.matrix_rates = vec![dec!(0.10)];
    rules.matching_rates = vec![];
    rules.ranks = vec![
        rank("member", dec!(0), 0, 1, dec!(0)),
        rank("bronze", dec!(150), 1, 1, dec!(50)),
    ];
    store.set_rule_set(rules);

    let interleaving = Arc::new(InterleavingStore {
        inner: store.clone(),
    });
    let calculator = CommissionCalculator::new(interleaving, EngineConfig::default());

    let (first, second) = tokio::join!(
        calculator.calculate("o-b1"),
        calculator.calculate("o-b2")
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    // Each order alone brings parent's team volume to 200, so both runs see bronze
    assert_eq!(first.outcome, CalculationOutcome::Created);
    assert_eq!(second.outcome, CalculationOutcome::Created);

    let bonuses: Vec<_> = store
        .records()
        .into_iter()
        .filter(|r| r.kind == CommissionKind::RankBonus)
        .collect();
    assert_eq!(bonuses.len(), 1);
    assert_eq!(bonuses[0].recipient_id, "parent");
    assert_eq!(bonuses[0].amount, dec!(50.00));
    assert_eq!(store.achievements().len(), 1);

    // The run that lost the race reports and records only what it wrote
    let reported: usize = [&first, &second]
        .iter()
        .map(|r| {
            r.records
                .iter()
                .filter(|c| c.kind == CommissionKind::RankBonus)
                .count()
        })
        .sum();
    assert_eq!(reported, 1);
    for result in [&first, &second] {
        let run = store.get_commission_run(&result.order_id).await.unwrap().unwrap();
        assert_eq!(run.record_count as usize, result.created_count);
        assert_eq!(run.total_amount, result.total_amount);
    }
    assert_eq!(first.total_amount + second.total_amount, dec!(120.00));
}

//! Rank evaluation from personal sales, team volume and active legs

use crate::error::CommissionResult;
use crate::genealogy::GenealogyWalker;
use crate::rules::{Rank, RuleSet};
use crate::store::CommissionStore;
use crate::types::QualifyingPeriod;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// Inputs to rank qualification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankStats {
    pub personal_sales: Decimal,
    pub team_volume: Decimal,
    pub active_legs: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankEvaluation {
    pub distributor_id: String,
    pub rank: Rank,
    pub stats: RankStats,
    pub period: QualifyingPeriod,
}

/// Computes ranks on demand, never persists them
#[derive(Debug, Clone)]
pub struct RankEvaluator {
    walker: GenealogyWalker,
    downline_depth: u32,
}

impl RankEvaluator {
    pub fn new(store: Arc<dyn CommissionStore>, downline_depth: u32) -> Self {
        Self {
            walker: GenealogyWalker::new(store),
            downline_depth,
        }
    }

    pub async fn stats_for(
        &self,
        distributor_id: &str,
        period: &QualifyingPeriod,
    ) -> CommissionResult<RankStats> {
        let tree = self
            .walker
            .downline_tree(distributor_id, self.downline_depth, period)
            .await?;
        Ok(tree.stats())
    }

    pub async fn evaluate(
        &self,
        distributor_id: &str,
        rules: &RuleSet,
        period: &QualifyingPeriod,
    ) -> CommissionResult<RankEvaluation> {
        let stats = self.stats_for(distributor_id, period).await?;
        let rank = rules.rank_for_stats(&stats).clone();

        tracing::debug!(
            distributor_id = %distributor_id,
            rank = %rank.id,
            personal_sales = %stats.personal_sales,
            team_volume = %stats.team_volume,
            active_legs = stats.active_legs,
            "Rank evaluated"
        );

        Ok(RankEvaluation {
            distributor_id: distributor_id.to_string(),
            rank,
            stats,
            period: *period,
        })
    }

    /// Rank id justified by the distributor's current data
    pub async fn evaluate_rank(
        &self,
        distributor_id: &str,
        rules: &RuleSet,
        period: &QualifyingPeriod,
    ) -> CommissionResult<String> {
        Ok(self.evaluate(distributor_id, rules, period).await?.rank.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCommissionStore;
    use crate::types::{
        Distributor, DistributorStatus, LineItem, MatrixPosition, Order, OrderStatus,
        PaymentStatus,
    };
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn rules() -> RuleSet {
        RuleSet::from_json_str(
            r#"{
                "retail_rate": "0.2",
                "matrix_rates": ["0.1"],
                "ranks": [
                    { "id": "r0", "unlocked_depth": 1 },
                    { "id": "r1", "min_personal_sales": "50", "min_team_volume": "200",
                      "min_active_legs": 1, "unlocked_depth": 3 },
                    { "id": "r2", "min_personal_sales": "100", "min_team_volume": "1000",
                      "min_active_legs": 2, "unlocked_depth": 5 },
                    { "id": "r3", "min_personal_sales": "150", "min_team_volume": "5000",
                      "min_active_legs": 4, "unlocked_depth": 9 }
                ]
            }"#,
        )
        .unwrap()
    }

    fn stats(personal: Decimal, team: Decimal, legs: u32) -> RankStats {
        RankStats {
            personal_sales: personal,
            team_volume: team,
            active_legs: legs,
        }
    }

    #[test]
    fn selected_rank_thresholds_are_all_met() {
        let rules = rules();
        let samples = [
            stats(dec!(0), dec!(0), 0),
            stats(dec!(60), dec!(250), 1),
            stats(dec!(120), dec!(999), 5),
            stats(dec!(500), dec!(9000), 4),
            stats(dec!(500), dec!(9000), 3),
        ];

        for s in samples {
            let rank = rules.rank_for_stats(&s);
            assert!(rank.ordinal == 0 || rank.is_met_by(&s), "{:?} -> {}", s, rank.id);
            // Nothing above the selected rank is met
            for higher in &rules.ranks()[rank.ordinal + 1..] {
                assert!(!higher.is_met_by(&s));
            }
        }
    }

    #[test]
    fn rank_is_monotonic_in_each_input() {
        let rules = rules();
        let personal = [dec!(0), dec!(49), dec!(50), dec!(100), dec!(150), dec!(1000)];
        let team = [dec!(0), dec!(200), dec!(1000), dec!(4999), dec!(5000)];
        let legs = [0u32, 1, 2, 3, 4, 8];

        for &t in &team {
            for &l in &legs {
                let mut last = 0;
                for &p in &personal {
                    let ordinal = rules.rank_for_stats(&stats(p, t, l)).ordinal;
                    assert!(ordinal >= last);
                    last = ordinal;
                }
            }
        }
        for &p in &personal {
            for &l in &legs {
                let mut last = 0;
                for &t in &team {
                    let ordinal = rules.rank_for_stats(&stats(p, t, l)).ordinal;
                    assert!(ordinal >= last);
                    last = ordinal;
                }
            }
        }
        for &p in &personal {
            for &t in &team {
                let mut last = 0;
                for &l in &legs {
                    let ordinal = rules.rank_for_stats(&stats(p, t, l)).ordinal;
                    assert!(ordinal >= last);
                    last = ordinal;
                }
            }
        }
    }

    fn seed(store: &InMemoryCommissionStore, id: &str, parent: Option<&str>, sales: Decimal) {
        store.insert_distributor(Distributor {
            id: id.to_string(),
            sponsor_id: parent.map(str::to_string),
            rank: "r0".to_string(),
            status: DistributorStatus::Active,
            autoship_active: true,
            autoship_amount: dec!(100),
            email: None,
        });
        store.insert_position(MatrixPosition {
            distributor_id: id.to_string(),
            parent_id: parent.map(str::to_string),
            level: if parent.is_some() { 2 } else { 1 },
            position: 1,
        });
        if sales > Decimal::ZERO {
            let at = Utc::now() - Duration::days(1);
            store.insert_order(Order {
                id: format!("{}-order", id),
                distributor_id: id.to_string(),
                customer_id: None,
                items: vec![LineItem {
                    product_id: "p".to_string(),
                    quantity: 1,
                    unit_price: sales,
                    commissionable_value: sales,
                }],
                total: sales,
                payment_status: PaymentStatus::Paid,
                status: OrderStatus::Completed,
                paid_at: Some(at),
                created_at: at,
            });
        }
    }

    #[tokio::test]
    async fn evaluate_rank_reads_sales_volume_and_legs_from_the_store() {
        let store = Arc::new(InMemoryCommissionStore::new());
        seed(&store, "root", None, dec!(120));
        seed(&store, "left", Some("root"), dec!(500));
        seed(&store, "right", Some("root"), dec!(400));

        let evaluator = RankEvaluator::new(store.clone(), 3);
        let period = QualifyingPeriod::ending_at(Utc::now(), 30);

        let evaluation = evaluator.evaluate("root", &rules(), &period).await.unwrap();
        assert_eq!(evaluation.stats, stats(dec!(120), dec!(1020), 2));
        assert_eq!(evaluation.rank.id, "r2");

        // Leaves have no legs, so personal sales alone cannot lift them
        let leaf = evaluator.evaluate_rank("left", &rules(), &period).await.unwrap();
        assert_eq!(leaf, "r0");

        // Evaluation never persists
        assert_eq!(store.distributor("root").unwrap().rank, "r0");
    }
}

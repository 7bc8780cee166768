//! Commission rule set: raw configuration and its validated form
//!
//! Rule sets arrive as loosely-typed JSON (a file, an environment variable or
//! a database row). They are parsed once into a [`RuleSet`] and rejected with
//! [`CommissionError::InvalidRuleSet`] before any calculation runs.

use crate::error::{CommissionError, CommissionResult};
use crate::rank::RankStats;
use crate::types::Distributor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Rank thresholds as configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub min_personal_sales: Decimal,
    #[serde(default)]
    pub min_team_volume: Decimal,
    #[serde(default)]
    pub min_active_legs: u32,
    /// Deepest matrix level this rank earns from
    pub unlocked_depth: u8,
    /// One-time bonus paid when the rank is first achieved
    #[serde(default)]
    pub bonus: Decimal,
}

/// Raw rule set configuration, rates as fractions in `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetConfig {
    #[serde(default = "default_version")]
    pub version: i32,
    pub retail_rate: Decimal,
    /// Index 0 is level 1 (the immediate parent)
    #[serde(default)]
    pub matrix_rates: Vec<Decimal>,
    /// Index 0 is the first sponsor generation
    #[serde(default)]
    pub matching_rates: Vec<Decimal>,
    /// Minimum monthly autoship to earn upline commissions
    #[serde(default)]
    pub min_autoship: Decimal,
    #[serde(default = "default_matrix_width")]
    pub matrix_width: u32,
    #[serde(default = "default_matrix_depth")]
    pub matrix_depth: u8,
    /// Ordered lowest to highest, the first entry is the base rank
    pub ranks: Vec<RankConfig>,
}

fn default_version() -> i32 {
    1
}
fn default_matrix_width() -> u32 {
    5
}
fn default_matrix_depth() -> u8 {
    9
}

/// A validated rank
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rank {
    pub id: String,
    pub name: String,
    /// Position in the rank ladder, 0 is the base rank
    pub ordinal: usize,
    pub min_personal_sales: Decimal,
    pub min_team_volume: Decimal,
    pub min_active_legs: u32,
    pub unlocked_depth: u8,
    pub bonus: Decimal,
}

impl Rank {
    pub fn is_met_by(&self, stats: &RankStats) -> bool {
        stats.personal_sales >= self.min_personal_sales
            && stats.team_volume >= self.min_team_volume
            && stats.active_legs >= self.min_active_legs
    }

    pub fn unlocks_level(&self, level: u8) -> bool {
        self.unlocked_depth >= level
    }
}

/// Validated, immutable rule set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSet {
    version: i32,
    retail_rate: Decimal,
    matrix_rates: Vec<Decimal>,
    matching_rates: Vec<Decimal>,
    min_autoship: Decimal,
    matrix_width: u32,
    matrix_depth: u8,
    ranks: Vec<Rank>,
}

fn invalid(msg: impl Into<String>) -> CommissionError {
    CommissionError::InvalidRuleSet(msg.into())
}

fn check_rate(name: &str, rate: Decimal) -> CommissionResult<()> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(invalid(format!("{} must be within [0, 1], got {}", name, rate)));
    }
    Ok(())
}

fn check_non_negative(name: &str, value: Decimal) -> CommissionResult<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(invalid(format!("{} must not be negative, got {}", name, value)));
    }
    Ok(())
}

impl RuleSet {
    pub fn from_config(config: RuleSetConfig) -> CommissionResult<Self> {
        check_rate("retail_rate", config.retail_rate)?;

        if config.matrix_width == 0 {
            return Err(invalid("matrix_width must be at least 1"));
        }
        if config.matrix_depth == 0 {
            return Err(invalid("matrix_depth must be at least 1"));
        }
        if config.matrix_rates.len() > usize::from(config.matrix_depth) {
            return Err(invalid(format!(
                "{} matrix rates configured for a matrix of depth {}",
                config.matrix_rates.len(),
                config.matrix_depth
            )));
        }
        for (i, rate) in config.matrix_rates.iter().enumerate() {
            check_rate(&format!("matrix_rates[{}]", i + 1), *rate)?;
        }
        let matrix_total: Decimal = config.matrix_rates.iter().sum();
        if matrix_total > Decimal::ONE {
            return Err(invalid(format!("matrix rates sum to {}, above 1", matrix_total)));
        }

        for (i, rate) in config.matching_rates.iter().enumerate() {
            check_rate(&format!("matching_rates[{}]", i + 1), *rate)?;
        }
        let matching_total: Decimal = config.matching_rates.iter().sum();
        if matching_total > Decimal::ONE {
            return Err(invalid(format!(
                "matching rates sum to {}, above 1",
                matching_total
            )));
        }

        check_non_negative("min_autoship", config.min_autoship)?;

        if config.ranks.is_empty() {
            return Err(invalid("at least one rank is required"));
        }

        let mut seen = HashSet::new();
        let mut ranks = Vec::with_capacity(config.ranks.len());
        for (ordinal, rank) in config.ranks.into_iter().enumerate() {
            if rank.id.trim().is_empty() {
                return Err(invalid(format!("rank #{} has an empty id", ordinal + 1)));
            }
            if !seen.insert(rank.id.clone()) {
                return Err(invalid(format!("duplicate rank id {}", rank.id)));
            }
            check_non_negative(
                &format!("{}.min_personal_sales", rank.id),
                rank.min_personal_sales,
            )?;
            check_non_negative(&format!("{}.min_team_volume", rank.id), rank.min_team_volume)?;
            check_non_negative(&format!("{}.bonus", rank.id), rank.bonus)?;
            if rank.unlocked_depth > config.matrix_depth {
                return Err(invalid(format!(
                    "{} unlocks depth {} beyond matrix depth {}",
                    rank.id, rank.unlocked_depth, config.matrix_depth
                )));
            }

            ranks.push(Rank {
                name: rank.name.unwrap_or_else(|| rank.id.clone()),
                id: rank.id,
                ordinal,
                min_personal_sales: rank.min_personal_sales,
                min_team_volume: rank.min_team_volume,
                min_active_legs: rank.min_active_legs,
                unlocked_depth: rank.unlocked_depth,
                bonus: rank.bonus,
            });
        }

        Ok(Self {
            version: config.version,
            retail_rate: config.retail_rate,
            matrix_rates: config.matrix_rates,
            matching_rates: config.matching_rates,
            min_autoship: config.min_autoship,
            matrix_width: config.matrix_width,
            matrix_depth: config.matrix_depth,
            ranks,
        })
    }

    pub fn from_json_str(json: &str) -> CommissionResult<Self> {
        let config: RuleSetConfig = serde_json::from_str(json)
            .map_err(|e| invalid(format!("malformed rule set JSON: {}", e)))?;
        Self::from_config(config)
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn retail_rate(&self) -> Decimal {
        self.retail_rate
    }

    /// Rate for a 1-based matrix level
    pub fn matrix_rate(&self, level: u8) -> Option<Decimal> {
        let index = usize::from(level).checked_sub(1)?;
        self.matrix_rates.get(index).copied()
    }

    pub fn matrix_rates(&self) -> &[Decimal] {
        &self.matrix_rates
    }

    /// Number of levels that pay a matrix bonus
    pub fn paid_matrix_levels(&self) -> u8 {
        // Bounded by matrix_depth at validation time
        self.matrix_rates.len().min(usize::from(self.matrix_depth)) as u8
    }

    pub fn matching_rates(&self) -> &[Decimal] {
        &self.matching_rates
    }

    pub fn min_autoship(&self) -> Decimal {
        self.min_autoship
    }

    pub fn matrix_width(&self) -> u32 {
        self.matrix_width
    }

    pub fn matrix_depth(&self) -> u8 {
        self.matrix_depth
    }

    pub fn ranks(&self) -> &[Rank] {
        &self.ranks
    }

    pub fn base_rank(&self) -> &Rank {
        // Non-empty after validation
        &self.ranks[0]
    }

    pub fn rank(&self, id: &str) -> Option<&Rank> {
        self.ranks.iter().find(|r| r.id == id)
    }

    /// Resolve a stored rank id, falling back to the base rank
    pub fn resolve_rank(&self, id: &str) -> &Rank {
        match self.rank(id) {
            Some(rank) => rank,
            None => {
                tracing::warn!(rank_id = %id, "Unknown rank id, treating as base rank");
                self.base_rank()
            }
        }
    }

    /// Highest rank whose thresholds are all met, or the base rank
    pub fn rank_for_stats(&self, stats: &RankStats) -> &Rank {
        self.ranks
            .iter()
            .rev()
            .find(|rank| rank.is_met_by(stats))
            .unwrap_or_else(|| self.base_rank())
    }

    /// Active status plus the autoship minimum
    pub fn is_qualified(&self, distributor: &Distributor) -> bool {
        if !distributor.is_active() {
            return false;
        }
        if self.min_autoship.is_zero() {
            return true;
        }
        distributor.autoship_active && distributor.autoship_amount >= self.min_autoship
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DistributorStatus;
    use rust_decimal_macros::dec;

    fn sample_json() -> String {
        r#"{
            "version": 3,
            "retail_rate": "0.25",
            "matrix_rates": ["0.10", "0.05"],
            "matching_rates": ["0.10"],
            "min_autoship": "50.00",
            "ranks": [
                { "id": "member", "unlocked_depth": 1 },
                { "id": "bronze", "min_personal_sales": "100", "min_team_volume": "500",
                  "min_active_legs": 2, "unlocked_depth": 2, "bonus": "50.00" },
                { "id": "silver", "min_personal_sales": "200", "min_team_volume": "2000",
                  "min_active_legs": 3, "unlocked_depth": 5, "bonus": "150.00" }
            ]
        }"#
        .to_string()
    }

    fn distributor(status: DistributorStatus, autoship: bool, amount: Decimal) -> Distributor {
        Distributor {
            id: "d1".to_string(),
            sponsor_id: None,
            rank: "member".to_string(),
            status,
            autoship_active: autoship,
            autoship_amount: amount,
            email: None,
        }
    }

    #[test]
    fn parses_and_applies_defaults() {
        let rules = RuleSet::from_json_str(&sample_json()).unwrap();

        assert_eq!(rules.version(), 3);
        assert_eq!(rules.retail_rate(), dec!(0.25));
        assert_eq!(rules.matrix_rate(1), Some(dec!(0.10)));
        assert_eq!(rules.matrix_rate(2), Some(dec!(0.05)));
        assert_eq!(rules.matrix_rate(3), None);
        assert_eq!(rules.matrix_rate(0), None);
        assert_eq!(rules.paid_matrix_levels(), 2);
        assert_eq!(rules.matrix_width(), 5);
        assert_eq!(rules.matrix_depth(), 9);
        assert_eq!(rules.base_rank().id, "member");
        assert_eq!(rules.rank("silver").unwrap().ordinal, 2);
        assert_eq!(rules.rank("bronze").unwrap().name, "bronze");
    }

    #[test]
    fn rejects_rates_outside_unit_interval() {
        let json = sample_json().replace("\"0.25\"", "\"1.5\"");
        let err = RuleSet::from_json_str(&json).unwrap_err();
        assert!(matches!(err, CommissionError::InvalidRuleSet(msg) if msg.contains("retail_rate")));

        let json = sample_json().replace("\"0.05\"", "\"-0.05\"");
        assert!(matches!(
            RuleSet::from_json_str(&json),
            Err(CommissionError::InvalidRuleSet(_))
        ));
    }

    #[test]
    fn rejects_structural_problems() {
        let no_ranks = sample_json()
            .split("\"ranks\"")
            .next()
            .unwrap()
            .to_string()
            + "\"ranks\": [] }";
        assert!(matches!(
            RuleSet::from_json_str(&no_ranks),
            Err(CommissionError::InvalidRuleSet(_))
        ));

        let duplicate = sample_json().replace("\"silver\"", "\"bronze\"");
        assert!(matches!(
            RuleSet::from_json_str(&duplicate),
            Err(CommissionError::InvalidRuleSet(msg)) if msg.contains("duplicate")
        ));

        let too_deep = sample_json().replace("\"unlocked_depth\": 5", "\"unlocked_depth\": 12");
        assert!(matches!(
            RuleSet::from_json_str(&too_deep),
            Err(CommissionError::InvalidRuleSet(_))
        ));

        assert!(matches!(
            RuleSet::from_json_str("{ not json"),
            Err(CommissionError::InvalidRuleSet(_))
        ));
    }

    #[test]
    fn rejects_more_matrix_rates_than_depth() {
        let config = RuleSetConfig {
            version: 1,
            retail_rate: dec!(0.2),
            matrix_rates: vec![dec!(0.01); 4],
            matching_rates: vec![],
            min_autoship: Decimal::ZERO,
            matrix_width: 5,
            matrix_depth: 3,
            ranks: vec![RankConfig {
                id: "base".to_string(),
                name: None,
                min_personal_sales: Decimal::ZERO,
                min_team_volume: Decimal::ZERO,
                min_active_legs: 0,
                unlocked_depth: 3,
                bonus: Decimal::ZERO,
            }],
        };
        assert!(RuleSet::from_config(config).is_err());
    }

    #[test]
    fn rank_for_stats_picks_highest_satisfied() {
        let rules = RuleSet::from_json_str(&sample_json()).unwrap();

        let stats = RankStats {
            personal_sales: dec!(150),
            team_volume: dec!(2500),
            active_legs: 3,
        };
        // Personal sales fall short of silver
        assert_eq!(rules.rank_for_stats(&stats).id, "bronze");

        let stats = RankStats {
            personal_sales: dec!(250),
            ..stats
        };
        assert_eq!(rules.rank_for_stats(&stats).id, "silver");

        assert_eq!(rules.rank_for_stats(&RankStats::default()).id, "member");
    }

    #[test]
    fn qualification_requires_active_and_autoship_minimum() {
        let rules = RuleSet::from_json_str(&sample_json()).unwrap();

        assert!(rules.is_qualified(&distributor(DistributorStatus::Active, true, dec!(50))));
        assert!(!rules.is_qualified(&distributor(DistributorStatus::Active, true, dec!(49.99))));
        assert!(!rules.is_qualified(&distributor(DistributorStatus::Active, false, dec!(80))));
        assert!(!rules.is_qualified(&distributor(DistributorStatus::Inactive, true, dec!(80))));

        let no_minimum = sample_json().replace("\"50.00\",", "\"0\",");
        let rules = RuleSet::from_json_str(&no_minimum).unwrap();
        assert!(rules.is_qualified(&distributor(DistributorStatus::Active, false, dec!(0))));
    }

    #[test]
    fn unknown_rank_resolves_to_base() {
        let rules = RuleSet::from_json_str(&sample_json()).unwrap();
        assert_eq!(rules.resolve_rank("diamond").id, "member");
        assert_eq!(rules.resolve_rank("silver").id, "silver");
    }
}

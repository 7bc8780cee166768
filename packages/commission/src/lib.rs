//! Matrix Commission - per-order payout engine for a forced-matrix genealogy
//!
//! Given a paid order, the engine locates the purchasing distributor in a
//! fixed-width, fixed-depth matrix, walks upline and produces the commission
//! batch for that order exactly once.
//!
//! ## Commission Types
//!
//! | Type | Recipient | Amount |
//! |------|-----------|--------|
//! | Retail | Purchasing (or storefront) distributor | `cv * retail_rate` |
//! | Matrix | Upline at level L | `cv * matrix_rates[L]` |
//! | Rank bonus | Upline whose rank rose because of the order | fixed per rank |
//! | Matching | Sponsor(s) of a matrix bonus recipient | `bonus * matching_rates[g]` |
//!
//! ## Components
//!
//! - [`GenealogyWalker`] - upline chains and annotated downline trees
//! - [`RankEvaluator`] - rank from personal sales, team volume and active legs
//! - [`CommissionCalculator`] - the per-order pipeline
//! - [`CommissionStore`] - persistence seam, with an [`InMemoryCommissionStore`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use matrix_commission::{CommissionCalculator, EngineConfig, InMemoryCommissionStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryCommissionStore::new());
//! let calculator = CommissionCalculator::new(store, EngineConfig::from_env());
//! let result = calculator.calculate("order-1").await?;
//! ```

mod config;
mod error;
mod money;
mod types;

pub mod calculator;
pub mod genealogy;
pub mod rank;
pub mod rules;
pub mod store;

pub use calculator::{CalculationOutcome, CalculationResult, CommissionCalculator, SkipReason, SkippedLine};
pub use config::EngineConfig;
pub use error::{CommissionError, CommissionResult};
pub use genealogy::{DownlineNode, GenealogyWalker, UplineChain, UplineEntry};
pub use money::{round_cents, sum_commissionable_value};
pub use rank::{RankEvaluation, RankEvaluator, RankStats};
pub use rules::{Rank, RankConfig, RuleSet, RuleSetConfig};
pub use store::{
    CommissionBatch, CommissionRun, CommissionStore, InMemoryCommissionStore, StoreError,
    StoreResult,
};
pub use types::{
    CommissionKind, CommissionRecord, CommissionStatus, Distributor, DistributorStatus, LineItem,
    MatrixPosition, Order, OrderStatus, PaymentStatus, QualifyingPeriod, RankAchievement,
};

/// Create a new record identifier
pub fn create_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

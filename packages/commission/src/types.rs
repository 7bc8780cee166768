//! Row-shaped records exchanged with the persistence layer

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Distributor account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributorStatus {
    Active,
    Inactive,
}

/// A distributor as seen by the commission engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distributor {
    pub id: String,
    /// Enrollment sponsor, `None` for the root of the organisation
    pub sponsor_id: Option<String>,
    /// Current rank id, resolved against the active rule set
    pub rank: String,
    pub status: DistributorStatus,
    pub autoship_active: bool,
    /// Monthly autoship amount
    pub autoship_amount: Decimal,
    pub email: Option<String>,
}

impl Distributor {
    pub fn is_active(&self) -> bool {
        self.status == DistributorStatus::Active
    }
}

/// Placement of one distributor in the forced matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixPosition {
    pub distributor_id: String,
    /// Distributor occupying the upline slot, `None` at the root
    pub parent_id: Option<String>,
    /// Depth from the root, 1-based
    pub level: u32,
    /// Slot index within the parent's width, 1-based
    pub position: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fulfilment/reconciliation status of an order
///
/// Paid orders sit in `Processing` until a commission run succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

/// One product line of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    /// Commissionable value per unit, may be lower than `unit_price`
    pub commissionable_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    /// Distributor credited with the sale: the buyer, or the storefront owner
    /// when `customer_id` is set
    pub distributor_id: String,
    /// Retail customer who bought through the distributor's storefront
    pub customer_id: Option<String>,
    pub items: Vec<LineItem>,
    pub total: Decimal,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn is_retail_customer_order(&self) -> bool {
        self.customer_id.is_some()
    }

    /// Point in time the qualifying period is anchored to
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.paid_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionKind {
    Retail,
    Matrix,
    RankBonus,
    Matching,
}

impl CommissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retail => "retail",
            Self::Matrix => "matrix",
            Self::RankBonus => "rank_bonus",
            Self::Matching => "matching",
        }
    }
}

impl std::fmt::Display for CommissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStatus {
    Pending,
    Approved,
    Paid,
    Rejected,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Paid => "PAID",
            Self::Rejected => "REJECTED",
        }
    }
}

impl std::str::FromStr for CommissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "PAID" => Ok(Self::Paid),
            "REJECTED" => Ok(Self::Rejected),
            _ => Err(format!("Unknown commission status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionRecord {
    pub id: String,
    pub recipient_id: String,
    pub order_id: String,
    /// Distributor whose sale generated the commission
    pub source_distributor_id: String,
    /// Rounded to cents
    pub amount: Decimal,
    pub kind: CommissionKind,
    /// Matrix level, or sponsor generation for matching bonuses
    pub level: Option<u8>,
    /// Rank awarded, for rank bonuses
    pub rank_id: Option<String>,
    pub status: CommissionStatus,
    pub created_at: DateTime<Utc>,
}

/// History entry guarding one-time rank bonuses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankAchievement {
    pub id: String,
    pub distributor_id: String,
    pub rank_id: String,
    pub order_id: Option<String>,
    pub achieved_at: DateTime<Utc>,
}

/// Inclusive window in which sales count towards rank qualification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifyingPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QualifyingPeriod {
    /// Window of `days` days ending at `end`
    pub fn ending_at(end: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

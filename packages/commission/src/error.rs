use crate::store::StoreError;
use crate::types::PaymentStatus;

/// Result type for engine operations
pub type CommissionResult<T> = Result<T, CommissionError>;

/// Fatal engine errors
///
/// Any of these aborts the whole calculation with nothing written, so the
/// order can be retried. Recoverable per-level problems are reported in the
/// calculation result instead.
#[derive(Debug, thiserror::Error)]
pub enum CommissionError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Corrupt genealogy at {distributor_id}: {detail}")]
    CorruptGenealogy {
        distributor_id: String,
        detail: String,
    },

    #[error("Invalid rule set: {0}")]
    InvalidRuleSet(String),

    #[error("Order {order_id} is not paid (payment status {status})")]
    OrderNotPaid {
        order_id: String,
        status: PaymentStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommissionError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn corrupt(distributor_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::CorruptGenealogy {
            distributor_id: distributor_id.into(),
            detail: detail.into(),
        }
    }
}

//! Post-commit commission notifications
//!
//! Notifications are sent after the batch is committed and can never undo or
//! block it. Failures are logged and dropped.

use crate::entity::notification;
use crate::error::ApiError;
use async_trait::async_trait;
use matrix_commission::{CalculationResult, CommissionKind, CommissionRecord, create_id};
use rust_decimal::Decimal;
use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait};
use std::collections::BTreeMap;
use std::sync::Arc;

#[async_trait]
pub trait CommissionNotifier: Send + Sync {
    /// Tell every recipient in a freshly created batch what they earned
    async fn commissions_created(&self, result: &CalculationResult) -> Result<(), ApiError>;
}

/// Per-recipient summary of one order's batch
#[derive(Debug, Clone, PartialEq)]
pub struct EarningSummary {
    pub recipient_id: String,
    pub total: Decimal,
    pub kinds: Vec<CommissionKind>,
}

impl EarningSummary {
    pub fn title(&self) -> String {
        format!("You earned ${} in commissions", self.total)
    }

    pub fn description(&self, order_id: &str) -> String {
        let kinds = self
            .kinds
            .iter()
            .map(|k| k.as_str().replace('_', " "))
            .collect::<Vec<_>>()
            .join(", ");
        format!("Order {} paid out {} commission.", order_id, kinds)
    }
}

/// Group records by recipient, ordered by recipient id
pub fn summarize(records: &[CommissionRecord]) -> Vec<EarningSummary> {
    let mut by_recipient: BTreeMap<&str, EarningSummary> = BTreeMap::new();
    for record in records {
        let entry = by_recipient
            .entry(record.recipient_id.as_str())
            .or_insert_with(|| EarningSummary {
                recipient_id: record.recipient_id.clone(),
                total: Decimal::ZERO,
                kinds: Vec::new(),
            });
        entry.total += record.amount;
        if !entry.kinds.contains(&record.kind) {
            entry.kinds.push(record.kind);
        }
    }
    by_recipient.into_values().collect()
}

/// Writes in-app notification rows
pub struct DbNotifier {
    db: Arc<DatabaseConnection>,
    frontend_url: String,
}

impl DbNotifier {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        Self { db, frontend_url }
    }
}

#[async_trait]
impl CommissionNotifier for DbNotifier {
    async fn commissions_created(&self, result: &CalculationResult) -> Result<(), ApiError> {
        let summaries = summarize(&result.records);
        if summaries.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now().naive_utc();
        let link = format!("{}/commissions", self.frontend_url);
        let models = summaries.iter().map(|summary| notification::ActiveModel {
            id: Set(create_id()),
            user_id: Set(summary.recipient_id.clone()),
            title: Set(summary.title()),
            description: Set(Some(summary.description(&result.order_id))),
            link: Set(Some(link.clone())),
            read: Set(false),
            created_at: Set(now),
            read_at: Set(None),
        });

        notification::Entity::insert_many(models)
            .exec(self.db.as_ref())
            .await?;

        tracing::info!(
            order_id = %result.order_id,
            recipients = summaries.len(),
            "Created commission notifications"
        );
        Ok(())
    }
}

/// Used when no database is attached
pub struct LogNotifier;

#[async_trait]
impl CommissionNotifier for LogNotifier {
    async fn commissions_created(&self, result: &CalculationResult) -> Result<(), ApiError> {
        for summary in summarize(&result.records) {
            tracing::info!(
                order_id = %result.order_id,
                recipient_id = %summary.recipient_id,
                total = %summary.total,
                "Commission earned"
            );
        }
        Ok(())
    }
}

/// Fire-and-forget notification for a newly created batch
pub fn notify_in_background(notifier: Arc<dyn CommissionNotifier>, result: &CalculationResult) {
    if result.is_already_processed() || result.records.is_empty() {
        return;
    }

    let result = result.clone();
    tokio::spawn(async move {
        if let Err(e) = notifier.commissions_created(&result).await {
            tracing::warn!(order_id = %result.order_id, error = %e, "Failed to send commission notifications");
        }
    });
}

use matrix_commission::{CommissionCalculator, CommissionStore, EngineConfig, RankEvaluator};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::{sync::Arc, time::Duration};

use crate::error::ApiError;
use crate::notify::{CommissionNotifier, DbNotifier, LogNotifier};

pub type AppState = Arc<State>;

pub struct State {
    /// Present when backed by PostgreSQL; webhooks require it
    pub db: Option<Arc<DatabaseConnection>>,
    pub store: Arc<dyn CommissionStore>,
    pub calculator: CommissionCalculator,
    pub notifier: Arc<dyn CommissionNotifier>,
    pub stripe_webhook_secret: Option<String>,
}

impl State {
    pub fn new(store: Arc<dyn CommissionStore>, config: EngineConfig) -> Self {
        let calculator = CommissionCalculator::new(store.clone(), config);
        Self {
            db: None,
            store,
            calculator,
            notifier: Arc::new(LogNotifier),
            stripe_webhook_secret: None,
        }
    }

    /// Attach the database, switching notifications to in-app rows
    pub fn with_database(mut self, db: Arc<DatabaseConnection>) -> Self {
        self.notifier = Arc::new(DbNotifier::new(db.clone()));
        self.db = Some(db);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CommissionNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_stripe_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.stripe_webhook_secret = secret;
        self
    }

    pub fn engine_config(&self) -> &EngineConfig {
        self.calculator.config()
    }

    pub fn rank_evaluator(&self) -> RankEvaluator {
        RankEvaluator::new(self.store.clone(), self.engine_config().downline_depth)
    }

    pub fn db(&self) -> Result<&DatabaseConnection, ApiError> {
        self.db
            .as_deref()
            .ok_or_else(|| ApiError::service_unavailable("No database configured"))
    }
}

pub async fn connect_database(db_url: &str, sqlx_logging: bool) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());
    opt.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .sqlx_logging(sqlx_logging);

    Database::connect(opt).await
}

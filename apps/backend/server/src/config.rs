use matrix_commission::{EngineConfig, RuleSet, RuleSetConfig};
use matrix_commission_api::store::StoreBackend;
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub sqlx_logging: bool,
    /// Rule set used when the database holds no active `CommissionRuleSet`
    pub rule_set: Option<RuleSetConfig>,
    pub stripe_webhook_secret: Option<String>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = StoreBackend::from_env();

        let database_url = env::var("DATABASE_URL").ok();
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL"));
        }

        let rule_set = match env::var("COMMISSION_RULE_SET_PATH") {
            Ok(path) => Some(load_rule_set(&path)?),
            Err(_) => None,
        };

        Ok(Config {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            backend,
            database_url,
            sqlx_logging: env::var("SQLX_LOGGING")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            rule_set,
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").ok(),
            engine: EngineConfig::from_env(),
        })
    }
}

/// Read a rule set file and validate it up front
pub fn load_rule_set(path: &str) -> Result<RuleSetConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::RuleSet(format!("{}: {}", path, e)))?;
    parse_rule_set(&raw).map_err(|e| ConfigError::RuleSet(format!("{}: {}", path, e)))
}

fn parse_rule_set(raw: &str) -> Result<RuleSetConfig, String> {
    let config: RuleSetConfig = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    RuleSet::from_config(config.clone()).map_err(|e| e.to_string())?;
    Ok(config)
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidValue(String),
    RuleSet(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVar(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(var) => write!(f, "Invalid value for: {}", var),
            ConfigError::RuleSet(msg) => write!(f, "Rule set error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

use serde::{Deserialize, Serialize};

/// Configuration for the commission engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Depth of the downline expanded for team volume and active legs
    #[serde(default = "default_downline_depth")]
    pub downline_depth: u32,
    /// Length of the rank qualifying period, ending at the order's payment date
    #[serde(default = "default_qualifying_period_days")]
    pub qualifying_period_days: u32,
}

fn default_downline_depth() -> u32 {
    3
}
fn default_qualifying_period_days() -> u32 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            downline_depth: default_downline_depth(),
            qualifying_period_days: default_qualifying_period_days(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            downline_depth: std::env::var("COMMISSION_DOWNLINE_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_downline_depth),
            qualifying_period_days: std::env::var("COMMISSION_QUALIFYING_PERIOD_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_qualifying_period_days),
        }
    }

    pub fn with_downline_depth(mut self, depth: u32) -> Self {
        self.downline_depth = depth;
        self
    }
}

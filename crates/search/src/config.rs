use std::time::Duration;

/// Search configuration loaded from TOML.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SearchConfig {
    /// Maximum number of node expansions before giving up.
    #[serde(default = "default_max_expansions")]
    pub max_expansions: u32,

    /// Nodes at this depth (tactics from root) are not expanded.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum wall-clock seconds per theorem. Fractions allowed.
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,
}

fn default_max_expansions() -> u32 {
    500
}
fn default_max_depth() -> u32 {
    50
}
fn default_timeout() -> f64 {
    300.0
}

impl SearchConfig {
    /// Wall-clock budget. Negative or NaN values are treated as zero.
    pub fn timeout(&self) -> Duration {
        if self.timeout_secs.is_finite() && self.timeout_secs > 0.0 {
            Duration::from_secs_f64(self.timeout_secs)
        } else {
            Duration::ZERO
        }
    }

    /// Log a warning for budgets that make every search fail immediately.
    pub fn validate(&self) {
        if self.max_expansions == 0 {
            tracing::warn!("max_expansions = 0; every search will end exhausted");
        }
        if self.timeout().is_zero() {
            tracing::warn!(
                timeout_secs = self.timeout_secs,
                "non-positive timeout; every search will time out"
            );
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_expansions: default_max_expansions(),
            max_depth: default_max_depth(),
            timeout_secs: default_timeout(),
        }
    }
}

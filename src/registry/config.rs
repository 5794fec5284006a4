//! Quota Configuration
//!
//! Configuration for per-token quotas and the replenishment window.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default quota: requests per window
pub const DEFAULT_QUOTA_LIMIT: u32 = 20;
/// Default window length: 30 minutes
pub const DEFAULT_WINDOW_SECS: u64 = 30 * 60;

/// Quota configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuotaConfig {
    /// Enable quota enforcement
    pub enabled: bool,

    /// Quota granted to newly registered tokens and restored each window
    pub default_limit: u32,

    /// Length of the fixed replenishment window in seconds
    pub window_secs: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_limit: DEFAULT_QUOTA_LIMIT,
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

impl QuotaConfig {
    /// Get window duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Disable quota enforcement (for testing)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.default_limit == 0 {
            return Err("Quota default_limit must be > 0".to_string());
        }
        if self.window_secs == 0 {
            return Err("Quota window_secs must be > 0".to_string());
        }
        Ok(())
    }
}

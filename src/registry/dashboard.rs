//! Registry Usage Summary
//!
//! Aggregate figures served on `/stats` for monitoring quota usage.

use serde::{Deserialize, Serialize};

use super::quota::QuotaState;

/// Summary of quota usage across all tokens
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySummary {
    /// Registered tokens
    pub total_tokens: usize,

    /// Tokens with no quota left this window
    pub exhausted_tokens: usize,

    /// Sum of remaining quota
    pub remaining_units: u64,

    /// Sum of per-window limits
    pub limit_units: u64,

    /// Requests admitted but not yet completed
    pub in_flight: u64,

    /// Share of this window's quota already spent
    pub utilization_percent: f64,
}

impl RegistrySummary {
    /// Fold one token's state into the summary
    pub fn record(&mut self, limit: u32, state: QuotaState) {
        self.total_tokens += 1;
        if state.remaining == 0 {
            self.exhausted_tokens += 1;
        }
        self.remaining_units += state.remaining as u64;
        self.limit_units += limit as u64;
        self.in_flight += state.reserved as u64;

        self.utilization_percent = if self.limit_units > 0 {
            let spent = self.limit_units.saturating_sub(self.remaining_units) as f64;
            (spent / self.limit_units as f64) * 100.0
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary() {
        let summary = RegistrySummary::default();
        assert_eq!(summary.total_tokens, 0);
        assert_eq!(summary.utilization_percent, 0.0);
    }

    #[test]
    fn test_record() {
        let mut summary = RegistrySummary::default();
        summary.record(
            10,
            QuotaState {
                remaining: 0,
                reserved: 0,
            },
        );
        summary.record(
            10,
            QuotaState {
                remaining: 10,
                reserved: 2,
            },
        );

        assert_eq!(summary.total_tokens, 2);
        assert_eq!(summary.exhausted_tokens, 1);
        assert_eq!(summary.remaining_units, 10);
        assert_eq!(summary.in_flight, 2);
        assert!((summary.utilization_percent - 50.0).abs() < f64::EPSILON);
    }
}

//! Per-Token Quota Counter
//!
//! A [`Quota`] tracks how many requests a token may still make in the current
//! window. The remaining count and the number of in-flight reservations are
//! packed into one `AtomicU64` so that every transition is a single CAS:
//! admission reserves a unit, completion commits it, and an abandoned request
//! releases it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Remaining count and in-flight reservations at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    pub remaining: u32,
    pub reserved: u32,
}

impl QuotaState {
    fn pack(self) -> u64 {
        ((self.remaining as u64) << 32) | self.reserved as u64
    }

    fn unpack(raw: u64) -> Self {
        Self {
            remaining: (raw >> 32) as u32,
            reserved: raw as u32,
        }
    }

    /// Units not yet spoken for by an in-flight request
    pub fn available(&self) -> u32 {
        self.remaining.saturating_sub(self.reserved)
    }
}

/// Lock-free quota counter for one token
#[derive(Debug)]
pub struct Quota {
    /// Value restored on each window reset
    limit: u32,

    /// Packed [`QuotaState`]
    state: AtomicU64,
}

impl Quota {
    /// Create a full quota
    pub fn new(limit: u32) -> Self {
        Self::with_remaining(limit, limit)
    }

    /// Create a quota with a specific remaining count (e.g. loaded from disk)
    pub fn with_remaining(limit: u32, remaining: u32) -> Self {
        let state = QuotaState {
            remaining,
            reserved: 0,
        };
        Self {
            limit,
            state: AtomicU64::new(state.pack()),
        }
    }

    /// Apply `step` atomically; returns the previous state if it applied
    fn transition<F>(&self, step: F) -> Option<QuotaState>
    where
        F: Fn(QuotaState) -> Option<QuotaState>,
    {
        let mut current = self.state.load(Ordering::SeqCst);

        loop {
            let before = QuotaState::unpack(current);
            let after = step(before)?;

            match self.state.compare_exchange_weak(
                current,
                after.pack(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Some(before),
                Err(actual) => {
                    current = actual;
                }
            }
        }
    }

    /// Current state
    pub fn state(&self) -> QuotaState {
        QuotaState::unpack(self.state.load(Ordering::SeqCst))
    }

    /// Remaining requests in this window
    pub fn remaining(&self) -> u32 {
        self.state().remaining
    }

    /// Window limit
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Whether at least one request remains
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Decrement by one; no-op at zero
    ///
    /// Returns true if a unit was consumed.
    pub fn consume_one(&self) -> bool {
        self.transition(|s| {
            (s.remaining > 0).then(|| QuotaState {
                remaining: s.remaining - 1,
                ..s
            })
        })
        .is_some()
    }

    /// Reserve one unit for an admitted request
    ///
    /// Fails once every remaining unit is consumed or reserved, so two
    /// concurrent requests can never both take the last unit.
    pub fn try_reserve(&self) -> bool {
        self.transition(|s| {
            (s.available() > 0).then(|| QuotaState {
                reserved: s.reserved + 1,
                ..s
            })
        })
        .is_some()
    }

    /// Spend a reserved unit
    pub fn commit(&self) {
        self.transition(|s| {
            Some(QuotaState {
                remaining: s.remaining.saturating_sub(1),
                reserved: s.reserved.saturating_sub(1),
            })
        });
    }

    /// Return a reserved unit without spending it
    pub fn release(&self) {
        self.transition(|s| {
            (s.reserved > 0).then(|| QuotaState {
                reserved: s.reserved - 1,
                ..s
            })
        });
    }

    /// Restore the full limit, keeping in-flight reservations
    pub fn replenish(&self) {
        let limit = self.limit;
        self.transition(|s| {
            Some(QuotaState {
                remaining: limit,
                ..s
            })
        });
    }
}

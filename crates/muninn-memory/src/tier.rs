//! Per-tier capacity policy.
//!
//! Each tier has a soft capacity. Crossing it never fails the insert; it
//! surfaces a non-fatal `CapacityWarning` via the error channel. Eviction is
//! intentionally left to the store implementation (see spec Open Questions).

use super::node::Tier;

/// Soft capacity per tier.
#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    pub task: usize,
    pub session: usize,
    pub long_term: usize,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            task: 500,
            session: 5_000,
            long_term: 50_000,
        }
    }
}

impl TierLimits {
    pub fn capacity_for(&self, tier: Tier) -> usize {
        match tier {
            Tier::Task => self.task,
            Tier::Session => self.session,
            Tier::LongTerm => self.long_term,
        }
    }

    /// Returns a warning if `count_after_insert` exceeds the tier's capacity.
    pub fn check(&self, tier: Tier, count_after_insert: usize) -> Option<CapacityWarning> {
        let capacity = self.capacity_for(tier);
        if count_after_insert > capacity {
            Some(CapacityWarning {
                tier,
                capacity,
                count: count_after_insert,
            })
        } else {
            None
        }
    }
}

/// Non-fatal signal that a tier's soft capacity has been crossed.
/// The node that triggered it is still created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityWarning {
    pub tier: Tier,
    pub capacity: usize,
    pub count: usize,
}

impl std::fmt::Display for CapacityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "tier {} over capacity: {} nodes (capacity {})",
            self.tier.as_str(),
            self.count,
            self.capacity
        )
    }
}

//! # Allocation Table
//!
//! The ordered list of strategies the router deploys capital into, each
//! with a target weight in basis points. The table is replaced as a whole;
//! there is no incremental patching. Replacement is validate-then-commit:
//! a rejected set leaves the previous table in place.
//!
//! Invariants after every successful [`AllocationTable::replace`]:
//!
//! - each weight is at most [`MAX_ALLOCATION_BPS`];
//! - weights sum to exactly [`BPS_DENOMINATOR`] when the table is non-empty;
//! - no strategy appears twice.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{BPS_DENOMINATOR, MAX_ALLOCATION_BPS};
use crate::strategy::{SettlementClass, Strategy, StrategyId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A rejected allocation set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    /// A single entry exceeds the per-strategy cap.
    #[error("allocation limit exceeded: {strategy} at {weight_bps} bps (cap {cap_bps} bps)")]
    WeightAboveCap {
        /// The offending strategy.
        strategy: StrategyId,
        /// Its requested weight.
        weight_bps: u16,
        /// [`MAX_ALLOCATION_BPS`].
        cap_bps: u16,
    },

    /// Weights do not sum to 10,000 bps.
    #[error("invalid allocation total: {total_bps} bps, expected {expected_bps}")]
    InvalidTotal {
        /// Sum of the requested weights.
        total_bps: u32,
        /// [`BPS_DENOMINATOR`].
        expected_bps: u16,
    },

    /// The same strategy was listed more than once.
    #[error("duplicate strategy in allocation set: {0}")]
    DuplicateStrategy(StrategyId),
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One row of the table: a strategy and its target weight.
#[derive(Debug, Clone)]
pub struct AllocationEntry {
    /// The strategy handle. Its variant fixes the settlement class.
    pub strategy: Strategy,
    /// Target share of the pool, in basis points.
    pub weight_bps: u16,
}

impl AllocationEntry {
    /// Creates an entry.
    pub fn new(strategy: Strategy, weight_bps: u16) -> Self {
        Self {
            strategy,
            weight_bps,
        }
    }

    /// The entry's settlement class.
    pub fn class(&self) -> SettlementClass {
        self.strategy.class()
    }

    /// Serializable description of the entry.
    pub fn view(&self) -> AllocationView {
        AllocationView {
            strategy: self.strategy.id().to_string(),
            weight_bps: self.weight_bps,
            class: self.class(),
        }
    }
}

/// Wire-friendly form of an [`AllocationEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationView {
    /// Strategy identifier.
    pub strategy: StrategyId,
    /// Target weight in basis points.
    pub weight_bps: u16,
    /// Settlement class.
    pub class: SettlementClass,
}

// ---------------------------------------------------------------------------
// AllocationTable
// ---------------------------------------------------------------------------

/// The current target allocation.
#[derive(Debug, Clone, Default)]
pub struct AllocationTable {
    entries: Vec<AllocationEntry>,
}

impl AllocationTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks a candidate set against the table invariants.
    pub fn validate(entries: &[AllocationEntry]) -> Result<(), AllocationError> {
        let mut seen = HashSet::new();
        let mut total: u32 = 0;

        for entry in entries {
            if entry.weight_bps > MAX_ALLOCATION_BPS {
                return Err(AllocationError::WeightAboveCap {
                    strategy: entry.strategy.id().to_string(),
                    weight_bps: entry.weight_bps,
                    cap_bps: MAX_ALLOCATION_BPS,
                });
            }
            if !seen.insert(entry.strategy.id()) {
                return Err(AllocationError::DuplicateStrategy(
                    entry.strategy.id().to_string(),
                ));
            }
            total += u32::from(entry.weight_bps);
        }

        if !entries.is_empty() && total != u32::from(BPS_DENOMINATOR) {
            return Err(AllocationError::InvalidTotal {
                total_bps: total,
                expected_bps: BPS_DENOMINATOR,
            });
        }
        Ok(())
    }

    /// Validates `entries` and, only if valid, swaps them in. Returns the
    /// previous entries.
    pub fn replace(
        &mut self,
        entries: Vec<AllocationEntry>,
    ) -> Result<Vec<AllocationEntry>, AllocationError> {
        Self::validate(&entries)?;
        Ok(std::mem::replace(&mut self.entries, entries))
    }

    /// Entries in table order.
    pub fn entries(&self) -> &[AllocationEntry] {
        &self.entries
    }

    /// `true` if no strategies are allocated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` if any entry is externally settled.
    pub fn has_externally_settled(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.strategy.is_externally_settled())
    }

    /// `true` if `id` is in the current table.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.strategy.id() == id)
    }

    /// Serializable view of the whole table.
    pub fn views(&self) -> Vec<AllocationView> {
        self.entries.iter().map(AllocationEntry::view).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

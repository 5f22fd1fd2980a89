//! # Ownership Unit Ledger
//!
//! Every depositor's claim on the pool is tracked as a count of ownership
//! units. A [`UnitLedger`] holds two kinds of units:
//!
//! - **spendable** units, keyed by owner; and
//! - **escrowed** units, moved out of an owner's spendable balance when a
//!   queued withdrawal is created. They still count toward the total supply
//!   (the exchange rate is computed over them) until the request is claimed
//!   and they are burned.
//!
//! The ledger only does arithmetic. Pricing units against the pool is the
//! [`Vault`](super::Vault)'s job.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during unit ledger operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitError {
    /// Attempted to move more units than the owner holds.
    #[error("insufficient units: {owner} holds {available}, requested {requested}")]
    InsufficientUnits {
        /// The owner being debited.
        owner: Address,
        /// Spendable units currently held.
        available: u64,
        /// Units requested.
        requested: u64,
    },

    /// Attempted to burn more escrowed units than exist.
    #[error("insufficient escrow: {escrowed} escrowed, requested {requested}")]
    InsufficientEscrow {
        /// Units currently in escrow.
        escrowed: u64,
        /// Units requested.
        requested: u64,
    },

    /// Minting would overflow the supply.
    #[error("unit supply overflow minting {0}")]
    Overflow(u64),
}

// ---------------------------------------------------------------------------
// UnitLedger
// ---------------------------------------------------------------------------

/// Spendable and escrowed ownership units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitLedger {
    balances: HashMap<Address, u64>,
    circulating: u64,
    escrowed: u64,
}

impl UnitLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spendable units held by `owner`.
    pub fn balance_of(&self, owner: &str) -> u64 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    /// Units in escrow behind pending withdrawal requests.
    pub fn escrowed(&self) -> u64 {
        self.escrowed
    }

    /// Spendable units across all owners.
    pub fn circulating(&self) -> u64 {
        self.circulating
    }

    /// Total supply: spendable plus escrowed.
    pub fn total_units(&self) -> u64 {
        // circulating + escrowed never exceeds what was minted, which was
        // itself checked against u64::MAX.
        self.circulating + self.escrowed
    }

    /// Number of owners with a non-zero spendable balance.
    pub fn holder_count(&self) -> usize {
        self.balances.values().filter(|b| **b > 0).count()
    }

    /// Mints `units` to `owner`. Returns the owner's new balance.
    pub fn mint(&mut self, owner: &str, units: u64) -> Result<u64, UnitError> {
        let supply = self
            .total_units()
            .checked_add(units)
            .ok_or(UnitError::Overflow(units))?;
        debug_assert!(supply >= self.circulating);

        let balance = self.balances.entry(owner.to_string()).or_insert(0);
        *balance += units;
        self.circulating += units;
        Ok(*balance)
    }

    /// Burns spendable units held by `owner`.
    pub fn burn(&mut self, owner: &str, units: u64) -> Result<u64, UnitError> {
        let remaining = self.debit(owner, units)?;
        self.circulating -= units;
        Ok(remaining)
    }

    /// Moves `units` from `owner`'s spendable balance into escrow.
    pub fn escrow(&mut self, owner: &str, units: u64) -> Result<u64, UnitError> {
        let remaining = self.debit(owner, units)?;
        self.circulating -= units;
        self.escrowed += units;
        Ok(remaining)
    }

    /// Burns `units` out of escrow.
    pub fn burn_escrowed(&mut self, units: u64) -> Result<(), UnitError> {
        if units > self.escrowed {
            return Err(UnitError::InsufficientEscrow {
                escrowed: self.escrowed,
                requested: units,
            });
        }
        self.escrowed -= units;
        Ok(())
    }

    fn debit(&mut self, owner: &str, units: u64) -> Result<u64, UnitError> {
        let available = self.balance_of(owner);
        if available < units {
            return Err(UnitError::InsufficientUnits {
                owner: owner.to_string(),
                available,
                requested: units,
            });
        }
        let remaining = available - units;
        if remaining == 0 {
            self.balances.remove(owner);
        } else {
            self.balances.insert(owner.to_string(), remaining);
        }
        Ok(remaining)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_accumulates() {
        let mut ledger = UnitLedger::new();
        ledger.mint("alice", 500).unwrap();
        assert_eq!(ledger.mint("alice", 300).unwrap(), 800);
        assert_eq!(ledger.total_units(), 800);
        assert_eq!(ledger.holder_count(), 1);
    }

    #[test]
    fn mint_overflow_rejected() {
        let mut ledger = UnitLedger::new();
        ledger.mint("alice", u64::MAX).unwrap();
        assert_eq!(ledger.mint("bob", 1), Err(UnitError::Overflow(1)));
        assert_eq!(ledger.balance_of("bob"), 0);
    }

    #[test]
    fn burn_reduces_supply() {
        let mut ledger = UnitLedger::new();
        ledger.mint("alice", 1_000).unwrap();
        assert_eq!(ledger.burn("alice", 400).unwrap(), 600);
        assert_eq!(ledger.total_units(), 600);
    }

    #[test]
    fn burn_more_than_held_rejected() {
        let mut ledger = UnitLedger::new();
        ledger.mint("alice", 100).unwrap();
        assert!(matches!(
            ledger.burn("alice", 200),
            Err(UnitError::InsufficientUnits {
                available: 100,
                requested: 200,
                ..
            })
        ));
        assert_eq!(ledger.total_units(), 100);
    }

    #[test]
    fn escrow_keeps_units_in_supply() {
        let mut ledger = UnitLedger::new();
        ledger.mint("alice", 1_000).unwrap();
        ledger.escrow("alice", 250).unwrap();

        assert_eq!(ledger.balance_of("alice"), 750);
        assert_eq!(ledger.escrowed(), 250);
        assert_eq!(ledger.circulating(), 750);
        assert_eq!(ledger.total_units(), 1_000);

        ledger.burn_escrowed(250).unwrap();
        assert_eq!(ledger.total_units(), 750);
    }

    #[test]
    fn escrowed_units_are_not_spendable() {
        let mut ledger = UnitLedger::new();
        ledger.mint("alice", 100).unwrap();
        ledger.escrow("alice", 100).unwrap();
        assert!(ledger.burn("alice", 1).is_err());
        assert_eq!(ledger.holder_count(), 0);
    }

    #[test]
    fn burn_escrowed_beyond_escrow_rejected() {
        let mut ledger = UnitLedger::new();
        ledger.mint("alice", 100).unwrap();
        ledger.escrow("alice", 40).unwrap();
        assert_eq!(
            ledger.burn_escrowed(41),
            Err(UnitError::InsufficientEscrow {
                escrowed: 40,
                requested: 41
            })
        );
    }
}

//! # Pooled Asset Transfers
//!
//! The vault never owns the token contract for the asset it pools. It only
//! needs two things from whoever does: "what does this account hold?" and
//! "move this much from A to B, all or nothing". That contract is the
//! [`AssetTransfer`] trait.
//!
//! [`InMemoryAsset`] is the reference implementation used by the node and
//! the test suites. It keeps a single `account -> balance` map behind a
//! `parking_lot::RwLock`, so the vault and every strategy can share one
//! instance through an `Arc` and observe the same balances.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Account identifier on the asset ledger. Depositors, the vault, and each
/// strategy's holding account are all plain addresses.
pub type Address = String;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the asset transfer collaborator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssetError {
    /// The source account cannot cover the transfer.
    #[error("insufficient balance: {account} has {available}, requested {requested}")]
    InsufficientBalance {
        /// The account being debited.
        account: Address,
        /// Its current balance.
        available: u64,
        /// The amount that was requested.
        requested: u64,
    },

    /// Crediting the destination would overflow `u64`.
    #[error("balance overflow: crediting {amount} to {account}")]
    Overflow {
        /// The account being credited.
        account: Address,
        /// The amount that caused the overflow.
        amount: u64,
    },
}

// ---------------------------------------------------------------------------
// AssetTransfer
// ---------------------------------------------------------------------------

/// The asset transfer collaborator.
///
/// Implementations must be all-or-nothing: a failed `transfer` leaves both
/// balances untouched.
pub trait AssetTransfer: Send + Sync {
    /// Current balance of `account`. Unknown accounts hold zero.
    fn balance_of(&self, account: &str) -> u64;

    /// Moves `amount` from `from` to `to`.
    fn transfer(&self, from: &str, to: &str, amount: u64) -> Result<(), AssetError>;
}

// ---------------------------------------------------------------------------
// InMemoryAsset
// ---------------------------------------------------------------------------

/// Snapshot of every non-zero balance, for inspection and persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    /// Non-zero balances keyed by account.
    pub balances: HashMap<Address, u64>,
    /// Sum of all balances.
    pub total_supply: u64,
}

/// Shared in-memory asset ledger.
#[derive(Debug, Default)]
pub struct InMemoryAsset {
    balances: RwLock<HashMap<Address, u64>>,
}

impl InMemoryAsset {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates new asset out of thin air and credits it to `to`.
    ///
    /// Used by faucets and tests to seed depositors. Also used to simulate
    /// yield landing in a strategy: minting straight into a strategy's
    /// account raises its exchange rate.
    pub fn mint(&self, to: &str, amount: u64) -> Result<u64, AssetError> {
        let mut balances = self.balances.write();
        let balance = balances.entry(to.to_string()).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(AssetError::Overflow {
            account: to.to_string(),
            amount,
        })?;
        Ok(*balance)
    }

    /// Destroys `amount` held by `from`. Simulates a loss at a venue.
    pub fn burn(&self, from: &str, amount: u64) -> Result<u64, AssetError> {
        let mut balances = self.balances.write();
        let available = balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(AssetError::InsufficientBalance {
                account: from.to_string(),
                available,
                requested: amount,
            });
        }
        let remaining = available - amount;
        balances.insert(from.to_string(), remaining);
        Ok(remaining)
    }

    /// Returns all non-zero balances and their sum.
    pub fn snapshot(&self) -> AssetSnapshot {
        let balances: HashMap<Address, u64> = self
            .balances
            .read()
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|(account, amount)| (account.clone(), *amount))
            .collect();
        let total_supply = balances.values().fold(0u64, |acc, v| acc.saturating_add(*v));
        AssetSnapshot {
            balances,
            total_supply,
        }
    }
}

impl AssetTransfer for InMemoryAsset {
    fn balance_of(&self, account: &str) -> u64 {
        self.balances.read().get(account).copied().unwrap_or(0)
    }

    fn transfer(&self, from: &str, to: &str, amount: u64) -> Result<(), AssetError> {
        let mut balances = self.balances.write();

        let available = balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(AssetError::InsufficientBalance {
                account: from.to_string(),
                available,
                requested: amount,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }

        // Check the credit side before touching the debit side so a failed
        // transfer leaves both balances untouched.
        let current = balances.get(to).copied().unwrap_or(0);
        let credited = current.checked_add(amount).ok_or(AssetError::Overflow {
            account: to.to_string(),
            amount,
        })?;

        balances.insert(from.to_string(), available - amount);
        balances.insert(to.to_string(), credited);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_creates_balance() {
        let asset = InMemoryAsset::new();
        assert_eq!(asset.mint("alice", 1_000).unwrap(), 1_000);
        assert_eq!(asset.balance_of("alice"), 1_000);
        assert_eq!(asset.balance_of("nobody"), 0);
    }

    #[test]
    fn transfer_moves_funds() {
        let asset = InMemoryAsset::new();
        asset.mint("alice", 1_000).unwrap();
        asset.transfer("alice", "vault", 400).unwrap();

        assert_eq!(asset.balance_of("alice"), 600);
        assert_eq!(asset.balance_of("vault"), 400);
    }

    #[test]
    fn transfer_insufficient_balance_rejected() {
        let asset = InMemoryAsset::new();
        asset.mint("alice", 100).unwrap();

        let result = asset.transfer("alice", "vault", 200);
        assert!(matches!(
            result,
            Err(AssetError::InsufficientBalance {
                available: 100,
                requested: 200,
                ..
            })
        ));
        assert_eq!(asset.balance_of("alice"), 100);
        assert_eq!(asset.balance_of("vault"), 0);
    }

    #[test]
    fn transfer_overflow_leaves_balances_untouched() {
        let asset = InMemoryAsset::new();
        asset.mint("alice", 10).unwrap();
        asset.mint("whale", u64::MAX).unwrap();

        let result = asset.transfer("alice", "whale", 10);
        assert!(matches!(result, Err(AssetError::Overflow { .. })));
        assert_eq!(asset.balance_of("alice"), 10);
        assert_eq!(asset.balance_of("whale"), u64::MAX);
    }

    #[test]
    fn self_transfer_is_noop() {
        let asset = InMemoryAsset::new();
        asset.mint("alice", 50).unwrap();
        asset.transfer("alice", "alice", 50).unwrap();
        assert_eq!(asset.balance_of("alice"), 50);
    }

    #[test]
    fn burn_reduces_balance() {
        let asset = InMemoryAsset::new();
        asset.mint("venue", 500).unwrap();
        assert_eq!(asset.burn("venue", 200).unwrap(), 300);
        assert!(asset.burn("venue", 301).is_err());
    }

    #[test]
    fn snapshot_excludes_zero_balances() {
        let asset = InMemoryAsset::new();
        asset.mint("alice", 100).unwrap();
        asset.mint("bob", 50).unwrap();
        asset.transfer("bob", "alice", 50).unwrap();

        let snapshot = asset.snapshot();
        assert_eq!(snapshot.balances.len(), 1);
        assert_eq!(snapshot.total_supply, 150);

        let json = serde_json::to_string(&snapshot).expect("serialize");
        let recovered: AssetSnapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(recovered, snapshot);
    }
}

//! # Yield Vault Contract
//!
//! A share-based vault that redeems synchronously. Depositors receive shares
//! priced against the assets the vault holds on the asset ledger; anything
//! that raises those holdings (see [`YieldVault::accrue`]) raises the share
//! price for every holder at once.
//!
//! ## Share Math
//!
//! ```text
//! deposit:          shares = value × total_shares / total_assets   (floor)
//! redeem:           value  = shares × total_assets / total_shares  (floor)
//! preview_withdraw: shares = value × total_shares / total_assets   (ceil)
//! ```
//!
//! The first deposit mints shares 1:1. Rounding always favors the vault.
//!
//! Calls are all-or-nothing: the asset moves first and shares are only
//! credited or debited once it has.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tidepool_protocol::math::{mul_div, mul_div_ceil};
use tidepool_protocol::{AssetTransfer, RedeemableStrategy, StrategyError};

/// Share balances of a [`YieldVault`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLedger {
    /// Shares per holder.
    pub shares: HashMap<String, u64>,
    /// Sum of all shares.
    pub total_shares: u64,
}

/// Synchronously redeemable share vault.
pub struct YieldVault {
    address: String,
    asset: Arc<dyn AssetTransfer>,
    ledger: RwLock<ShareLedger>,
}

impl YieldVault {
    /// Creates an empty vault holding its assets at `address`.
    pub fn new(address: impl Into<String>, asset: Arc<dyn AssetTransfer>) -> Self {
        Self {
            address: address.into(),
            asset,
            ledger: RwLock::new(ShareLedger::default()),
        }
    }

    /// Assets held by the vault.
    pub fn total_assets(&self) -> u64 {
        self.asset.balance_of(&self.address)
    }

    /// Shares outstanding.
    pub fn total_shares(&self) -> u64 {
        self.ledger.read().total_shares
    }

    /// A copy of the share ledger.
    pub fn snapshot(&self) -> ShareLedger {
        self.ledger.read().clone()
    }

    /// Pulls `amount` of yield in from `source`. No shares are minted, so
    /// the share price rises for every holder.
    pub fn accrue(&self, source: &str, amount: u64) -> Result<(), StrategyError> {
        self.asset.transfer(source, &self.address, amount)?;
        debug!(vault = %self.address, amount, "yield accrued");
        Ok(())
    }

    fn shares_for(&self, value: u64, supply: u64) -> Result<u64, StrategyError> {
        if supply == 0 {
            return Ok(value);
        }
        mul_div(value, supply, self.total_assets()).ok_or(StrategyError::Overflow)
    }
}

impl RedeemableStrategy for YieldVault {
    fn address(&self) -> &str {
        &self.address
    }

    fn deposit(&self, value: u64, depositor: &str) -> Result<u64, StrategyError> {
        let mut ledger = self.ledger.write();
        let shares = self.shares_for(value, ledger.total_shares)?;
        if shares == 0 {
            return Err(StrategyError::ZeroUnits(value));
        }
        let total_shares = ledger
            .total_shares
            .checked_add(shares)
            .ok_or(StrategyError::Overflow)?;

        self.asset.transfer(depositor, &self.address, value)?;
        *ledger.shares.entry(depositor.to_string()).or_insert(0) += shares;
        ledger.total_shares = total_shares;
        Ok(shares)
    }

    fn redeem(&self, units: u64, owner: &str) -> Result<u64, StrategyError> {
        let mut ledger = self.ledger.write();
        let held = ledger.shares.get(owner).copied().unwrap_or(0);
        if units > held {
            return Err(StrategyError::InsufficientUnits {
                held,
                requested: units,
            });
        }
        let value = mul_div(units, self.total_assets(), ledger.total_shares)
            .ok_or(StrategyError::Overflow)?;

        self.asset.transfer(&self.address, owner, value)?;
        if held == units {
            ledger.shares.remove(owner);
        } else {
            ledger.shares.insert(owner.to_string(), held - units);
        }
        ledger.total_shares -= units;
        Ok(value)
    }

    fn preview_withdraw(&self, value: u64) -> u64 {
        let supply = self.total_shares();
        if supply == 0 {
            return value;
        }
        mul_div_ceil(value, supply, self.total_assets()).unwrap_or(u64::MAX)
    }

    fn balance_of(&self, holder: &str) -> u64 {
        self.ledger.read().shares.get(holder).copied().unwrap_or(0)
    }

    fn convert_to_assets(&self, units: u64) -> u64 {
        let supply = self.total_shares();
        if supply == 0 {
            return units;
        }
        mul_div(units, self.total_assets(), supply).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidepool_protocol::InMemoryAsset;

    fn setup() -> (Arc<InMemoryAsset>, YieldVault) {
        let asset = Arc::new(InMemoryAsset::new());
        let vault = YieldVault::new("yield", asset.clone());
        (asset, vault)
    }

    #[test]
    fn first_deposit_is_one_to_one() {
        let (asset, vault) = setup();
        asset.mint("alice", 500).unwrap();
        assert_eq!(vault.deposit(500, "alice").unwrap(), 500);
        assert_eq!(vault.total_assets(), 500);
        assert_eq!(vault.convert_to_assets(vault.balance_of("alice")), 500);
    }

    #[test]
    fn accrual_raises_share_price() {
        let (asset, vault) = setup();
        asset.mint("alice", 1_000).unwrap();
        asset.mint("treasury", 500).unwrap();
        asset.mint("bob", 1_500).unwrap();
        vault.deposit(1_000, "alice").unwrap();

        vault.accrue("treasury", 500).unwrap();
        assert_eq!(vault.convert_to_assets(1_000), 1_500);

        // Bob pays the new price.
        assert_eq!(vault.deposit(1_500, "bob").unwrap(), 1_000);
    }

    #[test]
    fn preview_withdraw_rounds_up_and_covers_value() {
        let (asset, vault) = setup();
        asset.mint("alice", 300).unwrap();
        asset.mint("treasury", 100).unwrap();
        vault.deposit(300, "alice").unwrap();
        vault.accrue("treasury", 100).unwrap();

        // 300 shares over 400 assets: 100 value needs 75 shares exactly,
        // 101 needs 75.75 -> 76.
        assert_eq!(vault.preview_withdraw(100), 75);
        assert_eq!(vault.preview_withdraw(101), 76);
        let paid = vault.redeem(76, "alice").unwrap();
        assert!(paid >= 101);
    }

    #[test]
    fn failed_transfer_credits_nothing() {
        let (_asset, vault) = setup();
        let err = vault.deposit(100, "nobody").unwrap_err();
        assert!(matches!(err, StrategyError::Asset(_)));
        assert_eq!(vault.total_shares(), 0);
    }

    #[test]
    fn redeem_beyond_balance_rejected() {
        let (asset, vault) = setup();
        asset.mint("alice", 100).unwrap();
        vault.deposit(100, "alice").unwrap();
        assert_eq!(
            vault.redeem(101, "alice"),
            Err(StrategyError::InsufficientUnits {
                held: 100,
                requested: 101
            })
        );
        assert_eq!(vault.redeem(100, "alice").unwrap(), 100);
        assert!(vault.snapshot().shares.is_empty());
    }

    #[test]
    fn dust_deposit_mints_nothing() {
        let (asset, vault) = setup();
        asset.mint("alice", 10).unwrap();
        asset.mint("treasury", 1_000).unwrap();
        asset.mint("bob", 1).unwrap();
        vault.deposit(10, "alice").unwrap();
        vault.accrue("treasury", 1_000).unwrap();
        assert_eq!(vault.deposit(1, "bob"), Err(StrategyError::ZeroUnits(1)));
        assert_eq!(asset.balance_of("bob"), 1);
    }
}

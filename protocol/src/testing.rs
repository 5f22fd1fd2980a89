//! Minimal strategy doubles for unit tests inside this crate.
//!
//! Full reference strategies live in the `tidepool-contracts` crate; these
//! are just enough to drive the ledger and router.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::asset::{AssetTransfer, InMemoryAsset};
use crate::math::{mul_div, mul_div_ceil};
use crate::strategy::{
    BalanceSource, RedeemableStrategy, SettledStrategy, StrategyError, VenueReadError,
};

/// Share vault with a 1:1 bootstrap and asset held on the shared ledger.
pub struct MockRedeemable {
    address: String,
    asset: Arc<InMemoryAsset>,
    units: RwLock<HashMap<String, u64>>,
    rejecting_deposits: AtomicBool,
    rejecting_redeems: AtomicBool,
}

impl MockRedeemable {
    pub fn new(address: &str, asset: Arc<InMemoryAsset>) -> Self {
        Self {
            address: address.to_string(),
            asset,
            units: RwLock::new(HashMap::new()),
            rejecting_deposits: AtomicBool::new(false),
            rejecting_redeems: AtomicBool::new(false),
        }
    }

    /// While set, `deposit` fails with [`StrategyError::Rejected`].
    pub fn reject_deposits(&self, rejecting: bool) {
        self.rejecting_deposits.store(rejecting, Ordering::SeqCst);
    }

    /// While set, `redeem` fails with [`StrategyError::Rejected`].
    pub fn reject_redeems(&self, rejecting: bool) {
        self.rejecting_redeems.store(rejecting, Ordering::SeqCst);
    }

    /// Credits `units` to `holder` and mints `assets` into the strategy.
    pub fn seed(&self, holder: &str, units: u64, assets: u64) {
        *self.units.write().entry(holder.to_string()).or_insert(0) += units;
        self.asset.mint(&self.address, assets).unwrap();
    }

    fn total_units(&self) -> u64 {
        self.units.read().values().sum()
    }

    fn total_assets(&self) -> u64 {
        self.asset.balance_of(&self.address)
    }
}

impl RedeemableStrategy for MockRedeemable {
    fn address(&self) -> &str {
        &self.address
    }

    fn deposit(&self, value: u64, depositor: &str) -> Result<u64, StrategyError> {
        if self.rejecting_deposits.load(Ordering::SeqCst) {
            return Err(StrategyError::Rejected("deposits closed".into()));
        }
        let supply = self.total_units();
        let units = if supply == 0 {
            value
        } else {
            mul_div(value, supply, self.total_assets()).ok_or(StrategyError::Overflow)?
        };
        self.asset.transfer(depositor, &self.address, value)?;
        *self.units.write().entry(depositor.to_string()).or_insert(0) += units;
        Ok(units)
    }

    fn redeem(&self, units: u64, owner: &str) -> Result<u64, StrategyError> {
        if self.rejecting_redeems.load(Ordering::SeqCst) {
            return Err(StrategyError::Rejected("redemptions closed".into()));
        }
        let held = self.balance_of(owner);
        if units > held {
            return Err(StrategyError::InsufficientUnits {
                held,
                requested: units,
            });
        }
        let value = self.convert_to_assets(units);
        self.asset.transfer(&self.address, owner, value)?;
        *self.units.write().entry(owner.to_string()).or_insert(0) -= units;
        Ok(value)
    }

    fn preview_withdraw(&self, value: u64) -> u64 {
        let supply = self.total_units();
        if supply == 0 {
            return value;
        }
        mul_div_ceil(value, supply, self.total_assets()).unwrap_or(u64::MAX)
    }

    fn balance_of(&self, holder: &str) -> u64 {
        self.units.read().get(holder).copied().unwrap_or(0)
    }

    fn convert_to_assets(&self, units: u64) -> u64 {
        let supply = self.total_units();
        if supply == 0 {
            return units;
        }
        mul_div(units, self.total_assets(), supply).unwrap_or(0)
    }
}

/// Externally-settled strategy whose venue readings are set by the test.
pub struct MockSettled {
    address: String,
    asset: Arc<InMemoryAsset>,
    readings: RwLock<HashMap<BalanceSource, Result<u64, String>>>,
    rejecting: AtomicBool,
}

impl MockSettled {
    pub fn new(address: &str, asset: Arc<InMemoryAsset>) -> Self {
        Self {
            address: address.to_string(),
            asset,
            readings: RwLock::new(HashMap::new()),
            rejecting: AtomicBool::new(false),
        }
    }

    /// While set, `deposit` fails with [`StrategyError::Rejected`].
    pub fn reject_deposits(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn set_reading(&self, source: BalanceSource, reading: Result<u64, String>) {
        self.readings.write().insert(source, reading);
    }

    /// Moves everything in the holding account to the venue's custodial
    /// vault, so it keeps counting through the `VaultEquity` reading.
    pub fn sweep(&self) {
        let held = self.holding_balance();
        self.asset.burn(&self.address, held).unwrap();
        let mut readings = self.readings.write();
        let current = readings
            .get(&BalanceSource::VaultEquity)
            .and_then(|r| r.clone().ok())
            .unwrap_or(0);
        readings.insert(BalanceSource::VaultEquity, Ok(current + held));
    }
}

impl SettledStrategy for MockSettled {
    fn address(&self) -> &str {
        &self.address
    }

    fn deposit(&self, value: u64, depositor: &str) -> Result<(), StrategyError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(StrategyError::Rejected("deposits closed".into()));
        }
        self.asset.transfer(depositor, &self.address, value)?;
        Ok(())
    }

    fn refund(&self, value: u64, to: &str) -> Result<(), StrategyError> {
        self.asset.transfer(&self.address, to, value)?;
        Ok(())
    }

    fn read_balance(&self, source: BalanceSource) -> Result<u64, VenueReadError> {
        match self.readings.read().get(&source) {
            Some(Ok(value)) => Ok(*value),
            Some(Err(reason)) => Err(VenueReadError {
                source_kind: source,
                reason: reason.clone(),
            }),
            None => Ok(0),
        }
    }

    fn holding_balance(&self) -> u64 {
        self.asset.balance_of(&self.address)
    }
}

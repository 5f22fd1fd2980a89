//! # Custodial Strategy Contract
//!
//! An externally-settled strategy. Capital arrives in a holding account,
//! is swept out to a [`SimulatedVenue`], and only comes back through an
//! explicit out-of-band sequence:
//!
//! 1. **Deposit**: the vault pushes capital into the holding account.
//! 2. **Sweep**: holding account → venue (credited as vault equity).
//! 3. **Recall**: venue equity → holding account.
//! 4. **Settle**: holding account → vault, through the vault's
//!    buffer-fill entry point, which closes the withdrawal backlog first.
//!
//! The vault only ever sees the [`SettledStrategy`] surface: deposit and
//! refund calls, three venue reads, and the holding balance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use tidepool_protocol::vault::FillReceipt;
use tidepool_protocol::{
    AssetError, AssetTransfer, BalanceSource, GatewayError, SettledStrategy, StrategyError,
    VaultGateway, VenueReadError,
};

use crate::venue::{SimulatedVenue, VenueError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while moving custodial funds.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CustodyError {
    /// Nothing to move.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Asset transfer failed.
    #[error("asset transfer failed: {0}")]
    Asset(#[from] AssetError),

    /// Venue bookkeeping failed.
    #[error("venue error: {0}")]
    Venue(#[from] VenueError),

    /// The vault rejected the settlement.
    #[error("settlement rejected: {0}")]
    Settlement(#[from] GatewayError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Kind of custodial fund movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    /// Vault → holding account.
    Deposit,
    /// Holding account → vault, reversing a deposit in the same call.
    Refund,
    /// Holding account → venue.
    Sweep,
    /// Venue → holding account.
    Recall,
    /// Holding account → vault.
    Settle,
}

/// One recorded movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyLeg {
    /// What moved where.
    pub kind: LegKind,
    /// Amount moved.
    pub amount: u64,
    /// When it moved.
    pub at: DateTime<Utc>,
}

/// Externally-settled strategy backed by a venue.
pub struct CustodialStrategy {
    address: String,
    asset: Arc<dyn AssetTransfer>,
    venue: Arc<SimulatedVenue>,
    history: RwLock<Vec<CustodyLeg>>,
}

impl CustodialStrategy {
    /// Creates a strategy whose holding account is `address`.
    pub fn new(
        address: impl Into<String>,
        asset: Arc<dyn AssetTransfer>,
        venue: Arc<SimulatedVenue>,
    ) -> Self {
        Self {
            address: address.into(),
            asset,
            venue,
            history: RwLock::new(Vec::new()),
        }
    }

    /// The venue this strategy settles through.
    pub fn venue(&self) -> &Arc<SimulatedVenue> {
        &self.venue
    }

    /// Every movement so far, oldest first.
    pub fn history(&self) -> Vec<CustodyLeg> {
        self.history.read().clone()
    }

    fn record(&self, kind: LegKind, amount: u64) {
        self.history.write().push(CustodyLeg {
            kind,
            amount,
            at: Utc::now(),
        });
    }

    /// Moves the whole holding balance to the venue. Returns the amount
    /// swept.
    pub fn sweep(&self) -> Result<u64, CustodyError> {
        let amount = self.holding_balance();
        if amount == 0 {
            return Ok(0);
        }
        self.venue.credit(BalanceSource::VaultEquity, amount)?;
        if let Err(e) = self
            .asset
            .transfer(&self.address, self.venue.custody_account(), amount)
        {
            let _ = self.venue.debit(BalanceSource::VaultEquity, amount);
            return Err(e.into());
        }
        self.record(LegKind::Sweep, amount);
        info!(strategy = %self.address, amount, "swept to venue");
        Ok(amount)
    }

    /// Pulls `amount` of vault equity back from the venue into the holding
    /// account.
    pub fn recall(&self, amount: u64) -> Result<(), CustodyError> {
        if amount == 0 {
            return Err(CustodyError::ZeroAmount);
        }
        self.venue.debit(BalanceSource::VaultEquity, amount)?;
        if let Err(e) = self
            .asset
            .transfer(self.venue.custody_account(), &self.address, amount)
        {
            let _ = self.venue.credit(BalanceSource::VaultEquity, amount);
            return Err(e.into());
        }
        self.record(LegKind::Recall, amount);
        info!(strategy = %self.address, amount, "recalled from venue");
        Ok(())
    }

    /// Returns `amount` from the holding account to the vault through its
    /// buffer-fill entry point.
    pub fn settle(&self, gateway: &VaultGateway, amount: u64) -> Result<FillReceipt, CustodyError> {
        if amount == 0 {
            return Err(CustodyError::ZeroAmount);
        }
        let receipt = gateway.fill_buffer(&self.address, amount)?;
        self.record(LegKind::Settle, amount);
        info!(
            strategy = %self.address,
            amount,
            to_queue = receipt.to_queue,
            to_buffer = receipt.to_buffer,
            "settled to vault"
        );
        Ok(receipt)
    }
}

impl SettledStrategy for CustodialStrategy {
    fn address(&self) -> &str {
        &self.address
    }

    fn deposit(&self, value: u64, depositor: &str) -> Result<(), StrategyError> {
        self.asset.transfer(depositor, &self.address, value)?;
        self.record(LegKind::Deposit, value);
        Ok(())
    }

    fn refund(&self, value: u64, to: &str) -> Result<(), StrategyError> {
        self.asset.transfer(&self.address, to, value)?;
        self.record(LegKind::Refund, value);
        info!(strategy = %self.address, value, "deposit refunded");
        Ok(())
    }

    fn read_balance(&self, source: BalanceSource) -> Result<u64, VenueReadError> {
        self.venue.read(source)
    }

    fn holding_balance(&self) -> u64 {
        self.asset.balance_of(&self.address)
    }
}

//! # Protocol Configuration & Constants
//!
//! Every magic number in Tidepool lives here. Allocation caps, the
//! withdrawal delay, and unit precision define how the vault treats its
//! depositors, so they are kept in one place and checked by tests.
//!
//! [`VaultConfig`] carries the per-deployment knobs. It is serde-friendly so
//! the node can load it from a JSON file, and [`VaultConfig::validate`] must
//! pass before a vault is constructed from it.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string of the ledger rules.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Allocation Parameters
// ---------------------------------------------------------------------------

/// One whole, in basis points. Allocation weights must sum to exactly this.
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Hard cap on a single strategy's target weight: 60%.
///
/// No single sub-strategy may be handed more than this share of the pool,
/// whatever the manager asks for.
pub const MAX_ALLOCATION_BPS: u16 = 6_000;

// ---------------------------------------------------------------------------
// Withdrawal Parameters
// ---------------------------------------------------------------------------

/// Minimum age of a queued withdrawal request before it can be claimed.
pub const WITHDRAW_DELAY: Duration = Duration::from_secs(5 * 24 * 60 * 60);

/// [`WITHDRAW_DELAY`] in whole seconds, for serde-facing configuration.
pub const WITHDRAW_DELAY_SECS: u64 = 5 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// Precision
// ---------------------------------------------------------------------------

/// Default decimal precision of the pooled asset (a 6-decimal stablecoin).
pub const DEFAULT_ASSET_DECIMALS: u8 = 6;

/// Default decimal precision of ownership units.
pub const DEFAULT_UNIT_DECIMALS: u8 = 6;

/// Largest allowed gap between unit and asset precision. Beyond this the
/// bootstrap scale factor stops fitting comfortably in `u64` arithmetic.
pub const MAX_DECIMALS_OFFSET: u8 = 12;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A [`VaultConfig`] that cannot be used to build a vault.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Units must be at least as precise as the asset they represent.
    #[error("unit decimals ({unit}) must be >= asset decimals ({asset})")]
    UnitPrecisionTooLow {
        /// Configured unit decimals.
        unit: u8,
        /// Configured asset decimals.
        asset: u8,
    },

    /// The bootstrap scale factor `10^(unit - asset)` is too large.
    #[error("decimals offset {offset} exceeds maximum of {max}")]
    OffsetTooLarge {
        /// `unit_decimals - asset_decimals`.
        offset: u8,
        /// [`MAX_DECIMALS_OFFSET`].
        max: u8,
    },

    /// A zero withdrawal delay would let queued requests bypass the queue.
    #[error("withdraw delay must be non-zero")]
    ZeroWithdrawDelay,
}

// ---------------------------------------------------------------------------
// VaultConfig
// ---------------------------------------------------------------------------

/// Deployment parameters for a single vault instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Decimal precision of the pooled asset.
    pub asset_decimals: u8,
    /// Decimal precision of issued ownership units.
    pub unit_decimals: u8,
    /// Seconds a queued withdrawal must age before it can be claimed.
    pub withdraw_delay_secs: u64,
    /// On-hand liquidity (minus claim reserve) the buffer manager tries to
    /// keep available while externally-settled strategies are registered.
    pub buffer_target: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            asset_decimals: DEFAULT_ASSET_DECIMALS,
            unit_decimals: DEFAULT_UNIT_DECIMALS,
            withdraw_delay_secs: WITHDRAW_DELAY_SECS,
            buffer_target: 0,
        }
    }
}

impl VaultConfig {
    /// Checks the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.unit_decimals < self.asset_decimals {
            return Err(ConfigError::UnitPrecisionTooLow {
                unit: self.unit_decimals,
                asset: self.asset_decimals,
            });
        }
        let offset = self.unit_decimals - self.asset_decimals;
        if offset > MAX_DECIMALS_OFFSET {
            return Err(ConfigError::OffsetTooLarge {
                offset,
                max: MAX_DECIMALS_OFFSET,
            });
        }
        if self.withdraw_delay_secs == 0 {
            return Err(ConfigError::ZeroWithdrawDelay);
        }
        Ok(())
    }

    /// Units minted per unit of asset when the vault has no outstanding units.
    pub fn bootstrap_scale(&self) -> u64 {
        10u64.pow(u32::from(self.unit_decimals.saturating_sub(self.asset_decimals)))
    }

    /// The withdrawal delay as a `chrono` duration.
    pub fn withdraw_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.withdraw_delay_secs.min(i64::MAX as u64) as i64)
    }
}

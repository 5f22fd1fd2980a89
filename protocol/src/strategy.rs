//! # Strategies & the Balance Oracle
//!
//! A strategy is somewhere the vault parks pooled capital to earn yield.
//! They come in two settlement classes and the difference matters to every
//! routing decision:
//!
//! - **Redeemable**: a share vault that converts units back to the asset
//!   within the same call. Counts toward instant liquidity; can be
//!   rebalanced.
//! - **Externally settled**: capital is moved to an external venue. The
//!   venue's balances are reported through read-only queries that may fail,
//!   and capital only comes back through an out-of-band process with
//!   unbounded delay (it re-enters the vault via the buffer-fill protocol).
//!
//! [`Strategy`] is a tagged enum over the two, so each variant exposes only
//! the operations it supports: there is no `redeem` on a settled strategy.
//!
//! The balance oracle ([`Strategy::value_of`]) answers "how much of the
//! pooled asset does `holder` have claim to here?". Settled-strategy read
//! failures degrade to zero with a warning; undercounting beats blocking
//! every vault operation on a venue outage.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::asset::AssetError;

/// Strategies are identified by their address on the asset ledger.
pub type StrategyId = String;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors a strategy collaborator may report on a mutating call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StrategyError {
    /// Moving the asset in or out of the strategy failed.
    #[error("asset transfer failed: {0}")]
    Asset(#[from] AssetError),

    /// The holder tried to redeem more units than it owns.
    #[error("insufficient units: held {held}, requested {requested}")]
    InsufficientUnits {
        /// Units currently held.
        held: u64,
        /// Units the caller tried to redeem.
        requested: u64,
    },

    /// The deposit is too small to mint a single unit.
    #[error("deposit of {0} would mint zero units")]
    ZeroUnits(u64),

    /// The strategy refused the call for its own reasons.
    #[error("strategy rejected the call: {0}")]
    Rejected(String),

    /// Share arithmetic overflowed.
    #[error("strategy arithmetic overflow")]
    Overflow,
}

/// A failed read against an external venue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{source_kind} read failed: {reason}")]
pub struct VenueReadError {
    /// Which balance query failed.
    pub source_kind: BalanceSource,
    /// Human-readable cause from the venue adapter.
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Settlement classes & balance sources
// ---------------------------------------------------------------------------

/// How quickly a strategy can return capital.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementClass {
    /// Converts back to the asset within the same call.
    Redeemable,
    /// Settles out of band through an external venue.
    ExternallySettled,
}

impl fmt::Display for SettlementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementClass::Redeemable => write!(f, "redeemable"),
            SettlementClass::ExternallySettled => write!(f, "externally-settled"),
        }
    }
}

/// The three independent balance reads an externally-settled venue exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSource {
    /// Equity held in the venue's custodial vault.
    VaultEquity,
    /// Spot token holdings.
    SpotHoldings,
    /// Margin / perpetuals account equity.
    PerpEquity,
}

impl BalanceSource {
    /// Every source, in the order the oracle sums them.
    pub const ALL: [BalanceSource; 3] = [
        BalanceSource::VaultEquity,
        BalanceSource::SpotHoldings,
        BalanceSource::PerpEquity,
    ];
}

impl fmt::Display for BalanceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceSource::VaultEquity => write!(f, "vault-equity"),
            BalanceSource::SpotHoldings => write!(f, "spot-holdings"),
            BalanceSource::PerpEquity => write!(f, "perp-equity"),
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// A synchronous-redeemable share vault.
///
/// Implementations must never partially fail: a call either completes in
/// full or returns an error with no effect.
pub trait RedeemableStrategy: Send + Sync {
    /// The strategy's address on the asset ledger.
    fn address(&self) -> &str;

    /// Pulls `value` of the asset from `depositor` and credits the minted
    /// units to `depositor`. Returns the units minted.
    fn deposit(&self, value: u64, depositor: &str) -> Result<u64, StrategyError>;

    /// Burns `units` held by `owner` and pays the asset out to `owner`.
    /// Returns the value paid.
    fn redeem(&self, units: u64, owner: &str) -> Result<u64, StrategyError>;

    /// Units that must be redeemed to receive at least `value` (rounded up).
    fn preview_withdraw(&self, value: u64) -> u64;

    /// Units held by `holder`.
    fn balance_of(&self, holder: &str) -> u64;

    /// Current asset value of `units` (rounded down).
    fn convert_to_assets(&self, units: u64) -> u64;
}

/// A strategy whose capital settles through an external venue.
pub trait SettledStrategy: Send + Sync {
    /// The strategy's holding account on the asset ledger.
    fn address(&self) -> &str;

    /// Pulls `value` of the asset from `depositor` into the holding account.
    /// Moving it onward to the venue happens out of band.
    fn deposit(&self, value: u64, depositor: &str) -> Result<(), StrategyError>;

    /// Sends `value` from the holding account back to `to`. Only used to
    /// reverse a deposit made earlier in the same call, so the funds are
    /// still in the holding account.
    fn refund(&self, value: u64, to: &str) -> Result<(), StrategyError>;

    /// One of the three venue balance queries. May fail.
    fn read_balance(&self, source: BalanceSource) -> Result<u64, VenueReadError>;

    /// Asset currently sitting in the holding account, not yet at the venue.
    fn holding_balance(&self) -> u64;
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// A registered strategy, tagged by settlement class.
#[derive(Clone)]
pub enum Strategy {
    /// Synchronous-redeemable.
    Redeemable(Arc<dyn RedeemableStrategy>),
    /// Externally settled.
    ExternallySettled(Arc<dyn SettledStrategy>),
}

impl Strategy {
    /// Wraps a redeemable strategy.
    pub fn redeemable(strategy: Arc<dyn RedeemableStrategy>) -> Self {
        Strategy::Redeemable(strategy)
    }

    /// Wraps an externally-settled strategy.
    pub fn externally_settled(strategy: Arc<dyn SettledStrategy>) -> Self {
        Strategy::ExternallySettled(strategy)
    }

    /// The strategy's identifier.
    pub fn id(&self) -> &str {
        match self {
            Strategy::Redeemable(s) => s.address(),
            Strategy::ExternallySettled(s) => s.address(),
        }
    }

    /// The strategy's settlement class.
    pub fn class(&self) -> SettlementClass {
        match self {
            Strategy::Redeemable(_) => SettlementClass::Redeemable,
            Strategy::ExternallySettled(_) => SettlementClass::ExternallySettled,
        }
    }

    /// `true` for externally-settled strategies.
    pub fn is_externally_settled(&self) -> bool {
        matches!(self, Strategy::ExternallySettled(_))
    }

    /// Routes `value` from `depositor` into the strategy.
    pub fn deposit(&self, value: u64, depositor: &str) -> Result<(), StrategyError> {
        match self {
            Strategy::Redeemable(s) => s.deposit(value, depositor).map(|_| ()),
            Strategy::ExternallySettled(s) => s.deposit(value, depositor),
        }
    }

    /// Balance oracle: asset value `holder` has claim to in this strategy.
    ///
    /// Never fails. For settled strategies, every failed venue read counts
    /// as zero and the holding account is always included. Settled
    /// strategies are dedicated to a single vault, so `holder` only matters
    /// for the redeemable variant.
    pub fn value_of(&self, holder: &str) -> u64 {
        match self {
            Strategy::Redeemable(s) => s.convert_to_assets(s.balance_of(holder)),
            Strategy::ExternallySettled(s) => {
                let reported = BalanceSource::ALL
                    .iter()
                    .map(|source| match s.read_balance(*source) {
                        Ok(value) => value,
                        Err(e) => {
                            warn!(strategy = s.address(), error = %e, "venue read degraded to zero");
                            0
                        }
                    })
                    .fold(0u64, |acc, v| acc.saturating_add(v));
                reported.saturating_add(s.holding_balance())
            }
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("id", &self.id())
            .field("class", &self.class())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::InMemoryAsset;
    use crate::testing::{MockRedeemable, MockSettled};

    #[test]
    fn redeemable_value_uses_exchange_rate() {
        let asset = Arc::new(InMemoryAsset::new());
        let strategy = Arc::new(MockRedeemable::new("yield-a", Arc::clone(&asset)));
        strategy.seed("vault", 100, 150);
        let handle = Strategy::redeemable(strategy);

        assert_eq!(handle.class(), SettlementClass::Redeemable);
        assert_eq!(handle.value_of("vault"), 150);
        assert_eq!(handle.value_of("someone-else"), 0);
    }

    #[test]
    fn settled_value_sums_sources_and_holding() {
        let asset = Arc::new(InMemoryAsset::new());
        let strategy = Arc::new(MockSettled::new("custody", Arc::clone(&asset)));
        strategy.set_reading(BalanceSource::VaultEquity, Ok(100));
        strategy.set_reading(BalanceSource::SpotHoldings, Ok(20));
        strategy.set_reading(BalanceSource::PerpEquity, Ok(5));
        asset.mint("custody", 7).unwrap();

        let handle = Strategy::externally_settled(strategy);
        assert!(handle.is_externally_settled());
        assert_eq!(handle.value_of("vault"), 132);
    }

    #[test]
    fn failed_venue_reads_degrade_to_zero() {
        let asset = Arc::new(InMemoryAsset::new());
        let strategy = Arc::new(MockSettled::new("custody", Arc::clone(&asset)));
        strategy.set_reading(BalanceSource::VaultEquity, Ok(100));
        strategy.set_reading(BalanceSource::SpotHoldings, Err("timeout".to_string()));
        strategy.set_reading(BalanceSource::PerpEquity, Err("503".to_string()));
        asset.mint("custody", 10).unwrap();

        let handle = Strategy::externally_settled(strategy);
        assert_eq!(handle.value_of("vault"), 110);
    }

    #[test]
    fn venue_read_error_names_source() {
        let err = VenueReadError {
            source_kind: BalanceSource::PerpEquity,
            reason: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "perp-equity read failed: rate limited");
    }
}

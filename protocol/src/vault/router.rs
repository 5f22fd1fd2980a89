//! # Liquidity Router & Rebalancer
//!
//! Moves pooled capital between the vault's on-hand balance and its
//! strategies:
//!
//! - [`distribute`](LiquidityRouter::distribute) splits fresh capital by
//!   target weight (integer division; dust stays on hand).
//! - [`rebalance`](LiquidityRouter::rebalance) pulls each over-weight
//!   strategy down to target, then tops up under-weight ones from what is
//!   on hand. Only valid when every entry is redeemable.
//! - [`redeem_instant`](LiquidityRouter::redeem_instant) drains redeemable
//!   strategies in table order to fund an instant withdrawal.
//!
//! The router also remembers strategies dropped from the table ("retired")
//! while they still hold value, so the ledger keeps counting that value
//! and the manager can [`recall`](LiquidityRouter::recall) it.
//!
//! Multi-leg operations are all-or-nothing: every leg that already moved
//! funds is journaled, and a failing leg reverses the journal newest first
//! before the error is returned.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::asset::AssetTransfer;
use crate::math::apply_bps;
use crate::strategy::{
    RedeemableStrategy, SettledStrategy, SettlementClass, Strategy, StrategyError, StrategyId,
};

use super::allocation::{AllocationEntry, AllocationError, AllocationTable};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Routing and rebalancing failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    /// The proposed allocation set was rejected.
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// Rebalance called with an empty allocation table.
    #[error("no allocations configured")]
    NoAllocations,

    /// Rebalance called while no strategy holds any value.
    #[error("no strategy holds assets")]
    NoStrategyAssets,

    /// Rebalance called while an externally-settled strategy is allocated.
    #[error("strategy {0} settles externally and cannot be rebalanced")]
    StrategyHasLockup(StrategyId),

    /// Redeemable strategies cannot cover an instant withdrawal.
    #[error("insufficient instant liquidity: requested {requested}, available {available}")]
    InsufficientInstantLiquidity {
        /// Value requested.
        requested: u64,
        /// Value redeemable right now.
        available: u64,
    },

    /// No retired strategy with this identifier.
    #[error("unknown retired strategy: {0}")]
    UnknownStrategy(StrategyId),

    /// The strategy cannot be redeemed synchronously.
    #[error("strategy {0} cannot be recalled synchronously")]
    NotRecallable(StrategyId),

    /// A strategy collaborator failed mid-operation.
    #[error("strategy {strategy} failed: {source}")]
    Strategy {
        /// The strategy that failed.
        strategy: StrategyId,
        /// The collaborator's error.
        source: StrategyError,
    },
}

impl RouterError {
    fn strategy(strategy: &Strategy, source: StrategyError) -> Self {
        RouterError::Strategy {
            strategy: strategy.id().to_string(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Value held in one strategy, for status views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyPosition {
    /// Strategy identifier.
    pub strategy: StrategyId,
    /// Settlement class.
    pub class: SettlementClass,
    /// Target weight, or `None` for retired strategies.
    pub weight_bps: Option<u16>,
    /// Oracle value attributable to the vault.
    pub value: u64,
}

/// A single capital movement performed by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingLeg {
    /// Strategy moved into or out of.
    pub strategy: StrategyId,
    /// Asset value moved.
    pub value: u64,
}

/// What a rebalance did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceReport {
    /// Total value the targets were computed against in pass 1.
    pub total_value: u64,
    /// Excess redeemed back to on-hand, pass 1.
    pub withdrawn: Vec<RoutingLeg>,
    /// Shortfall deposited from on-hand, pass 2.
    pub deposited: Vec<RoutingLeg>,
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// A leg that already moved funds within the current call.
enum Committed {
    /// A redeemable strategy minted `units` for a deposit.
    Minted(Arc<dyn RedeemableStrategy>, u64),
    /// `value` went into a settled strategy's holding account.
    Held(Arc<dyn SettledStrategy>, u64),
    /// `value` was redeemed out of a redeemable strategy.
    Redeemed(Arc<dyn RedeemableStrategy>, u64),
}

impl Committed {
    /// Deposits `value` from `holder` into `strategy`, journaling the leg.
    fn deposit(strategy: &Strategy, value: u64, holder: &str) -> Result<Self, StrategyError> {
        match strategy {
            Strategy::Redeemable(s) => s
                .deposit(value, holder)
                .map(|units| Committed::Minted(Arc::clone(s), units)),
            Strategy::ExternallySettled(s) => s
                .deposit(value, holder)
                .map(|()| Committed::Held(Arc::clone(s), value)),
        }
    }

    fn strategy(&self) -> &str {
        match self {
            Committed::Minted(s, _) | Committed::Redeemed(s, _) => s.address(),
            Committed::Held(s, _) => s.address(),
        }
    }

    fn reverse(&self, holder: &str) -> Result<(), StrategyError> {
        match self {
            Committed::Minted(s, units) => s.redeem(*units, holder).map(|_| ()),
            Committed::Held(s, value) => s.refund(*value, holder),
            Committed::Redeemed(s, value) => s.deposit(*value, holder).map(|_| ()),
        }
    }
}

/// Reverses `journal` newest first. A leg that cannot be reversed is
/// logged and skipped; the caller is already returning an error.
fn unwind(journal: Vec<Committed>, holder: &str) {
    for leg in journal.into_iter().rev() {
        if let Err(e) = leg.reverse(holder) {
            warn!(strategy = leg.strategy(), error = %e, "failed to reverse routing leg");
        }
    }
}

// ---------------------------------------------------------------------------
// LiquidityRouter
// ---------------------------------------------------------------------------

/// Owns the allocation table and every strategy the vault has ever routed to
/// that may still hold value.
#[derive(Debug, Default)]
pub struct LiquidityRouter {
    table: AllocationTable,
    retired: Vec<Strategy>,
}

impl LiquidityRouter {
    /// Creates a router with an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current allocation table.
    pub fn table(&self) -> &AllocationTable {
        &self.table
    }

    /// Strategies dropped from the table that still hold value.
    pub fn retired(&self) -> &[Strategy] {
        &self.retired
    }

    /// `true` if any allocated strategy settles externally.
    pub fn has_externally_settled(&self) -> bool {
        self.table.has_externally_settled()
    }

    /// Replaces the allocation table.
    ///
    /// Strategies dropped from the table move to the retired list if they
    /// still hold value for `holder`. Strategies re-added leave it.
    pub fn set_allocations(
        &mut self,
        entries: Vec<AllocationEntry>,
        holder: &str,
    ) -> Result<(), RouterError> {
        let previous = self.table.replace(entries)?;

        let table = &self.table;
        self.retired.retain(|s| !table.contains(s.id()));
        for entry in previous {
            let id = entry.strategy.id();
            if !table.contains(id) && !self.retired.iter().any(|s| s.id() == id) {
                self.retired.push(entry.strategy);
            }
        }
        self.retired.retain(|s| s.value_of(holder) > 0);

        info!(
            entries = self.table.entries().len(),
            retired = self.retired.len(),
            "allocation table replaced"
        );
        Ok(())
    }

    /// Oracle value across every allocated and retired strategy.
    pub fn strategies_value(&self, holder: &str) -> u64 {
        self.table
            .entries()
            .iter()
            .map(|e| &e.strategy)
            .chain(self.retired.iter())
            .fold(0u64, |acc, s| acc.saturating_add(s.value_of(holder)))
    }

    /// Per-strategy positions: table entries first, then retired ones.
    pub fn positions(&self, holder: &str) -> Vec<StrategyPosition> {
        let allocated = self.table.entries().iter().map(|e| StrategyPosition {
            strategy: e.strategy.id().to_string(),
            class: e.class(),
            weight_bps: Some(e.weight_bps),
            value: e.strategy.value_of(holder),
        });
        let retired = self.retired.iter().map(|s| StrategyPosition {
            strategy: s.id().to_string(),
            class: s.class(),
            weight_bps: None,
            value: s.value_of(holder),
        });
        allocated.chain(retired).collect()
    }

    /// Splits `amount` across the table by weight. Returns the total
    /// actually deposited; rounding dust stays with `holder`.
    ///
    /// If any strategy rejects its part, the parts already deposited are
    /// taken back out before the error is returned.
    pub fn distribute(&self, amount: u64, holder: &str) -> Result<u64, RouterError> {
        let mut journal = Vec::with_capacity(self.table.entries().len());
        let mut distributed = 0u64;
        for entry in self.table.entries() {
            let part = apply_bps(amount, entry.weight_bps);
            if part == 0 {
                continue;
            }
            match Committed::deposit(&entry.strategy, part, holder) {
                Ok(leg) => journal.push(leg),
                Err(e) => {
                    unwind(journal, holder);
                    return Err(RouterError::strategy(&entry.strategy, e));
                }
            }
            debug!(strategy = entry.strategy.id(), value = part, "distributed");
            distributed += part;
        }
        Ok(distributed)
    }

    /// Value that can be redeemed within this call: the sum over
    /// redeemable table entries.
    pub fn instant_liquidity(&self, holder: &str) -> u64 {
        self.table
            .entries()
            .iter()
            .filter(|e| !e.strategy.is_externally_settled())
            .fold(0u64, |acc, e| acc.saturating_add(e.strategy.value_of(holder)))
    }

    /// Redeems at least `value` from redeemable strategies, in table order,
    /// into `holder`. Returns the value actually received, which can exceed
    /// `value` by unit rounding.
    ///
    /// Fails without redeeming anything if the redeemable strategies cannot
    /// cover `value`, and puts back what was redeemed if a strategy fails
    /// part way through.
    pub fn redeem_instant(&self, value: u64, holder: &str) -> Result<u64, RouterError> {
        let available = self.instant_liquidity(holder);
        if available < value {
            return Err(RouterError::InsufficientInstantLiquidity {
                requested: value,
                available,
            });
        }

        let mut journal = Vec::new();
        let mut received = 0u64;
        for entry in self.table.entries() {
            if received >= value {
                break;
            }
            let Strategy::Redeemable(strategy) = &entry.strategy else {
                continue;
            };
            let held = strategy.balance_of(holder);
            if held == 0 {
                continue;
            }
            let units = strategy.preview_withdraw(value - received).min(held);
            if units == 0 {
                continue;
            }
            let got = match strategy.redeem(units, holder) {
                Ok(got) => got,
                Err(e) => {
                    unwind(journal, holder);
                    return Err(RouterError::strategy(&entry.strategy, e));
                }
            };
            debug!(strategy = strategy.address(), value = got, "redeemed for instant withdrawal");
            journal.push(Committed::Redeemed(Arc::clone(strategy), got));
            received = received.saturating_add(got);
        }

        if received < value {
            unwind(journal, holder);
            return Err(RouterError::InsufficientInstantLiquidity {
                requested: value,
                available: received,
            });
        }
        Ok(received)
    }

    /// Two-pass rebalance toward target weights.
    ///
    /// `reserve` is the claim reserve: on-hand asset earmarked for
    /// withdrawals, never redeployed. A failing leg reverses every leg
    /// before it.
    pub fn rebalance(
        &self,
        holder: &str,
        asset: &dyn AssetTransfer,
        reserve: u64,
    ) -> Result<RebalanceReport, RouterError> {
        if self.table.is_empty() {
            return Err(RouterError::NoAllocations);
        }
        if let Some(entry) = self
            .table
            .entries()
            .iter()
            .find(|e| e.strategy.is_externally_settled())
        {
            return Err(RouterError::StrategyHasLockup(
                entry.strategy.id().to_string(),
            ));
        }

        let values: Vec<u64> = self
            .table
            .entries()
            .iter()
            .map(|e| e.strategy.value_of(holder))
            .collect();
        let invested = values.iter().fold(0u64, |acc, v| acc.saturating_add(*v));
        if invested == 0 {
            return Err(RouterError::NoStrategyAssets);
        }

        let available = asset.balance_of(holder).saturating_sub(reserve);
        let total = invested.saturating_add(available);
        let mut report = RebalanceReport {
            total_value: total,
            ..RebalanceReport::default()
        };
        let mut journal = Vec::new();

        // Pass 1: bring every over-weight strategy down to target.
        for (entry, current) in self.table.entries().iter().zip(&values) {
            let target = apply_bps(total, entry.weight_bps);
            if *current <= target {
                continue;
            }
            let Strategy::Redeemable(strategy) = &entry.strategy else {
                continue;
            };
            let excess = current - target;
            let units = strategy
                .preview_withdraw(excess)
                .min(strategy.balance_of(holder));
            if units == 0 {
                continue;
            }
            let got = match strategy.redeem(units, holder) {
                Ok(got) => got,
                Err(e) => {
                    unwind(journal, holder);
                    return Err(RouterError::strategy(&entry.strategy, e));
                }
            };
            journal.push(Committed::Redeemed(Arc::clone(strategy), got));
            report.withdrawn.push(RoutingLeg {
                strategy: entry.strategy.id().to_string(),
                value: got,
            });
        }

        // Pass 2: recompute against live balances and fill shortfalls from
        // on-hand until it runs out.
        let mut available = asset.balance_of(holder).saturating_sub(reserve);
        let values: Vec<u64> = self
            .table
            .entries()
            .iter()
            .map(|e| e.strategy.value_of(holder))
            .collect();
        let total = values
            .iter()
            .fold(available, |acc, v| acc.saturating_add(*v));

        for (entry, current) in self.table.entries().iter().zip(&values) {
            if available == 0 {
                break;
            }
            let target = apply_bps(total, entry.weight_bps);
            if *current >= target {
                continue;
            }
            let amount = (target - current).min(available);
            match Committed::deposit(&entry.strategy, amount, holder) {
                Ok(leg) => journal.push(leg),
                Err(e) => {
                    unwind(journal, holder);
                    return Err(RouterError::strategy(&entry.strategy, e));
                }
            }
            available -= amount;
            report.deposited.push(RoutingLeg {
                strategy: entry.strategy.id().to_string(),
                value: amount,
            });
        }

        info!(
            total = report.total_value,
            withdrawn = report.withdrawn.len(),
            deposited = report.deposited.len(),
            "rebalance complete"
        );
        Ok(report)
    }

    /// Redeems the whole position of a retired redeemable strategy back to
    /// `holder` and forgets it. Returns the value recovered.
    pub fn recall(&mut self, id: &str, holder: &str) -> Result<u64, RouterError> {
        let index = self
            .retired
            .iter()
            .position(|s| s.id() == id)
            .ok_or_else(|| RouterError::UnknownStrategy(id.to_string()))?;

        let Strategy::Redeemable(strategy) = &self.retired[index] else {
            return Err(RouterError::NotRecallable(id.to_string()));
        };

        let units = strategy.balance_of(holder);
        let recovered = if units == 0 {
            0
        } else {
            strategy
                .redeem(units, holder)
                .map_err(|e| RouterError::strategy(&self.retired[index], e))?
        };

        self.retired.remove(index);
        info!(strategy = id, value = recovered, "retired strategy recalled");
        Ok(recovered)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::InMemoryAsset;
    use crate::testing::{MockRedeemable, MockSettled};
    use std::sync::Arc;

    const VAULT: &str = "vault";

    struct Fixture {
        asset: Arc<InMemoryAsset>,
        a: Arc<MockRedeemable>,
        b: Arc<MockRedeemable>,
        router: LiquidityRouter,
    }

    fn fixture(weight_a: u16, weight_b: u16) -> Fixture {
        let asset = Arc::new(InMemoryAsset::new());
        let a = Arc::new(MockRedeemable::new("strategy-a", Arc::clone(&asset)));
        let b = Arc::new(MockRedeemable::new("strategy-b", Arc::clone(&asset)));
        let mut router = LiquidityRouter::new();
        router
            .set_allocations(
                vec![
                    AllocationEntry::new(Strategy::redeemable(a.clone()), weight_a),
                    AllocationEntry::new(Strategy::redeemable(b.clone()), weight_b),
                ],
                VAULT,
            )
            .unwrap();
        Fixture {
            asset,
            a,
            b,
            router,
        }
    }

    #[test]
    fn distribute_splits_by_weight_and_leaves_dust() {
        let f = fixture(5_000, 5_000);
        f.asset.mint(VAULT, 1_001).unwrap();

        let distributed = f.router.distribute(1_001, VAULT).unwrap();
        assert_eq!(distributed, 1_000);
        assert_eq!(f.asset.balance_of("strategy-a"), 500);
        assert_eq!(f.asset.balance_of("strategy-b"), 500);
        assert_eq!(f.asset.balance_of(VAULT), 1);
    }

    #[test]
    fn rejected_leg_takes_earlier_legs_back_out() {
        let f = fixture(5_000, 5_000);
        f.b.reject_deposits(true);
        f.asset.mint(VAULT, 1_000).unwrap();

        let err = f.router.distribute(1_000, VAULT).unwrap_err();
        assert!(matches!(
            err,
            RouterError::Strategy { ref strategy, source: StrategyError::Rejected(_) }
                if strategy == "strategy-b"
        ));
        assert_eq!(f.a.balance_of(VAULT), 0);
        assert_eq!(f.asset.balance_of("strategy-a"), 0);
        assert_eq!(f.asset.balance_of(VAULT), 1_000);
    }

    #[test]
    fn rejected_leg_refunds_settled_holding() {
        let asset = Arc::new(InMemoryAsset::new());
        let c = Arc::new(MockSettled::new("custody", Arc::clone(&asset)));
        let a = Arc::new(MockRedeemable::new("strategy-a", Arc::clone(&asset)));
        a.reject_deposits(true);
        let mut router = LiquidityRouter::new();
        router
            .set_allocations(
                vec![
                    AllocationEntry::new(Strategy::externally_settled(c), 4_000),
                    AllocationEntry::new(Strategy::redeemable(a), 6_000),
                ],
                VAULT,
            )
            .unwrap();
        asset.mint(VAULT, 1_000).unwrap();

        assert!(router.distribute(1_000, VAULT).is_err());
        assert_eq!(asset.balance_of("custody"), 0);
        assert_eq!(asset.balance_of(VAULT), 1_000);
    }

    #[test]
    fn failed_redemption_puts_earlier_redemptions_back() {
        let f = fixture(5_000, 5_000);
        f.a.seed(VAULT, 100, 100);
        f.b.seed(VAULT, 100, 100);
        f.b.reject_redeems(true);

        let err = f.router.redeem_instant(150, VAULT).unwrap_err();
        assert!(matches!(err, RouterError::Strategy { ref strategy, .. } if strategy == "strategy-b"));
        assert_eq!(f.a.convert_to_assets(f.a.balance_of(VAULT)), 100);
        assert_eq!(f.b.balance_of(VAULT), 100);
        assert_eq!(f.asset.balance_of(VAULT), 0);
    }

    #[test]
    fn failed_rebalance_leg_restores_positions() {
        let f = fixture(5_000, 5_000);
        f.a.seed(VAULT, 70, 70);
        f.b.seed(VAULT, 110, 110);
        f.a.reject_deposits(true);

        let before = f.router.positions(VAULT);
        assert!(f.router.rebalance(VAULT, f.asset.as_ref(), 0).is_err());
        assert_eq!(f.router.positions(VAULT), before);
        assert_eq!(f.asset.balance_of(VAULT), 0);
    }

    #[test]
    fn instant_liquidity_ignores_settled_strategies() {
        let asset = Arc::new(InMemoryAsset::new());
        let a = Arc::new(MockRedeemable::new("strategy-a", Arc::clone(&asset)));
        let c = Arc::new(MockSettled::new("custody", Arc::clone(&asset)));
        let mut router = LiquidityRouter::new();
        router
            .set_allocations(
                vec![
                    AllocationEntry::new(Strategy::redeemable(a.clone()), 6_000),
                    AllocationEntry::new(Strategy::externally_settled(c.clone()), 4_000),
                ],
                VAULT,
            )
            .unwrap();
        asset.mint(VAULT, 1_000).unwrap();
        router.distribute(1_000, VAULT).unwrap();

        assert_eq!(router.instant_liquidity(VAULT), 600);
        assert_eq!(router.strategies_value(VAULT), 1_000);
    }

    #[test]
    fn redeem_instant_drains_in_table_order() {
        let f = fixture(5_000, 5_000);
        f.a.seed(VAULT, 100, 100);
        f.b.seed(VAULT, 100, 100);

        let received = f.router.redeem_instant(150, VAULT).unwrap();
        assert_eq!(received, 150);
        assert_eq!(f.a.balance_of(VAULT), 0);
        assert_eq!(f.b.balance_of(VAULT), 50);
        assert_eq!(f.asset.balance_of(VAULT), 150);
    }

    #[test]
    fn redeem_instant_shortfall_redeems_nothing() {
        let f = fixture(5_000, 5_000);
        f.a.seed(VAULT, 100, 100);
        f.b.seed(VAULT, 100, 100);

        let result = f.router.redeem_instant(201, VAULT);
        assert_eq!(
            result,
            Err(RouterError::InsufficientInstantLiquidity {
                requested: 201,
                available: 200
            })
        );
        assert_eq!(f.a.balance_of(VAULT), 100);
        assert_eq!(f.asset.balance_of(VAULT), 0);
    }

    #[test]
    fn rebalance_moves_excess_to_shortfall() {
        let f = fixture(5_000, 5_000);
        f.a.seed(VAULT, 70, 70);
        f.b.seed(VAULT, 110, 110);

        let report = f.router.rebalance(VAULT, f.asset.as_ref(), 0).unwrap();
        assert_eq!(report.total_value, 180);
        assert_eq!(report.withdrawn.len(), 1);
        assert_eq!(report.withdrawn[0].strategy, "strategy-b");
        assert_eq!(report.withdrawn[0].value, 20);
        assert_eq!(report.deposited[0].strategy, "strategy-a");
        assert_eq!(report.deposited[0].value, 20);

        assert_eq!(f.a.convert_to_assets(f.a.balance_of(VAULT)), 90);
        assert_eq!(f.b.convert_to_assets(f.b.balance_of(VAULT)), 90);
    }

    #[test]
    fn rebalance_is_idempotent() {
        let f = fixture(6_000, 4_000);
        f.a.seed(VAULT, 10, 10);
        f.b.seed(VAULT, 990, 990);

        f.router.rebalance(VAULT, f.asset.as_ref(), 0).unwrap();
        let first = f.router.positions(VAULT);
        let second_report = f.router.rebalance(VAULT, f.asset.as_ref(), 0).unwrap();
        let second = f.router.positions(VAULT);

        assert_eq!(first, second);
        assert!(second_report.withdrawn.is_empty());
        assert_eq!(second[0].value, 600);
        assert_eq!(second[1].value, 400);
    }

    #[test]
    fn rebalance_never_spends_the_reserve() {
        let f = fixture(5_000, 5_000);
        f.a.seed(VAULT, 100, 100);
        f.asset.mint(VAULT, 50).unwrap();

        // All 50 on hand is reserved; only the 100 invested is in play.
        f.router.rebalance(VAULT, f.asset.as_ref(), 50).unwrap();
        assert_eq!(f.asset.balance_of(VAULT), 50);
        assert_eq!(f.a.convert_to_assets(f.a.balance_of(VAULT)), 50);
        assert_eq!(f.b.convert_to_assets(f.b.balance_of(VAULT)), 50);
    }

    #[test]
    fn rebalance_preconditions() {
        let router = LiquidityRouter::new();
        let asset = InMemoryAsset::new();
        assert_eq!(
            router.rebalance(VAULT, &asset, 0),
            Err(RouterError::NoAllocations)
        );

        let f = fixture(5_000, 5_000);
        assert_eq!(
            f.router.rebalance(VAULT, f.asset.as_ref(), 0),
            Err(RouterError::NoStrategyAssets)
        );

        let asset = Arc::new(InMemoryAsset::new());
        let a = Arc::new(MockRedeemable::new("strategy-a", Arc::clone(&asset)));
        let c = Arc::new(MockSettled::new("custody", Arc::clone(&asset)));
        let mut router = LiquidityRouter::new();
        router
            .set_allocations(
                vec![
                    AllocationEntry::new(Strategy::redeemable(a), 5_000),
                    AllocationEntry::new(Strategy::externally_settled(c), 5_000),
                ],
                VAULT,
            )
            .unwrap();
        assert_eq!(
            router.rebalance(VAULT, asset.as_ref(), 0),
            Err(RouterError::StrategyHasLockup("custody".to_string()))
        );
    }

    #[test]
    fn dropped_strategy_with_value_is_retired_then_recalled() {
        let mut f = fixture(5_000, 5_000);
        f.a.seed(VAULT, 100, 100);
        let c = Arc::new(MockRedeemable::new("strategy-c", Arc::clone(&f.asset)));

        f.router
            .set_allocations(
                vec![
                    AllocationEntry::new(Strategy::redeemable(f.b.clone()), 5_000),
                    AllocationEntry::new(Strategy::redeemable(c), 5_000),
                ],
                VAULT,
            )
            .unwrap();

        assert_eq!(f.router.retired().len(), 1);
        assert_eq!(f.router.strategies_value(VAULT), 100);
        assert_eq!(f.router.instant_liquidity(VAULT), 0);

        let recovered = f.router.recall("strategy-a", VAULT).unwrap();
        assert_eq!(recovered, 100);
        assert!(f.router.retired().is_empty());
        assert_eq!(f.asset.balance_of(VAULT), 100);
        assert_eq!(
            f.router.recall("strategy-a", VAULT),
            Err(RouterError::UnknownStrategy("strategy-a".to_string()))
        );
    }

    #[test]
    fn empty_dropped_strategy_is_forgotten() {
        let mut f = fixture(5_000, 5_000);
        let c = Arc::new(MockRedeemable::new("strategy-c", Arc::clone(&f.asset)));
        f.router
            .set_allocations(
                vec![
                    AllocationEntry::new(Strategy::redeemable(f.b.clone()), 5_000),
                    AllocationEntry::new(Strategy::redeemable(c), 5_000),
                ],
                VAULT,
            )
            .unwrap();
        assert!(f.router.retired().is_empty());
    }
}

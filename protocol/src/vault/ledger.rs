//! # Vault Ledger
//!
//! [`Vault`] ties the pieces together: it prices ownership units against the
//! whole pool, takes deposits in, pays withdrawals out (instantly or through
//! the queue), and accepts buffer fills from anyone returning liquidity.
//!
//! ```text
//! total_value = on-hand asset + Σ oracle value(strategy)   (allocated + retired)
//! total_units = spendable units + escrowed units
//! ```
//!
//! Conservation: no operation here changes `total_value` without a matching
//! unit burn, apart from integer rounding (which always favors the vault)
//! and value changes reported by the strategies themselves.
//!
//! Every method takes `&mut self`; serialization across callers and
//! reentrancy protection are the gateway's concern.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::asset::{Address, AssetError, AssetTransfer};
use crate::clock::Clock;
use crate::config::{ConfigError, VaultConfig};
use crate::math::{mul_div, mul_div_ceil};

use super::allocation::AllocationEntry;
use super::events::VaultEvent;
use super::queue::{QueueError, RequestId, RequestView, WithdrawalQueue, WithdrawalRequest};
use super::router::{LiquidityRouter, RebalanceReport, RouterError, StrategyPosition};
use super::units::{UnitError, UnitLedger};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by vault operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    /// The vault configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// An asset transfer failed.
    #[error("asset transfer failed: {0}")]
    Asset(#[from] AssetError),

    /// Unit ledger failure.
    #[error(transparent)]
    Units(#[from] UnitError),

    /// Routing, allocation, or rebalance failure.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Queue or claim failure.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Amounts must be non-zero.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// The deposit is too small to mint a single unit.
    #[error("deposit of {0} would mint zero units")]
    ZeroUnits(u64),

    /// Units are outstanding but the pool reports no value.
    #[error("vault is insolvent: {units} units outstanding against zero value")]
    Insolvent {
        /// Outstanding units.
        units: u64,
    },

    /// Share arithmetic overflowed.
    #[error("arithmetic overflow")]
    Overflow,

    /// The vault's own account cannot deposit into or fund the vault.
    #[error("{0} is the vault's own account")]
    OwnAccount(Address),
}

// ---------------------------------------------------------------------------
// Results & views
// ---------------------------------------------------------------------------

/// How a withdrawal was serviced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WithdrawalOutcome {
    /// Paid within the call.
    Instant {
        /// Units burned.
        units: u64,
        /// Value paid.
        value: u64,
        /// Portion redeemed from strategies to fund it.
        from_strategies: u64,
    },
    /// Recorded as a request; claim once it unlocks.
    Queued {
        /// The new request.
        request: WithdrawalRequest,
    },
}

/// Result of a successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    /// Requests paid, in index order.
    pub request_ids: Vec<RequestId>,
    /// Escrowed units burned.
    pub units: u64,
    /// Value paid to the owner.
    pub value: u64,
}

/// How a buffer fill was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReceipt {
    /// Portion that closed queue backlog (now in the claim reserve).
    pub to_queue: u64,
    /// Portion left on hand as instant-withdrawal buffer.
    pub to_buffer: u64,
}

/// A depositor's position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    /// Account address.
    pub owner: Address,
    /// Spendable units.
    pub units: u64,
    /// Current value of the spendable units.
    pub value: u64,
    /// Pending withdrawal requests.
    pub requests: Vec<RequestView>,
}

/// Point-in-time summary of the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultStatus {
    /// Vault address.
    pub address: Address,
    /// Pool value.
    pub total_value: u64,
    /// Units outstanding, escrow included.
    pub total_units: u64,
    /// Units escrowed behind requests.
    pub escrowed_units: u64,
    /// Asset held by the vault itself.
    pub on_hand: u64,
    /// On-hand asset earmarked for requests.
    pub claim_reserve: u64,
    /// Manager-configured buffer target.
    pub buffer_target: u64,
    /// Value redeemable from strategies within one call.
    pub instant_liquidity: u64,
    /// Value a new withdrawal could receive instantly.
    pub available_to_withdraw: u64,
    /// Queue backlog not yet backed by on-hand asset.
    pub queue_deficit: u64,
    /// Queue backlog plus buffer shortfall.
    pub withdraw_deficit: u64,
    /// Live requests.
    pub pending_requests: usize,
    /// Accounts with spendable units.
    pub holders: usize,
    /// Per-strategy positions.
    pub positions: Vec<StrategyPosition>,
    /// Time the summary was taken.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// The pooled-fund ledger.
pub struct Vault {
    address: Address,
    asset: Arc<dyn AssetTransfer>,
    units: UnitLedger,
    router: LiquidityRouter,
    queue: WithdrawalQueue,
    config: VaultConfig,
    clock: Arc<dyn Clock>,
    events: Vec<VaultEvent>,
}

impl Vault {
    /// Creates an empty vault holding its asset at `address`.
    pub fn new(
        address: impl Into<Address>,
        asset: Arc<dyn AssetTransfer>,
        config: VaultConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, VaultError> {
        config.validate()?;
        let address = address.into();
        info!(vault = %address, buffer_target = config.buffer_target, "vault created");
        Ok(Self {
            address,
            asset,
            units: UnitLedger::new(),
            router: LiquidityRouter::new(),
            queue: WithdrawalQueue::new(),
            config,
            clock,
            events: Vec::new(),
        })
    }

    // -- accessors ----------------------------------------------------------

    /// The vault's account on the asset ledger.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Current configuration.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// The unit ledger.
    pub fn units(&self) -> &UnitLedger {
        &self.units
    }

    /// The router and its allocation table.
    pub fn router(&self) -> &LiquidityRouter {
        &self.router
    }

    /// The withdrawal queue.
    pub fn queue(&self) -> &WithdrawalQueue {
        &self.queue
    }

    /// Current time according to the vault's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -- accounting ---------------------------------------------------------

    /// Asset held directly by the vault.
    pub fn on_hand(&self) -> u64 {
        self.asset.balance_of(&self.address)
    }

    /// On-hand asset not earmarked for claims.
    fn available_on_hand(&self) -> u64 {
        self.on_hand().saturating_sub(self.queue.claim_reserve())
    }

    /// On-hand asset plus the oracle value of every strategy the router
    /// knows about.
    pub fn total_value(&self) -> u64 {
        self.on_hand()
            .saturating_add(self.router.strategies_value(&self.address))
    }

    /// Units outstanding, escrowed included.
    pub fn total_units(&self) -> u64 {
        self.units.total_units()
    }

    /// Units a deposit of `value` would mint right now (rounded down).
    pub fn preview_issue(&self, value: u64) -> Result<u64, VaultError> {
        let supply = self.total_units();
        if supply == 0 {
            return value
                .checked_mul(self.config.bootstrap_scale())
                .ok_or(VaultError::Overflow);
        }
        let total = self.solvent_total(supply)?;
        mul_div(value, supply, total).ok_or(VaultError::Overflow)
    }

    /// Asset value of `units` at the current rate (rounded down).
    pub fn convert_to_value(&self, units: u64) -> Result<u64, VaultError> {
        let supply = self.total_units();
        if supply == 0 {
            return Ok(units / self.config.bootstrap_scale());
        }
        mul_div(units, self.total_value(), supply).ok_or(VaultError::Overflow)
    }

    /// Units that must be given up to receive `value` (rounded up).
    pub fn convert_to_units(&self, value: u64) -> Result<u64, VaultError> {
        let supply = self.total_units();
        if supply == 0 {
            return value
                .checked_mul(self.config.bootstrap_scale())
                .ok_or(VaultError::Overflow);
        }
        let total = self.solvent_total(supply)?;
        mul_div_ceil(value, supply, total).ok_or(VaultError::Overflow)
    }

    fn solvent_total(&self, supply: u64) -> Result<u64, VaultError> {
        match self.total_value() {
            0 => Err(VaultError::Insolvent { units: supply }),
            total => Ok(total),
        }
    }

    // -- deposits -----------------------------------------------------------

    /// Pulls `value` from `owner`, mints units at the pre-deposit rate, and
    /// routes the capital. Returns the units minted.
    ///
    /// If routing fails the deposit is reverted: the units are burned and
    /// the asset goes back to `owner`, less any rounding a strategy kept
    /// when its leg was reversed.
    pub fn deposit(&mut self, owner: &str, value: u64) -> Result<u64, VaultError> {
        self.ensure_external(owner)?;
        if value == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let units = self.preview_issue(value)?;
        if units == 0 {
            return Err(VaultError::ZeroUnits(value));
        }
        self.total_units()
            .checked_add(units)
            .ok_or(UnitError::Overflow(units))?;

        self.asset.transfer(owner, &self.address, value)?;
        self.units.mint(owner, units)?;
        let mark = self.events.len();
        self.events.push(VaultEvent::Deposited {
            owner: owner.to_string(),
            value,
            units,
        });

        let on_hand = self.on_hand();
        if let Err(e) = self.post_deposit(value) {
            self.events.truncate(mark);
            let kept = on_hand.saturating_sub(self.on_hand());
            let refund = value - kept.min(value);
            self.units.burn(owner, units)?;
            self.asset.transfer(&self.address, owner, refund)?;
            warn!(owner, value, refund, error = %e, "deposit reverted: routing failed");
            return Err(e);
        }
        info!(owner, value, units, "deposit");
        Ok(units)
    }

    /// Routes freshly deposited capital.
    ///
    /// With an externally-settled strategy allocated, the queue backlog is
    /// closed first, then the buffer is topped up to target, and only the
    /// rest is distributed. Otherwise everything is distributed. Nothing is
    /// recorded against the queue unless distribution succeeds.
    fn post_deposit(&mut self, value: u64) -> Result<(), VaultError> {
        let mut to_queue = 0;
        let mut keep = 0;

        if self.router.has_externally_settled() {
            to_queue = value.min(self.queue.deficit());
            self.queue
                .claim_reserve()
                .checked_add(to_queue)
                .ok_or(QueueError::Overflow)?;

            // Unreserved on-hand, not counting this deposit.
            let buffer = self.available_on_hand().saturating_sub(value);
            keep = self
                .config
                .buffer_target
                .saturating_sub(buffer)
                .min(value - to_queue);
        }

        let remaining = value - to_queue - keep;
        let distributed = if remaining > 0 && !self.router.table().is_empty() {
            self.router.distribute(remaining, &self.address)?
        } else {
            0
        };

        self.apply_fill(to_queue)?;
        if keep > 0 {
            self.events
                .push(VaultEvent::BufferToppedUp { amount: keep });
        }
        if distributed > 0 {
            debug!(distributed, "post-deposit distribution");
            self.events.push(VaultEvent::Distributed { value: distributed });
        }
        Ok(())
    }

    fn ensure_external(&self, who: &str) -> Result<(), VaultError> {
        if who == self.address {
            return Err(VaultError::OwnAccount(who.to_string()));
        }
        Ok(())
    }

    // -- withdrawals --------------------------------------------------------

    /// Withdraws exactly `value`, burning the units it costs (rounded up).
    pub fn withdraw(&mut self, owner: &str, value: u64) -> Result<WithdrawalOutcome, VaultError> {
        if value == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let units = self.convert_to_units(value)?;
        self.route_withdrawal(owner, units, value)
    }

    /// Redeems `units`, paying their current value (rounded down).
    pub fn redeem(&mut self, owner: &str, units: u64) -> Result<WithdrawalOutcome, VaultError> {
        let value = self.priced_units(units)?;
        self.route_withdrawal(owner, units, value)
    }

    /// Queues a withdrawal of `units` even if it could be paid instantly.
    pub fn request_withdrawal(
        &mut self,
        owner: &str,
        units: u64,
    ) -> Result<WithdrawalRequest, VaultError> {
        let value = self.priced_units(units)?;
        self.ensure_units(owner, units)?;
        self.enqueue(owner, units, value)
    }

    fn priced_units(&self, units: u64) -> Result<u64, VaultError> {
        if units == 0 {
            return Err(VaultError::ZeroAmount);
        }
        match self.convert_to_value(units)? {
            0 => Err(VaultError::ZeroAmount),
            value => Ok(value),
        }
    }

    fn ensure_units(&self, owner: &str, units: u64) -> Result<(), VaultError> {
        let available = self.units.balance_of(owner);
        if available < units {
            return Err(UnitError::InsufficientUnits {
                owner: owner.to_string(),
                available,
                requested: units,
            }
            .into());
        }
        Ok(())
    }

    /// Pays instantly if on-hand plus redeemable liquidity covers `value`,
    /// otherwise queues the whole request.
    fn route_withdrawal(
        &mut self,
        owner: &str,
        units: u64,
        value: u64,
    ) -> Result<WithdrawalOutcome, VaultError> {
        self.ensure_units(owner, units)?;

        let on_hand = self.available_on_hand();
        let instant = self.router.instant_liquidity(&self.address);
        if value > on_hand.saturating_add(instant) {
            let request = self.enqueue(owner, units, value)?;
            return Ok(WithdrawalOutcome::Queued { request });
        }

        let from_strategies = if value > on_hand {
            self.router.redeem_instant(value - on_hand, &self.address)?
        } else {
            0
        };

        self.asset.transfer(&self.address, owner, value)?;
        self.units.burn(owner, units)?;
        info!(owner, units, value, from_strategies, "instant withdrawal");
        self.events.push(VaultEvent::Withdrawn {
            owner: owner.to_string(),
            units,
            value,
            from_strategies,
        });
        Ok(WithdrawalOutcome::Instant {
            units,
            value,
            from_strategies,
        })
    }

    fn enqueue(
        &mut self,
        owner: &str,
        units: u64,
        value: u64,
    ) -> Result<WithdrawalRequest, VaultError> {
        let available_now = self.available_on_hand();
        let created_at = self.clock.now();
        let claimable_at = created_at + self.config.withdraw_delay();

        self.queue.check_enqueue(value, available_now)?;
        self.units.escrow(owner, units)?;
        let request = self.queue.enqueue(
            owner,
            units,
            value,
            available_now,
            created_at,
            claimable_at,
        )?;

        info!(
            owner,
            request_id = request.id,
            units,
            value,
            fill_at = %request.fill_at,
            "withdrawal queued"
        );
        self.events.push(VaultEvent::WithdrawalQueued {
            owner: owner.to_string(),
            request_id: request.id,
            units,
            value,
            fill_at: request.fill_at,
            claimable_at,
        });
        Ok(request)
    }

    /// Pays out the owner's requests at `indexes` (strictly ascending).
    /// Every referenced request must be claimable or nothing happens.
    pub fn claim(&mut self, owner: &str, indexes: &[usize]) -> Result<ClaimReceipt, VaultError> {
        let totals = self.queue.validate_claim(owner, indexes, self.clock.now())?;
        if self.units.escrowed() < totals.units {
            return Err(UnitError::InsufficientEscrow {
                escrowed: self.units.escrowed(),
                requested: totals.units,
            }
            .into());
        }

        self.asset.transfer(&self.address, owner, totals.value)?;
        let claimed = self.queue.take_claims(owner, indexes);
        self.units.burn_escrowed(totals.units)?;

        let request_ids: Vec<RequestId> = claimed.iter().map(|r| r.id).collect();
        info!(owner, ?request_ids, value = totals.value, "claimed");
        self.events.push(VaultEvent::Claimed {
            owner: owner.to_string(),
            request_ids: request_ids.clone(),
            units: totals.units,
            value: totals.value,
        });
        Ok(ClaimReceipt {
            request_ids,
            units: totals.units,
            value: totals.value,
        })
    }

    // -- buffer -------------------------------------------------------------

    /// Accepts `amount` of asset from `supplier`. The queue backlog is
    /// closed first; the remainder stays on hand as buffer.
    ///
    /// The vault's own account is refused as `supplier`: moving asset it
    /// already holds would count reserved funds twice.
    pub fn fill_buffer(&mut self, supplier: &str, amount: u64) -> Result<FillReceipt, VaultError> {
        self.ensure_external(supplier)?;
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.asset.transfer(supplier, &self.address, amount)?;
        let to_queue = self.apply_fill(amount)?;
        let to_buffer = amount - to_queue;
        if to_buffer > 0 {
            self.events
                .push(VaultEvent::BufferToppedUp { amount: to_buffer });
        }
        info!(supplier, amount, to_queue, to_buffer, "buffer filled");
        Ok(FillReceipt {
            to_queue,
            to_buffer,
        })
    }

    fn apply_fill(&mut self, amount: u64) -> Result<u64, VaultError> {
        let applied = self.queue.apply_fill(amount)?;
        if applied > 0 {
            self.events.push(VaultEvent::QueueFilled {
                amount: applied,
                queue_filled: self.queue.queue_filled(),
                queued_to_fill: self.queue.queued_to_fill(),
            });
        }
        Ok(applied)
    }

    /// Updates the buffer target.
    pub fn set_buffer_target(&mut self, target: u64) {
        self.config.buffer_target = target;
        info!(target, "buffer target updated");
        self.events
            .push(VaultEvent::BufferTargetUpdated { target });
    }

    // -- allocation & routing -----------------------------------------------

    /// Replaces the allocation table as a whole.
    pub fn set_allocations(&mut self, entries: Vec<AllocationEntry>) -> Result<(), VaultError> {
        self.router.set_allocations(entries, &self.address)?;
        self.events.push(VaultEvent::AllocationsUpdated {
            entries: self.router.table().views(),
        });
        Ok(())
    }

    /// Moves capital between redeemable strategies toward target weights.
    pub fn rebalance(&mut self) -> Result<RebalanceReport, VaultError> {
        let report = self.router.rebalance(
            &self.address,
            self.asset.as_ref(),
            self.queue.claim_reserve(),
        )?;
        self.events.push(VaultEvent::Rebalanced {
            report: report.clone(),
        });
        Ok(report)
    }

    /// Redeems a retired strategy's whole position back on hand.
    pub fn recall(&mut self, strategy: &str) -> Result<u64, VaultError> {
        let value = self.router.recall(strategy, &self.address)?;
        self.events.push(VaultEvent::StrategyRecalled {
            strategy: strategy.to_string(),
            value,
        });
        Ok(value)
    }

    // -- views --------------------------------------------------------------

    /// Value redeemable from strategies within one call.
    pub fn instant_liquidity(&self) -> u64 {
        self.router.instant_liquidity(&self.address)
    }

    /// Largest withdrawal that would be paid instantly right now.
    pub fn available_to_withdraw(&self) -> u64 {
        self.available_on_hand()
            .saturating_add(self.instant_liquidity())
    }

    /// Queue backlog not yet backed by on-hand asset.
    pub fn queue_deficit(&self) -> u64 {
        self.queue.deficit()
    }

    /// How far unreserved on-hand asset sits below the buffer target. Zero
    /// unless an externally-settled strategy is allocated.
    pub fn buffer_shortfall(&self) -> u64 {
        if !self.router.has_externally_settled() {
            return 0;
        }
        self.config
            .buffer_target
            .saturating_sub(self.available_on_hand())
    }

    /// Liquidity the vault wants from buffer fills: backlog plus buffer
    /// shortfall.
    pub fn withdraw_deficit(&self) -> u64 {
        self.queue_deficit().saturating_add(self.buffer_shortfall())
    }

    /// `owner`'s pending requests with their status.
    pub fn requests_of(&self, owner: &str) -> Vec<RequestView> {
        self.queue.requests_of(owner, self.clock.now())
    }

    /// `owner`'s position. Fails like [`convert_to_value`](Self::convert_to_value)
    /// when the units cannot be priced.
    pub fn account(&self, owner: &str) -> Result<AccountView, VaultError> {
        let units = self.units.balance_of(owner);
        Ok(AccountView {
            owner: owner.to_string(),
            units,
            value: self.convert_to_value(units)?,
            requests: self.requests_of(owner),
        })
    }

    /// Point-in-time summary.
    pub fn status(&self) -> VaultStatus {
        VaultStatus {
            address: self.address.clone(),
            total_value: self.total_value(),
            total_units: self.total_units(),
            escrowed_units: self.units.escrowed(),
            on_hand: self.on_hand(),
            claim_reserve: self.queue.claim_reserve(),
            buffer_target: self.config.buffer_target,
            instant_liquidity: self.instant_liquidity(),
            available_to_withdraw: self.available_to_withdraw(),
            queue_deficit: self.queue_deficit(),
            withdraw_deficit: self.withdraw_deficit(),
            pending_requests: self.queue.len(),
            holders: self.units.holder_count(),
            positions: self.router.positions(&self.address),
            timestamp: self.clock.now(),
        }
    }

    // -- events -------------------------------------------------------------

    /// Appends an event raised outside the ledger (pause state, say).
    pub fn record(&mut self, event: VaultEvent) {
        self.events.push(event);
    }

    /// Takes every event recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<VaultEvent> {
        std::mem::take(&mut self.events)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

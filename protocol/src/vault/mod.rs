//! # Vault Module: Pooled Ledger & Liquidity Routing
//!
//! The vault is where pooled money is accounted for. Depositors hand over
//! the asset and receive ownership units; the router spreads that capital
//! across strategies; withdrawals come back either within the call or
//! through the queue.
//!
//! ## Architecture
//!
//! ```text
//! units.rs: Spendable and escrowed ownership units
//! allocation.rs: Target weights per strategy, replaced as a whole
//! router.rs: Distribution, instant redemption, two-pass rebalance
//! queue.rs: Withdrawal requests, backlog watermarks, claim reserve
//! events.rs: Observable records of state changes
//! ledger.rs: The Vault: pricing, deposits, withdrawals, buffer fills
//! ```
//!
//! ## Design Principles
//!
//! 1. **All amounts are `u64` in the asset's smallest denomination.** No
//!    floating point. Products go through `u128` and round toward the vault.
//!
//! 2. **Value is conserved.** Accounting operations never create or destroy
//!    value; only strategies reporting gains or losses move `total_value`
//!    without a matching unit burn.
//!
//! 3. **Validate, then mutate.** A call that fails leaves the ledger as it
//!    found it, up to collaborator legs that already executed (which move
//!    value, never lose it).

pub mod allocation;
pub mod events;
pub mod ledger;
pub mod queue;
pub mod router;
pub mod units;

pub use allocation::{AllocationEntry, AllocationError, AllocationTable, AllocationView};
pub use events::VaultEvent;
pub use ledger::{
    AccountView, ClaimReceipt, FillReceipt, Vault, VaultError, VaultStatus, WithdrawalOutcome,
};
pub use queue::{
    ClaimTotals, QueueError, RequestId, RequestStatus, RequestView, WithdrawalQueue,
    WithdrawalRequest,
};
pub use router::{LiquidityRouter, RebalanceReport, RouterError, RoutingLeg, StrategyPosition};
pub use units::{UnitError, UnitLedger};

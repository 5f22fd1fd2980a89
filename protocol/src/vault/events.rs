//! Observable records of vault state changes.
//!
//! The ledger appends one [`VaultEvent`] per state change and the embedding
//! process drains them (see [`Vault::drain_events`](super::Vault::drain_events)).
//! Events carry no authority; they exist for logs, metrics, and subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::asset::Address;
use crate::strategy::StrategyId;

use super::allocation::AllocationView;
use super::queue::RequestId;
use super::router::RebalanceReport;

/// A state change worth telling the outside world about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VaultEvent {
    /// Units were issued against a deposit.
    Deposited {
        owner: Address,
        value: u64,
        units: u64,
    },
    /// Capital left on-hand for the strategies.
    Distributed { value: u64 },
    /// A withdrawal was paid within the call.
    Withdrawn {
        owner: Address,
        units: u64,
        value: u64,
        /// Portion redeemed from strategies to fund it.
        from_strategies: u64,
    },
    /// A withdrawal joined the queue.
    WithdrawalQueued {
        owner: Address,
        request_id: RequestId,
        units: u64,
        value: u64,
        fill_at: u128,
        claimable_at: DateTime<Utc>,
    },
    /// Queued requests were paid out.
    Claimed {
        owner: Address,
        request_ids: Vec<RequestId>,
        units: u64,
        value: u64,
    },
    /// Incoming liquidity closed part of the queue backlog.
    QueueFilled {
        amount: u64,
        queue_filled: u128,
        queued_to_fill: u128,
    },
    /// Incoming liquidity beyond the backlog stayed on hand as buffer.
    BufferToppedUp { amount: u64 },
    /// The manager changed the buffer target.
    BufferTargetUpdated { target: u64 },
    /// The allocation table was replaced.
    AllocationsUpdated { entries: Vec<AllocationView> },
    /// A rebalance ran.
    Rebalanced { report: RebalanceReport },
    /// A retired strategy's position was redeemed back on hand.
    StrategyRecalled { strategy: StrategyId, value: u64 },
    /// Mutating entry points were frozen.
    Paused { by: Address },
    /// Mutating entry points were unfrozen.
    Unpaused { by: Address },
}

impl VaultEvent {
    /// Short label, used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultEvent::Deposited { .. } => "deposited",
            VaultEvent::Distributed { .. } => "distributed",
            VaultEvent::Withdrawn { .. } => "withdrawn",
            VaultEvent::WithdrawalQueued { .. } => "withdrawal_queued",
            VaultEvent::Claimed { .. } => "claimed",
            VaultEvent::QueueFilled { .. } => "queue_filled",
            VaultEvent::BufferToppedUp { .. } => "buffer_topped_up",
            VaultEvent::BufferTargetUpdated { .. } => "buffer_target_updated",
            VaultEvent::AllocationsUpdated { .. } => "allocations_updated",
            VaultEvent::Rebalanced { .. } => "rebalanced",
            VaultEvent::StrategyRecalled { .. } => "strategy_recalled",
            VaultEvent::Paused { .. } => "paused",
            VaultEvent::Unpaused { .. } => "unpaused",
        }
    }
}

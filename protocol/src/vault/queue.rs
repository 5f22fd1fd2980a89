//! # Withdrawal Queue & Claim Reserve
//!
//! Withdrawals that cannot be paid right away become [`WithdrawalRequest`]s.
//! A request moves through four states:
//!
//! ```text
//! Created ──▶ Pending ──▶ Claimable ──▶ Claimed (removed)
//! ```
//!
//! It is claimable once the withdrawal delay has elapsed **and** the backlog
//! ahead of it has been funded. Funding is tracked with a pair of running
//! counters rather than per-request state:
//!
//! - `queued_to_fill`: cumulative value ever promised to queued requests
//!   beyond what was on hand when they were created;
//! - `queue_filled`: cumulative value that has since been set aside for them.
//!
//! Each request records `fill_at`, the value of `queued_to_fill` right after
//! it joined. It unlocks once `queue_filled >= fill_at`, so the backlog
//! settles first-in first-out regardless of the order claims are made in.
//!
//! The queue also owns the **claim reserve**: on-hand asset earmarked for
//! requests. The vault never spends reserved asset on anything but claims.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::Address;

/// Monotonically increasing request identifier.
pub type RequestId = u64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Queue and claim failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Claim indexes must be non-empty.
    #[error("no request indexes supplied")]
    NoIndexes,

    /// An index was out of range, duplicated, or out of ascending order.
    #[error("invalid request index {index} (owner has {pending} pending)")]
    InvalidIndex {
        /// The offending index.
        index: usize,
        /// Length of the owner's pending list.
        pending: usize,
    },

    /// The withdrawal delay has not elapsed.
    #[error("request {request_id} is not claimable until {claimable_at}")]
    TooEarly {
        /// The request.
        request_id: RequestId,
        /// When the delay elapses.
        claimable_at: DateTime<Utc>,
    },

    /// The backlog ahead of the request is not yet funded.
    #[error("request {request_id} waits on the backlog: filled {filled}, needs {fill_at}")]
    DeficitNotFilled {
        /// The request.
        request_id: RequestId,
        /// Current `queue_filled`.
        filled: u128,
        /// The request's watermark.
        fill_at: u128,
    },

    /// The claim reserve would overflow.
    #[error("claim reserve overflow")]
    Overflow,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A queued withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Stable identifier.
    pub id: RequestId,
    /// Account the value is paid to.
    pub owner: Address,
    /// Units held in escrow for this request.
    pub units: u64,
    /// Asset value owed, fixed at creation.
    pub value: u64,
    /// Backlog watermark; zero when funded at creation.
    pub fill_at: u128,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Earliest claim time.
    pub claimable_at: DateTime<Utc>,
}

/// Computed state of a live request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting on the delay, the backlog, or both.
    Pending,
    /// Both gates are open.
    Claimable,
}

/// A request together with its status, as listed to owners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestView {
    /// Position in the owner's pending list; what `claim` takes.
    pub index: usize,
    /// The request itself.
    #[serde(flatten)]
    pub request: WithdrawalRequest,
    /// Status at the time of listing.
    pub status: RequestStatus,
}

/// Totals of a validated claim batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimTotals {
    /// Escrowed units to burn.
    pub units: u64,
    /// Asset value to pay out.
    pub value: u64,
}

// ---------------------------------------------------------------------------
// WithdrawalQueue
// ---------------------------------------------------------------------------

/// Pending requests, backlog counters, and the claim reserve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithdrawalQueue {
    requests: HashMap<RequestId, WithdrawalRequest>,
    by_owner: HashMap<Address, Vec<RequestId>>,
    next_id: RequestId,
    queued_to_fill: u128,
    queue_filled: u128,
    claim_reserve: u64,
}

impl WithdrawalQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// On-hand asset earmarked for requests.
    pub fn claim_reserve(&self) -> u64 {
        self.claim_reserve
    }

    /// Cumulative value queued beyond on-hand availability.
    pub fn queued_to_fill(&self) -> u128 {
        self.queued_to_fill
    }

    /// Cumulative value set aside against the backlog.
    pub fn queue_filled(&self) -> u128 {
        self.queue_filled
    }

    /// Value promised to queued requests not yet backed by on-hand asset.
    pub fn deficit(&self) -> u64 {
        let gap = self.queued_to_fill.saturating_sub(self.queue_filled);
        u64::try_from(gap).unwrap_or(u64::MAX)
    }

    /// Number of live requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// `true` if no requests are pending.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Fails exactly when [`enqueue`](Self::enqueue) would with the same
    /// arguments, without changing anything. Returns the claim reserve the
    /// request would leave behind.
    pub fn check_enqueue(&self, value: u64, available_now: u64) -> Result<u64, QueueError> {
        self.claim_reserve
            .checked_add(value.min(available_now))
            .ok_or(QueueError::Overflow)
    }

    /// Appends a request whose `units` the caller has already escrowed.
    ///
    /// `available_now` is on-hand asset minus the reserve. If it covers
    /// `value`, the whole value is reserved and the request only waits on
    /// the delay. Otherwise all of `available_now` is reserved and counted
    /// as filled, the full value joins the backlog, and the request's
    /// watermark lands behind everything queued before it.
    pub fn enqueue(
        &mut self,
        owner: &str,
        units: u64,
        value: u64,
        available_now: u64,
        created_at: DateTime<Utc>,
        claimable_at: DateTime<Utc>,
    ) -> Result<WithdrawalRequest, QueueError> {
        self.claim_reserve = self.check_enqueue(value, available_now)?;
        let fill_at = if value > available_now {
            self.queue_filled += u128::from(available_now);
            self.queued_to_fill += u128::from(value);
            self.queued_to_fill
        } else {
            0
        };

        let id = self.next_id;
        self.next_id += 1;

        let request = WithdrawalRequest {
            id,
            owner: owner.to_string(),
            units,
            value,
            fill_at,
            created_at,
            claimable_at,
        };
        self.requests.insert(id, request.clone());
        self.by_owner.entry(owner.to_string()).or_default().push(id);
        Ok(request)
    }

    /// Applies up to `amount` of freshly received asset to the backlog.
    /// Returns how much was applied; the rest is the caller's to keep.
    pub fn apply_fill(&mut self, amount: u64) -> Result<u64, QueueError> {
        let applied = amount.min(self.deficit());
        if applied == 0 {
            return Ok(0);
        }
        self.claim_reserve = self
            .claim_reserve
            .checked_add(applied)
            .ok_or(QueueError::Overflow)?;
        self.queue_filled += u128::from(applied);
        Ok(applied)
    }

    /// Status of `request` at `now`.
    pub fn status(&self, request: &WithdrawalRequest, now: DateTime<Utc>) -> RequestStatus {
        if now >= request.claimable_at && self.queue_filled >= request.fill_at {
            RequestStatus::Claimable
        } else {
            RequestStatus::Pending
        }
    }

    /// Looks up a live request.
    pub fn get(&self, id: RequestId) -> Option<&WithdrawalRequest> {
        self.requests.get(&id)
    }

    /// `owner`'s pending requests in list order, with computed status.
    pub fn requests_of(&self, owner: &str, now: DateTime<Utc>) -> Vec<RequestView> {
        self.by_owner
            .get(owner)
            .map(|ids| {
                ids.iter()
                    .enumerate()
                    .filter_map(|(index, id)| {
                        self.requests.get(id).map(|request| RequestView {
                            index,
                            status: self.status(request, now),
                            request: request.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Checks that every index is valid and claimable, without changing
    /// anything. Indexes must be strictly ascending.
    pub fn validate_claim(
        &self,
        owner: &str,
        indexes: &[usize],
        now: DateTime<Utc>,
    ) -> Result<ClaimTotals, QueueError> {
        if indexes.is_empty() {
            return Err(QueueError::NoIndexes);
        }
        let ids = self.by_owner.get(owner).map(Vec::as_slice).unwrap_or(&[]);

        let mut totals = ClaimTotals::default();
        let mut previous: Option<usize> = None;
        for &index in indexes {
            let ascending = previous.map_or(true, |p| index > p);
            let request = ids
                .get(index)
                .and_then(|id| self.requests.get(id))
                .filter(|_| ascending)
                .ok_or(QueueError::InvalidIndex {
                    index,
                    pending: ids.len(),
                })?;
            previous = Some(index);

            if now < request.claimable_at {
                return Err(QueueError::TooEarly {
                    request_id: request.id,
                    claimable_at: request.claimable_at,
                });
            }
            if self.queue_filled < request.fill_at {
                return Err(QueueError::DeficitNotFilled {
                    request_id: request.id,
                    filled: self.queue_filled,
                    fill_at: request.fill_at,
                });
            }

            totals.units = totals
                .units
                .checked_add(request.units)
                .ok_or(QueueError::Overflow)?;
            totals.value = totals
                .value
                .checked_add(request.value)
                .ok_or(QueueError::Overflow)?;
        }
        Ok(totals)
    }

    /// Removes the requests at `indexes` (already validated) and releases
    /// their value from the reserve. Processes back to front so swap-remove
    /// leaves the remaining indexes valid.
    pub fn take_claims(&mut self, owner: &str, indexes: &[usize]) -> Vec<WithdrawalRequest> {
        let Some(ids) = self.by_owner.get_mut(owner) else {
            return Vec::new();
        };

        let mut claimed = Vec::with_capacity(indexes.len());
        for &index in indexes.iter().rev() {
            if index >= ids.len() {
                continue;
            }
            let id = ids.swap_remove(index);
            if let Some(request) = self.requests.remove(&id) {
                self.claim_reserve = self.claim_reserve.saturating_sub(request.value);
                claimed.push(request);
            }
        }
        if ids.is_empty() {
            self.by_owner.remove(owner);
        }

        claimed.reverse();
        claimed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! # Simulated Settlement Venue
//!
//! Stand-in for an external trading venue that holds capital on behalf of a
//! custodial strategy. It keeps three independent balances, one per
//! [`BalanceSource`], and any of the three read paths can be switched to
//! fail so outage handling can be exercised.
//!
//! The venue also owns an account on the asset ledger (`custody_account`)
//! where swept funds physically sit while they are "at the venue".

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use tidepool_protocol::{BalanceSource, VenueReadError};

/// Errors raised by venue-side bookkeeping.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VenueError {
    /// The source does not hold enough to debit.
    #[error("insufficient {source_kind} balance: have {available}, need {requested}")]
    InsufficientBalance {
        /// The source being debited.
        source_kind: BalanceSource,
        /// Its balance.
        available: u64,
        /// Amount requested.
        requested: u64,
    },

    /// Crediting would overflow.
    #[error("{0} balance overflow")]
    Overflow(BalanceSource),
}

/// Snapshot of the venue's books.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueBooks {
    /// Balance per source.
    pub balances: HashMap<BalanceSource, u64>,
    /// Sources whose reads currently fail.
    pub failing: HashSet<BalanceSource>,
}

/// An external venue with three separately reported balances.
#[derive(Debug)]
pub struct SimulatedVenue {
    custody_account: String,
    books: RwLock<VenueBooks>,
}

impl SimulatedVenue {
    /// Creates an empty venue whose funds sit at `custody_account`.
    pub fn new(custody_account: impl Into<String>) -> Self {
        Self {
            custody_account: custody_account.into(),
            books: RwLock::new(VenueBooks::default()),
        }
    }

    /// The venue's account on the asset ledger.
    pub fn custody_account(&self) -> &str {
        &self.custody_account
    }

    /// Reads one source, honoring injected failures.
    pub fn read(&self, source: BalanceSource) -> Result<u64, VenueReadError> {
        let books = self.books.read();
        if books.failing.contains(&source) {
            return Err(VenueReadError {
                source_kind: source,
                reason: "venue unavailable".to_string(),
            });
        }
        Ok(books.balances.get(&source).copied().unwrap_or(0))
    }

    /// Sum of all three balances, ignoring injected failures.
    pub fn total(&self) -> u64 {
        self.books
            .read()
            .balances
            .values()
            .fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    /// Adds to a source.
    pub fn credit(&self, source: BalanceSource, amount: u64) -> Result<u64, VenueError> {
        let mut books = self.books.write();
        let balance = books.balances.entry(source).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(VenueError::Overflow(source))?;
        debug!(%source, amount, "venue credit");
        Ok(*balance)
    }

    /// Takes from a source.
    pub fn debit(&self, source: BalanceSource, amount: u64) -> Result<u64, VenueError> {
        let mut books = self.books.write();
        let balance = books.balances.entry(source).or_insert(0);
        if *balance < amount {
            return Err(VenueError::InsufficientBalance {
                source_kind: source,
                available: *balance,
                requested: amount,
            });
        }
        *balance -= amount;
        debug!(%source, amount, "venue debit");
        Ok(*balance)
    }

    /// Moves value between two sources (opening a spot or perp position,
    /// say).
    pub fn reallocate(
        &self,
        from: BalanceSource,
        to: BalanceSource,
        amount: u64,
    ) -> Result<(), VenueError> {
        self.debit(from, amount)?;
        if let Err(e) = self.credit(to, amount) {
            // Put it back; credit only fails on overflow.
            let _ = self.credit(from, amount);
            return Err(e);
        }
        Ok(())
    }

    /// Marks a source to a new value (trading gains or losses). Returns the
    /// previous value.
    pub fn mark(&self, source: BalanceSource, value: u64) -> u64 {
        let mut books = self.books.write();
        books.balances.insert(source, value).unwrap_or(0)
    }

    /// Makes reads of `source` fail (or succeed again).
    pub fn set_failing(&self, source: BalanceSource, failing: bool) {
        let mut books = self.books.write();
        if failing {
            warn!(%source, "venue read path disabled");
            books.failing.insert(source);
        } else {
            books.failing.remove(&source);
        }
    }

    /// A copy of the books.
    pub fn books(&self) -> VenueBooks {
        self.books.read().clone()
    }
}

//! # Tidepool Reference Strategies
//!
//! Concrete collaborators for the Tidepool vault. The vault core only knows
//! the strategy traits; these contracts give it something real to route to
//! in the node and in integration tests:
//!
//! - **Yield Vault**: a share vault that redeems synchronously and can be
//!   fed yield to move its share price.
//! - **Custodial Strategy**: an externally-settled strategy that sweeps
//!   capital to a venue and settles back through the vault's buffer fill.
//! - **Simulated Venue**: three separately reported balances with
//!   switchable read failures.
//!
//! ## Design Principles
//!
//! 1. Money moves first, books update second. A failed transfer leaves
//!    every balance as it was.
//! 2. Overflow is checked wherever balances grow.
//! 3. Every public type is serializable (serde) for inspection over the API.

pub mod custodial;
pub mod venue;
pub mod yield_vault;

pub use custodial::{CustodialStrategy, CustodyError, CustodyLeg, LegKind};
pub use venue::{SimulatedVenue, VenueBooks, VenueError};
pub use yield_vault::{ShareLedger, YieldVault};

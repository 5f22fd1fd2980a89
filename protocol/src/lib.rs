// Copyright (c) 2026 Tidepool Contributors. MIT License.
// See LICENSE for details.

//! # Tidepool Protocol: Core Library
//!
//! Tidepool pools a single fungible asset from many depositors, issues
//! proportional ownership units, and spreads the pooled capital across
//! yield strategies by target weight. Withdrawals are paid within the call
//! when liquidity allows and queued behind a delay when it does not.
//!
//! ## Architecture
//!
//! - **asset**: The transfer collaborator and an in-memory ledger.
//! - **strategy**: Redeemable and externally-settled strategies, and the
//!   balance oracle over both.
//! - **vault**: Units, allocations, routing, the withdrawal queue, and the
//!   ledger that ties them together.
//! - **access**: Roles and the reentrancy guard.
//! - **gateway**: The shared, role-gated, pausable entry point.
//! - **clock**: Injectable time, so the withdrawal delay is testable.
//! - **math**: `u128`-backed fixed-point helpers.
//! - **config**: Protocol constants and per-vault parameters.
//!
//! ## Design Philosophy
//!
//! 1. Conservation first. Rounding always favors the vault.
//! 2. Failed calls leave the ledger untouched.
//! 3. If it touches money, it has tests.

pub mod access;
pub mod asset;
pub mod clock;
pub mod config;
pub mod gateway;
pub mod math;
pub mod strategy;
pub mod vault;

#[cfg(test)]
mod testing;

pub use access::{AccessError, Role, RoleRegistry};
pub use asset::{Address, AssetError, AssetTransfer, InMemoryAsset};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::VaultConfig;
pub use gateway::{GatewayError, VaultGateway};
pub use strategy::{
    BalanceSource, RedeemableStrategy, SettledStrategy, SettlementClass, Strategy, StrategyError,
    StrategyId, VenueReadError,
};
pub use vault::{Vault, VaultError, VaultEvent};

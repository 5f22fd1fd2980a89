//! # Vault Gateway
//!
//! The shared, `&self` face of a [`Vault`]. Every entry point runs the same
//! checks before the ledger sees the call:
//!
//! | Entry point                                   | Role        | Blocked by pause |
//! |-----------------------------------------------|-------------|------------------|
//! | `deposit`, `withdraw`, `redeem`, `request_withdrawal` | any | yes |
//! | `claim`, `fill_buffer`                        | any         | no               |
//! | `set_allocations`, `rebalance`, `set_buffer_target`, `recall` | manager | yes |
//! | `pause`, `unpause`                            | emergency   | n/a              |
//!
//! Calls are serialized through a [`Guarded`] vault, so a collaborator that
//! calls back in mid-operation gets [`AccessError::Reentrant`].

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{info, warn};

use crate::access::{AccessError, Guarded, Role, RoleRegistry};
use crate::vault::{
    AccountView, AllocationEntry, AllocationView, ClaimReceipt, FillReceipt, RebalanceReport,
    RequestView, Vault, VaultError, VaultEvent, VaultStatus, WithdrawalOutcome,
    WithdrawalRequest,
};

/// Errors returned by the gateway.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Role or reentrancy check failed.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// The vault is paused.
    #[error("vault is paused")]
    Paused,

    /// The ledger rejected the call.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Role-gated, pausable, reentrancy-safe access to a [`Vault`].
pub struct VaultGateway {
    vault: Guarded<Vault>,
    roles: RoleRegistry,
    paused: AtomicBool,
}

impl VaultGateway {
    /// Wraps `vault` with the given role assignments.
    pub fn new(vault: Vault, roles: RoleRegistry) -> Self {
        Self {
            vault: Guarded::new(vault),
            roles,
            paused: AtomicBool::new(false),
        }
    }

    /// The role assignments.
    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    /// `true` while paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    // -- plumbing -----------------------------------------------------------

    fn call<T>(
        &self,
        op: &'static str,
        pausable: bool,
        f: impl FnOnce(&mut Vault) -> Result<T, VaultError>,
    ) -> Result<T, GatewayError> {
        let mut vault = self.vault.enter().map_err(|e| {
            warn!(op, error = %e, "call rejected");
            e
        })?;
        if pausable && self.is_paused() {
            return Err(GatewayError::Paused);
        }
        f(&mut vault).map_err(GatewayError::from)
    }

    fn managed<T>(
        &self,
        caller: &str,
        op: &'static str,
        f: impl FnOnce(&mut Vault) -> Result<T, VaultError>,
    ) -> Result<T, GatewayError> {
        self.roles.require(caller, Role::Manager)?;
        self.call(op, true, f)
    }

    /// Runs `f` against a read-only view of the vault.
    pub fn inspect<T>(&self, f: impl FnOnce(&Vault) -> T) -> Result<T, GatewayError> {
        let vault = self.vault.enter()?;
        Ok(f(&vault))
    }

    // -- depositor entry points ---------------------------------------------

    /// See [`Vault::deposit`].
    pub fn deposit(&self, owner: &str, value: u64) -> Result<u64, GatewayError> {
        self.call("deposit", true, |v| v.deposit(owner, value))
    }

    /// See [`Vault::withdraw`].
    pub fn withdraw(&self, owner: &str, value: u64) -> Result<WithdrawalOutcome, GatewayError> {
        self.call("withdraw", true, |v| v.withdraw(owner, value))
    }

    /// See [`Vault::redeem`].
    pub fn redeem(&self, owner: &str, units: u64) -> Result<WithdrawalOutcome, GatewayError> {
        self.call("redeem", true, |v| v.redeem(owner, units))
    }

    /// See [`Vault::request_withdrawal`].
    pub fn request_withdrawal(
        &self,
        owner: &str,
        units: u64,
    ) -> Result<WithdrawalRequest, GatewayError> {
        self.call("request_withdrawal", true, |v| {
            v.request_withdrawal(owner, units)
        })
    }

    /// See [`Vault::claim`]. Allowed while paused.
    pub fn claim(&self, owner: &str, indexes: &[usize]) -> Result<ClaimReceipt, GatewayError> {
        self.call("claim", false, |v| v.claim(owner, indexes))
    }

    /// See [`Vault::fill_buffer`]. Open to anyone, allowed while paused.
    pub fn fill_buffer(&self, supplier: &str, amount: u64) -> Result<FillReceipt, GatewayError> {
        self.call("fill_buffer", false, |v| v.fill_buffer(supplier, amount))
    }

    // -- manager entry points -----------------------------------------------

    /// See [`Vault::set_allocations`].
    pub fn set_allocations(
        &self,
        caller: &str,
        entries: Vec<AllocationEntry>,
    ) -> Result<(), GatewayError> {
        self.managed(caller, "set_allocations", |v| v.set_allocations(entries))
    }

    /// See [`Vault::rebalance`].
    pub fn rebalance(&self, caller: &str) -> Result<RebalanceReport, GatewayError> {
        self.managed(caller, "rebalance", Vault::rebalance)
    }

    /// See [`Vault::set_buffer_target`].
    pub fn set_buffer_target(&self, caller: &str, target: u64) -> Result<(), GatewayError> {
        self.managed(caller, "set_buffer_target", |v| {
            v.set_buffer_target(target);
            Ok(())
        })
    }

    /// See [`Vault::recall`].
    pub fn recall(&self, caller: &str, strategy: &str) -> Result<u64, GatewayError> {
        self.managed(caller, "recall", |v| v.recall(strategy))
    }

    // -- emergency entry points ---------------------------------------------

    /// Freezes every pausable entry point.
    pub fn pause(&self, caller: &str) -> Result<(), GatewayError> {
        self.set_paused(caller, true)
    }

    /// Lifts a pause.
    pub fn unpause(&self, caller: &str) -> Result<(), GatewayError> {
        self.set_paused(caller, false)
    }

    fn set_paused(&self, caller: &str, paused: bool) -> Result<(), GatewayError> {
        self.roles.require(caller, Role::Emergency)?;
        let mut vault = self.vault.enter()?;
        if self.paused.swap(paused, Ordering::SeqCst) == paused {
            return Ok(());
        }
        let by = caller.to_string();
        vault.record(if paused {
            VaultEvent::Paused { by }
        } else {
            VaultEvent::Unpaused { by }
        });
        info!(caller, paused, "pause state changed");
        Ok(())
    }

    // -- views --------------------------------------------------------------

    /// See [`Vault::total_value`].
    pub fn total_value(&self) -> Result<u64, GatewayError> {
        self.inspect(Vault::total_value)
    }

    /// See [`Vault::available_to_withdraw`].
    pub fn available_to_withdraw(&self) -> Result<u64, GatewayError> {
        self.inspect(Vault::available_to_withdraw)
    }

    /// See [`Vault::withdraw_deficit`].
    pub fn withdraw_deficit(&self) -> Result<u64, GatewayError> {
        self.inspect(Vault::withdraw_deficit)
    }

    /// See [`Vault::requests_of`].
    pub fn requests_of(&self, owner: &str) -> Result<Vec<RequestView>, GatewayError> {
        self.inspect(|v| v.requests_of(owner))
    }

    /// See [`Vault::account`].
    pub fn account(&self, owner: &str) -> Result<AccountView, GatewayError> {
        self.inspect(|v| v.account(owner))?.map_err(GatewayError::from)
    }

    /// See [`Vault::status`].
    pub fn status(&self) -> Result<VaultStatus, GatewayError> {
        self.inspect(Vault::status)
    }

    /// The current allocation table.
    pub fn allocations(&self) -> Result<Vec<AllocationView>, GatewayError> {
        self.inspect(|v| v.router().table().views())
    }

    /// See [`Vault::drain_events`].
    pub fn drain_events(&self) -> Result<Vec<VaultEvent>, GatewayError> {
        let mut vault = self.vault.enter()?;
        Ok(vault.drain_events())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetTransfer, InMemoryAsset};
    use crate::clock::ManualClock;
    use crate::config::VaultConfig;
    use crate::strategy::{RedeemableStrategy, Strategy, StrategyError};
    use crate::testing::MockRedeemable;
    use parking_lot::Mutex;
    use std::sync::{Arc, OnceLock};

    const MANAGER: &str = "manager";
    const GUARDIAN: &str = "guardian";

    fn gateway(asset: Arc<InMemoryAsset>) -> Arc<VaultGateway> {
        let clock = Arc::new(ManualClock::starting_now());
        let vault = Vault::new("vault", asset, VaultConfig::default(), clock).unwrap();
        let roles = RoleRegistry::new()
            .with(Role::Manager, MANAGER)
            .with(Role::Emergency, GUARDIAN);
        Arc::new(VaultGateway::new(vault, roles))
    }

    /// Strategy that calls back into the gateway from inside `deposit`.
    struct Reentering {
        inner: MockRedeemable,
        gateway: OnceLock<Arc<VaultGateway>>,
        observed: Mutex<Option<Result<FillReceipt, GatewayError>>>,
    }

    impl RedeemableStrategy for Reentering {
        fn address(&self) -> &str {
            self.inner.address()
        }

        fn deposit(&self, value: u64, depositor: &str) -> Result<u64, StrategyError> {
            if let Some(gateway) = self.gateway.get() {
                *self.observed.lock() = Some(gateway.fill_buffer(depositor, 1));
            }
            self.inner.deposit(value, depositor)
        }

        fn redeem(&self, units: u64, owner: &str) -> Result<u64, StrategyError> {
            self.inner.redeem(units, owner)
        }

        fn preview_withdraw(&self, value: u64) -> u64 {
            self.inner.preview_withdraw(value)
        }

        fn balance_of(&self, holder: &str) -> u64 {
            self.inner.balance_of(holder)
        }

        fn convert_to_assets(&self, units: u64) -> u64 {
            self.inner.convert_to_assets(units)
        }
    }

    fn allocations(asset: &Arc<InMemoryAsset>) -> Vec<AllocationEntry> {
        vec![
            AllocationEntry::new(
                Strategy::redeemable(Arc::new(MockRedeemable::new("a", Arc::clone(asset)))),
                5_000,
            ),
            AllocationEntry::new(
                Strategy::redeemable(Arc::new(MockRedeemable::new("b", Arc::clone(asset)))),
                5_000,
            ),
        ]
    }

    #[test]
    fn manager_entry_points_require_role() {
        let asset = Arc::new(InMemoryAsset::new());
        let gw = gateway(Arc::clone(&asset));

        let err = gw.set_allocations("mallory", allocations(&asset)).unwrap_err();
        assert_eq!(
            err,
            GatewayError::Access(AccessError::Unauthorized {
                caller: "mallory".into(),
                role: Role::Manager
            })
        );
        gw.set_allocations(MANAGER, allocations(&asset)).unwrap();
        assert_eq!(gw.allocations().unwrap().len(), 2);

        assert!(matches!(
            gw.pause(MANAGER),
            Err(GatewayError::Access(AccessError::Unauthorized { .. }))
        ));
    }

    #[test]
    fn pause_blocks_deposits_but_not_claims_or_fills() {
        let asset = Arc::new(InMemoryAsset::new());
        let gw = gateway(Arc::clone(&asset));
        asset.mint("alice", 1_000).unwrap();
        asset.mint("bot", 50).unwrap();
        gw.deposit("alice", 500).unwrap();

        gw.pause(GUARDIAN).unwrap();
        assert!(gw.is_paused());
        assert_eq!(gw.deposit("alice", 100), Err(GatewayError::Paused));
        assert_eq!(gw.withdraw("alice", 100), Err(GatewayError::Paused));
        assert_eq!(gw.rebalance(MANAGER), Err(GatewayError::Paused));
        assert!(gw.fill_buffer("bot", 50).is_ok());
        // Nothing queued, so the claim fails on its own terms, not on pause.
        assert!(matches!(
            gw.claim("alice", &[0]),
            Err(GatewayError::Vault(VaultError::Queue(_)))
        ));

        gw.unpause(GUARDIAN).unwrap();
        assert!(gw.deposit("alice", 100).is_ok());

        let kinds: Vec<_> = gw
            .drain_events()
            .unwrap()
            .iter()
            .map(VaultEvent::kind)
            .collect();
        assert!(kinds.contains(&"paused"));
        assert!(kinds.contains(&"unpaused"));
    }

    #[test]
    fn strategy_callback_is_rejected_as_reentrant() {
        let asset = Arc::new(InMemoryAsset::new());
        let gw = gateway(Arc::clone(&asset));
        let reentering = Arc::new(Reentering {
            inner: MockRedeemable::new("sneaky", Arc::clone(&asset)),
            gateway: OnceLock::new(),
            observed: Mutex::new(None),
        });
        let _ = reentering.gateway.set(Arc::clone(&gw));

        let plain = Arc::new(MockRedeemable::new("plain", Arc::clone(&asset)));
        gw.set_allocations(
            MANAGER,
            vec![
                AllocationEntry::new(Strategy::redeemable(reentering.clone()), 5_000),
                AllocationEntry::new(Strategy::redeemable(plain), 5_000),
            ],
        )
        .unwrap();

        asset.mint("alice", 1_000).unwrap();
        gw.deposit("alice", 1_000).unwrap();

        assert_eq!(
            *reentering.observed.lock(),
            Some(Err(GatewayError::Access(AccessError::Reentrant)))
        );
        assert_eq!(asset.balance_of("sneaky"), 500);
        assert_eq!(gw.total_value().unwrap(), 1_000);
    }

    #[test]
    fn concurrent_depositors_are_serialized() {
        let asset = Arc::new(InMemoryAsset::new());
        let gw = gateway(Arc::clone(&asset));
        gw.set_allocations(MANAGER, allocations(&asset)).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let gw = Arc::clone(&gw);
                let asset = Arc::clone(&asset);
                std::thread::spawn(move || {
                    let owner = format!("depositor-{i}");
                    asset.mint(&owner, 1_000).unwrap();
                    for _ in 0..10 {
                        gw.deposit(&owner, 100).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let status = gw.status().unwrap();
        assert_eq!(status.total_value, 4_000);
        assert_eq!(status.total_units, 4_000);
        assert_eq!(status.holders, 4);
    }
}

//! Stands up a vault, its asset ledger, and its reference strategies from a
//! [`NodeConfig`].

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use tidepool_contracts::{CustodialStrategy, SimulatedVenue, YieldVault};
use tidepool_protocol::vault::AllocationEntry;
use tidepool_protocol::{
    Clock, InMemoryAsset, Role, RoleRegistry, Strategy, Vault, VaultGateway,
};

use crate::config::{NodeConfig, StrategyKind};

/// A deployed strategy, kept with its concrete type so operator endpoints
/// can reach contract-specific calls (sweep, settle, accrue).
#[derive(Clone)]
pub enum Deployed {
    /// A share vault.
    YieldVault(Arc<YieldVault>),
    /// A venue-backed strategy.
    Custodial(Arc<CustodialStrategy>),
}

impl Deployed {
    /// The handle the vault routes through.
    pub fn strategy(&self) -> Strategy {
        match self {
            Deployed::YieldVault(s) => Strategy::redeemable(s.clone()),
            Deployed::Custodial(s) => Strategy::externally_settled(s.clone()),
        }
    }
}

/// Every strategy the node knows, by id. Strategies dropped from the
/// allocation table stay here so their positions can still be worked out.
#[derive(Clone, Default)]
pub struct StrategyBook {
    by_id: BTreeMap<String, Deployed>,
}

impl StrategyBook {
    /// Looks a strategy up.
    pub fn get(&self, id: &str) -> Option<&Deployed> {
        self.by_id.get(id)
    }

    /// Routable handle for `id`.
    pub fn strategy(&self, id: &str) -> Option<Strategy> {
        self.get(id).map(Deployed::strategy)
    }

    /// The custodial strategy `id`, if that is what it is.
    pub fn custodial(&self, id: &str) -> Option<&Arc<CustodialStrategy>> {
        match self.get(id)? {
            Deployed::Custodial(s) => Some(s),
            Deployed::YieldVault(_) => None,
        }
    }

    /// The yield vault `id`, if that is what it is.
    pub fn yield_vault(&self, id: &str) -> Option<&Arc<YieldVault>> {
        match self.get(id)? {
            Deployed::YieldVault(s) => Some(s),
            Deployed::Custodial(_) => None,
        }
    }

    /// Known ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.by_id.keys().map(String::as_str)
    }

    fn insert(&mut self, id: String, deployed: Deployed) {
        self.by_id.insert(id, deployed);
    }
}

/// A running vault and its collaborators.
pub struct Deployment {
    /// Shared asset ledger.
    pub asset: Arc<InMemoryAsset>,
    /// Role-gated vault.
    pub gateway: Arc<VaultGateway>,
    /// Deployed strategies.
    pub strategies: StrategyBook,
}

/// Builds the deployment and commits the initial allocation table.
pub fn deploy(config: &NodeConfig, clock: Arc<dyn Clock>) -> Result<Deployment> {
    config.validate()?;
    let asset = Arc::new(InMemoryAsset::new());

    let mut strategies = StrategyBook::default();
    let mut entries = Vec::with_capacity(config.strategies.len());
    for planned in &config.strategies {
        let deployed = match planned.kind {
            StrategyKind::YieldVault => {
                Deployed::YieldVault(Arc::new(YieldVault::new(planned.id.clone(), asset.clone())))
            }
            StrategyKind::Custodial => {
                let venue = Arc::new(SimulatedVenue::new(format!("{}-venue", planned.id)));
                Deployed::Custodial(Arc::new(CustodialStrategy::new(
                    planned.id.clone(),
                    asset.clone(),
                    venue,
                )))
            }
        };
        entries.push(AllocationEntry::new(deployed.strategy(), planned.weight_bps));
        strategies.insert(planned.id.clone(), deployed);
    }

    let vault = Vault::new(
        config.vault_address.clone(),
        asset.clone(),
        config.vault.clone(),
        clock,
    )
    .context("failed to create vault")?;
    let roles = RoleRegistry::new()
        .with(Role::Manager, config.manager.clone())
        .with(Role::Emergency, config.emergency.clone());
    let gateway = Arc::new(VaultGateway::new(vault, roles));

    if !entries.is_empty() {
        gateway
            .set_allocations(&config.manager, entries)
            .context("failed to commit initial allocations")?;
    }
    tracing::info!(
        vault = %config.vault_address,
        strategies = config.strategies.len(),
        "vault deployed"
    );

    Ok(Deployment {
        asset,
        gateway,
        strategies,
    })
}

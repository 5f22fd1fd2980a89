//! # Node Configuration
//!
//! The node reads one JSON file describing the vault it operates: the
//! vault's account, who holds which role, the ledger parameters, and the
//! reference strategies to deploy with their target weights.
//!
//! `tidepool-node init` writes [`NodeConfig::devnet`] to disk as a starting
//! point.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use tidepool_protocol::config::BPS_DENOMINATOR;
use tidepool_protocol::VaultConfig;

/// Kind of reference strategy to deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// A synchronously redeemable share vault.
    YieldVault,
    /// A venue-backed, externally-settled strategy.
    Custodial,
}

/// One strategy to deploy and allocate to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Account of the strategy on the asset ledger; doubles as its id.
    pub id: String,
    /// What to deploy.
    pub kind: StrategyKind,
    /// Initial target weight in basis points.
    pub weight_bps: u16,
}

/// Everything the node needs to stand up a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// The vault's account on the asset ledger.
    pub vault_address: String,
    /// Holder of the manager role.
    pub manager: String,
    /// Holder of the emergency (pause) role.
    pub emergency: String,
    /// Ledger parameters.
    #[serde(default)]
    pub vault: VaultConfig,
    /// Strategies deployed at startup, in allocation-table order.
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
    /// Largest single faucet mint. Zero disables the faucet.
    #[serde(default)]
    pub faucet_limit: u64,
}

impl NodeConfig {
    /// A local development setup: two yield vaults and one custodial
    /// strategy, a small buffer, and an open faucet.
    pub fn devnet() -> Self {
        Self {
            vault_address: "tidepool-vault".into(),
            manager: "manager".into(),
            emergency: "guardian".into(),
            vault: VaultConfig {
                buffer_target: 1_000_000_000,
                ..VaultConfig::default()
            },
            strategies: vec![
                StrategyConfig {
                    id: "yield-a".into(),
                    kind: StrategyKind::YieldVault,
                    weight_bps: 4_000,
                },
                StrategyConfig {
                    id: "yield-b".into(),
                    kind: StrategyKind::YieldVault,
                    weight_bps: 3_000,
                },
                StrategyConfig {
                    id: "custody".into(),
                    kind: StrategyKind::Custodial,
                    weight_bps: 3_000,
                },
            ],
            faucet_limit: 1_000_000_000_000,
        }
    }

    /// Reads and validates a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to encode config")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write config file {}", path.display()))
    }

    /// Catches mistakes the ledger would only report at startup, with
    /// friendlier messages.
    pub fn validate(&self) -> Result<()> {
        self.vault.validate().context("invalid vault parameters")?;

        let mut seen = std::collections::HashSet::new();
        for strategy in &self.strategies {
            if strategy.id == self.vault_address {
                bail!("strategy id {} collides with the vault address", strategy.id);
            }
            if !seen.insert(strategy.id.as_str()) {
                bail!("strategy {} listed twice", strategy.id);
            }
        }

        if !self.strategies.is_empty() {
            let total: u32 = self.strategies.iter().map(|s| u32::from(s.weight_bps)).sum();
            if total != u32::from(BPS_DENOMINATOR) {
                bail!("strategy weights sum to {total} bps, expected {BPS_DENOMINATOR}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devnet_config_is_valid() {
        assert!(NodeConfig::devnet().validate().is_ok());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidepool.json");
        let config = NodeConfig::devnet();
        config.save(&path).unwrap();
        assert_eq!(NodeConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_sections_take_defaults() {
        let config: NodeConfig = serde_json::from_str(
            r#"{"vault_address": "v", "manager": "m", "emergency": "e"}"#,
        )
        .unwrap();
        assert_eq!(config.vault, VaultConfig::default());
        assert!(config.strategies.is_empty());
        assert_eq!(config.faucet_limit, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mut config = NodeConfig::devnet();
        config.strategies[0].weight_bps = 3_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("9000"));
    }

    #[test]
    fn duplicate_strategy_rejected() {
        let mut config = NodeConfig::devnet();
        config.strategies[1].id = "yield-a".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn strategy_cannot_share_vault_account() {
        let mut config = NodeConfig::devnet();
        config.strategies[0].id = config.vault_address.clone();
        assert!(config.validate().is_err());
    }
}

//! Per-network fork schedules, downloaded once at startup from each
//! network's public config YAML (the same files consensus clients ship).
//!
//! Ported from the reference `EthereumNetwork`/`NetworkConfig` pair: the
//! raw YAML uses SCREAMING_SNAKE_CASE keys straight out of the consensus
//! spec repos, so the serde model mirrors that instead of renaming into
//! house style.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use serde::Deserialize;

use crate::config::EthereumConfig;
use crate::error::{LabError, Result};
use crate::time::WallClock;

#[derive(Debug, Clone, Deserialize)]
pub struct RawNetworkConfig {
    #[serde(rename = "PRESET_BASE")]
    pub preset_base: String,
    #[serde(rename = "CONFIG_NAME")]
    pub config_name: String,
    #[serde(rename = "MIN_GENESIS_ACTIVE_VALIDATOR_COUNT")]
    pub min_genesis_active_validator_count: u64,
    #[serde(rename = "MIN_GENESIS_TIME")]
    pub min_genesis_time: i64,
    #[serde(rename = "GENESIS_DELAY")]
    pub genesis_delay: u64,
    #[serde(rename = "ALTAIR_FORK_EPOCH")]
    pub altair_fork_epoch: u64,
    #[serde(rename = "BELLATRIX_FORK_EPOCH")]
    pub bellatrix_fork_epoch: u64,
    #[serde(rename = "CAPELLA_FORK_EPOCH")]
    pub capella_fork_epoch: u64,
    #[serde(rename = "DENEB_FORK_EPOCH")]
    pub deneb_fork_epoch: u64,
    #[serde(rename = "ELECTRA_FORK_EPOCH")]
    pub electra_fork_epoch: Option<u64>,
    #[serde(rename = "SECONDS_PER_SLOT")]
    pub seconds_per_slot: u64,
}

/// Canonical fork names in chronological order; used both to validate
/// monotonicity and to resolve the active fork for a slot.
const FORK_ORDER: &[&str] = &[
    "genesis",
    "altair",
    "bellatrix",
    "capella",
    "deneb",
    "electra",
];

pub struct EthereumNetwork {
    pub name: String,
    config_url: String,
    genesis_time: i64,
    config: RawNetworkConfig,
    forks: BTreeMap<String, u64>,
    clock: WallClock,
}

impl EthereumNetwork {
    /// Downloads and parses the network's config YAML, validating that
    /// fork epochs are non-decreasing in chronological order.
    pub async fn initialize(
        name: impl Into<String>,
        config_url: impl Into<String>,
        genesis_time: i64,
        http: &reqwest::Client,
    ) -> Result<Self> {
        let name = name.into();
        let config_url = config_url.into();

        tracing::info!(network = %name, config_url = %config_url, "downloading network config");

        let policy = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(StdDuration::from_secs(30)))
            .build();
        let raw = backoff::future::retry(policy, || async {
            http.get(&config_url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| {
                    tracing::warn!(network = %name, error = %e, "config download failed, retrying");
                    backoff::Error::transient(e)
                })
        })
        .await
        .map_err(|e| LabError::Transient(e.to_string()))?
        .text()
        .await
        .map_err(|e| LabError::Other(e.into()))?;

        let config: RawNetworkConfig =
            serde_yaml::from_str(&raw).map_err(|e| LabError::config_invalid(e.to_string()))?;

        let mut forks = BTreeMap::new();
        forks.insert("genesis".to_string(), 0);
        forks.insert("altair".to_string(), config.altair_fork_epoch);
        forks.insert("bellatrix".to_string(), config.bellatrix_fork_epoch);
        forks.insert("capella".to_string(), config.capella_fork_epoch);
        forks.insert("deneb".to_string(), config.deneb_fork_epoch);
        if let Some(electra) = config.electra_fork_epoch {
            forks.insert("electra".to_string(), electra);
        }

        validate_fork_monotonicity(&forks)?;

        let clock = WallClock::new(genesis_time, config.seconds_per_slot);

        Ok(Self {
            name,
            config_url,
            genesis_time,
            config,
            forks,
            clock,
        })
    }

    pub fn config_url(&self) -> &str {
        &self.config_url
    }

    pub fn genesis_time(&self) -> i64 {
        self.genesis_time
    }

    pub fn config(&self) -> &RawNetworkConfig {
        &self.config
    }

    pub fn clock(&self) -> &WallClock {
        &self.clock
    }

    pub fn forks(&self) -> &BTreeMap<String, u64> {
        &self.forks
    }

    pub fn fork_epoch(&self, fork_name: &str) -> Option<u64> {
        self.forks.get(fork_name).copied()
    }

    /// Resolves the active fork at `slot`, or the current slot if `None`.
    pub fn current_fork(&self, slot: Option<u64>) -> &'static str {
        let slot = slot.unwrap_or_else(|| self.clock.current_slot());
        let epoch = slot / crate::time::SLOTS_PER_EPOCH;

        for fork_name in FORK_ORDER.iter().rev() {
            if let Some(&fork_epoch) = self.forks.get(*fork_name) {
                if epoch >= fork_epoch {
                    return fork_name;
                }
            }
        }
        "genesis"
    }
}

fn validate_fork_monotonicity(forks: &BTreeMap<String, u64>) -> Result<()> {
    let mut last = 0u64;
    for fork_name in FORK_ORDER {
        let Some(&epoch) = forks.get(*fork_name) else {
            continue;
        };
        if epoch < last {
            return Err(LabError::data_integrity(format!(
                "fork `{fork_name}` epoch {epoch} precedes an earlier fork's epoch {last}"
            )));
        }
        last = epoch;
    }
    Ok(())
}

/// Owns one [`EthereumNetwork`] per configured network name, downloading
/// all of them concurrently at startup.
pub struct NetworkCatalog {
    networks: BTreeMap<String, Arc<EthereumNetwork>>,
}

impl NetworkCatalog {
    pub async fn initialize(ethereum: &EthereumConfig, network_names: &[String]) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(15))
            .build()
            .map_err(|e| LabError::Other(e.into()))?;

        let mut futures = Vec::new();
        for name in network_names {
            let cfg = ethereum.networks.get(name).ok_or_else(|| {
                LabError::config_invalid(format!("network `{name}` is not configured"))
            })?;
            futures.push(EthereumNetwork::initialize(
                name.clone(),
                cfg.config_url.clone(),
                cfg.genesis_time,
                &http,
            ));
        }

        let initialized = futures::future::try_join_all(futures).await?;
        let networks = initialized
            .into_iter()
            .map(|network| (network.name.clone(), Arc::new(network)))
            .collect();

        Ok(Self { networks })
    }

    pub fn get(&self, name: &str) -> Option<Arc<EthereumNetwork>> {
        self.networks.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.networks.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forks(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn monotonic_forks_pass_validation() {
        let forks = forks(&[
            ("genesis", 0),
            ("altair", 100),
            ("bellatrix", 200),
            ("capella", 300),
            ("deneb", 400),
            ("electra", 500),
        ]);
        assert!(validate_fork_monotonicity(&forks).is_ok());
    }

    #[test]
    fn out_of_order_fork_is_rejected() {
        let forks = forks(&[
            ("genesis", 0),
            ("altair", 300),
            ("bellatrix", 200),
            ("capella", 400),
            ("deneb", 500),
        ]);
        assert!(validate_fork_monotonicity(&forks).is_err());
    }
}

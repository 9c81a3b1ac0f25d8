//! Configuration models for the lab backend.
//!
//! Loaded from a single YAML document (`-c/--config`, default
//! `config.yaml`) and validated on load. Duration strings use the
//! `N(s|m|h|d)` suffix grammar everywhere; see [`Duration`].

use std::collections::BTreeMap;
use std::time::Duration as StdDuration;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{LabError, Result};

/// A duration parsed from the `N(s|m|h|d)` suffix grammar (e.g. `"5m"`,
/// `"30d"`). Deserializes straight from a YAML string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(pub StdDuration);

impl Duration {
    pub fn parse(s: &str) -> Result<Self> {
        let (value, unit) = s.split_at(s.len().saturating_sub(1));
        let value: u64 = value
            .parse()
            .map_err(|_| LabError::config_invalid(format!("invalid duration `{s}`")))?;
        let secs = match unit {
            "s" => value,
            "m" => value * 60,
            "h" => value * 3600,
            "d" => value * 86400,
            _ => {
                return Err(LabError::config_invalid(format!(
                    "duration `{s}` must end with s, m, h, or d"
                )));
            }
        };
        Ok(Duration(StdDuration::from_secs(secs)))
    }

    pub fn as_std(&self) -> StdDuration {
        self.0
    }

    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Duration::parse(&s).map_err(DeError::custom)
    }
}

impl Serialize for Duration {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Round-trip through seconds with an `s` suffix; the exact unit
        // the operator wrote is not retained, which is fine since this
        // is only ever re-serialized into the frontend config snapshot.
        serializer.serialize_str(&format!("{}s", self.0.as_secs()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub s3: S3Config,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeWindowConfig {
    pub file: String,
    pub step: Duration,
    pub label: String,
    /// Negative-looking range like `"-90d"`; stored as the positive span.
    pub range: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EthereumNetworkConfig {
    pub config_url: String,
    pub genesis_time: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EthereumConfig {
    #[serde(default)]
    pub networks: BTreeMap<String, EthereumNetworkConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BeaconNetworkConfig {
    #[serde(default = "default_head_lag_slots")]
    pub head_lag_slots: u64,
    #[serde(default = "default_backlog_days")]
    pub backlog_days: u64,
}

impl Default for BeaconNetworkConfig {
    fn default() -> Self {
        Self {
            head_lag_slots: default_head_lag_slots(),
            backlog_days: default_backlog_days(),
        }
    }
}

fn default_head_lag_slots() -> u64 {
    2
}

fn default_backlog_days() -> u64 {
    3
}

/// Fields shared by every module's configuration block.
pub trait ModuleConfigBase {
    fn enabled(&self) -> bool;
    fn description(&self) -> &str;
    fn path_prefix(&self) -> &str;
}

#[derive(Debug, Clone, Deserialize)]
pub struct BeaconConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_beacon_description")]
    pub description: String,
    #[serde(default = "default_beacon_prefix")]
    pub path_prefix: String,
    /// Per-network overrides; merged over the root `ethereum.networks` list
    /// at registration time (see `BeaconConfig::merged_networks`).
    #[serde(default)]
    pub networks: Option<BTreeMap<String, BeaconNetworkConfig>>,
}

fn default_beacon_description() -> String {
    "Beacon chain metrics".to_string()
}

fn default_beacon_prefix() -> String {
    "beacon".to_string()
}

impl ModuleConfigBase for BeaconConfig {
    fn enabled(&self) -> bool {
        self.enabled
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn path_prefix(&self) -> &str {
        &self.path_prefix
    }
}

impl BeaconConfig {
    /// Root-level network list as a base, overlaid with any module-specific
    /// per-network config. Falls back to `mainnet` if nothing is configured
    /// at all.
    pub fn merged_networks(
        &self,
        ethereum: &EthereumConfig,
    ) -> BTreeMap<String, BeaconNetworkConfig> {
        let mut merged: BTreeMap<String, BeaconNetworkConfig> = ethereum
            .networks
            .keys()
            .map(|name| (name.clone(), BeaconNetworkConfig::default()))
            .collect();

        if let Some(networks) = &self.networks {
            for (name, cfg) in networks {
                merged.insert(name.clone(), cfg.clone());
            }
        }

        if merged.is_empty() {
            merged.insert("mainnet".to_string(), BeaconNetworkConfig::default());
        }

        merged
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BeaconChainTimingsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_timings_description")]
    pub description: String,
    #[serde(default = "default_timings_prefix")]
    pub path_prefix: String,
    #[serde(default = "default_networks")]
    pub networks: Vec<String>,
    #[serde(default)]
    pub time_windows: Vec<TimeWindowConfig>,
    #[serde(default = "default_interval")]
    pub interval: Duration,
}

fn default_timings_description() -> String {
    "Beacon chain block timing metrics".to_string()
}

fn default_timings_prefix() -> String {
    "beacon_chain_timings".to_string()
}

fn default_networks() -> Vec<String> {
    vec!["mainnet".to_string()]
}

fn default_interval() -> Duration {
    Duration::parse("5m").expect("valid literal")
}

impl ModuleConfigBase for BeaconChainTimingsConfig {
    fn enabled(&self) -> bool {
        self.enabled
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn path_prefix(&self) -> &str {
        &self.path_prefix
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct XatuPublicContributorsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_xatu_description")]
    pub description: String,
    #[serde(default = "default_xatu_prefix")]
    pub path_prefix: String,
    #[serde(default = "default_networks")]
    pub networks: Vec<String>,
    #[serde(default)]
    pub time_windows: Vec<TimeWindowConfig>,
    #[serde(default = "default_schedule_hours")]
    pub schedule_hours: u64,
}

fn default_xatu_description() -> String {
    "Xatu public contributor metrics".to_string()
}

fn default_xatu_prefix() -> String {
    "xatu_public_contributors".to_string()
}

fn default_schedule_hours() -> u64 {
    1
}

impl ModuleConfigBase for XatuPublicContributorsConfig {
    fn enabled(&self) -> bool {
        self.enabled
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn path_prefix(&self) -> &str {
        &self.path_prefix
    }
}

impl XatuPublicContributorsConfig {
    pub fn interval(&self) -> Duration {
        Duration(StdDuration::from_secs(self.schedule_hours * 3600))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModulesConfig {
    pub beacon: Option<BeaconConfig>,
    pub beacon_chain_timings: Option<BeaconChainTimingsConfig>,
    pub xatu_public_contributors: Option<XatuPublicContributorsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub clickhouse: ClickHouseConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
    #[serde(default)]
    pub ethereum: EthereumConfig,
}

impl Config {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| LabError::config_invalid(e.to_string()))
    }

    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LabError::config_invalid(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&raw)
    }

    /// Frontend-visible snapshot of enabled modules and networks, written
    /// to `config.json` once per Runner start.
    pub fn frontend_config(&self) -> serde_json::Value {
        let mut modules = serde_json::Map::new();

        if let Some(beacon) = &self.modules.beacon {
            let entry = if beacon.enabled {
                let networks: serde_json::Map<String, serde_json::Value> = beacon
                    .merged_networks(&self.ethereum)
                    .into_iter()
                    .map(|(name, cfg)| {
                        (
                            name,
                            serde_json::json!({
                                "head_lag_slots": cfg.head_lag_slots,
                                "backlog_days": cfg.backlog_days,
                            }),
                        )
                    })
                    .collect();
                serde_json::json!({
                    "enabled": beacon.enabled,
                    "description": beacon.description,
                    "path_prefix": beacon.path_prefix,
                    "networks": networks,
                })
            } else {
                serde_json::json!({
                    "enabled": beacon.enabled,
                    "description": beacon.description,
                    "path_prefix": beacon.path_prefix,
                })
            };
            modules.insert("beacon".to_string(), entry);
        }

        if let Some(timings) = &self.modules.beacon_chain_timings {
            let entry = if timings.enabled {
                serde_json::json!({
                    "enabled": timings.enabled,
                    "description": timings.description,
                    "path_prefix": timings.path_prefix,
                    "networks": timings.networks,
                    "time_windows": timings.time_windows,
                })
            } else {
                serde_json::json!({
                    "enabled": timings.enabled,
                    "description": timings.description,
                    "path_prefix": timings.path_prefix,
                })
            };
            modules.insert("beacon_chain_timings".to_string(), entry);
        }

        if let Some(xatu) = &self.modules.xatu_public_contributors {
            let entry = if xatu.enabled {
                serde_json::json!({
                    "enabled": xatu.enabled,
                    "description": xatu.description,
                    "path_prefix": xatu.path_prefix,
                    "networks": xatu.networks,
                    "time_windows": xatu.time_windows,
                })
            } else {
                serde_json::json!({
                    "enabled": xatu.enabled,
                    "description": xatu.description,
                    "path_prefix": xatu.path_prefix,
                })
            };
            modules.insert("xatu_public_contributors".to_string(), entry);
        }

        let networks: serde_json::Map<String, serde_json::Value> = self
            .ethereum
            .networks
            .iter()
            .map(|(name, cfg)| {
                (
                    name.clone(),
                    serde_json::json!({ "genesis_time": cfg.genesis_time }),
                )
            })
            .collect();

        serde_json::json!({
            "modules": modules,
            "ethereum": { "networks": networks },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parses_every_suffix() {
        assert_eq!(Duration::parse("5m").unwrap().as_secs(), 300);
        assert_eq!(Duration::parse("2h").unwrap().as_secs(), 7200);
        assert_eq!(Duration::parse("1d").unwrap().as_secs(), 86400);
        assert_eq!(Duration::parse("30s").unwrap().as_secs(), 30);
        assert!(Duration::parse("5x").is_err());
    }

    #[test]
    fn beacon_merges_root_networks_with_overrides() {
        let mut ethereum = EthereumConfig::default();
        ethereum.networks.insert(
            "mainnet".to_string(),
            EthereumNetworkConfig {
                config_url: "https://example/mainnet.yaml".into(),
                genesis_time: 1_606_824_023,
            },
        );
        let beacon = BeaconConfig {
            enabled: true,
            description: default_beacon_description(),
            path_prefix: default_beacon_prefix(),
            networks: None,
        };
        let merged = beacon.merged_networks(&ethereum);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged["mainnet"].head_lag_slots, 2);
    }

    #[test]
    fn beacon_defaults_to_mainnet_when_nothing_configured() {
        let ethereum = EthereumConfig::default();
        let beacon = BeaconConfig {
            enabled: true,
            description: default_beacon_description(),
            path_prefix: default_beacon_prefix(),
            networks: None,
        };
        let merged = beacon.merged_networks(&ethereum);
        assert_eq!(merged.len(), 1);
        assert!(merged.contains_key("mainnet"));
    }

    #[test]
    fn full_config_parses_from_yaml() {
        let yaml = r#"
storage:
  s3:
    endpoint: "https://s3.example.com"
    region: "us-east-1"
    bucket: "lab"
    access_key_id: "key"
    secret_access_key: "secret"
clickhouse:
  url: "clickhouse://localhost:9000/default"
ethereum:
  networks:
    mainnet:
      config_url: "https://example/mainnet.yaml"
      genesis_time: 1606824023
modules:
  beacon:
    enabled: true
"#;
        let cfg = Config::from_yaml_str(yaml).unwrap();
        assert!(cfg.modules.beacon.unwrap().enabled);
        assert_eq!(cfg.ethereum.networks["mainnet"].genesis_time, 1_606_824_023);
    }

    #[test]
    fn frontend_config_omits_networks_for_disabled_module() {
        let yaml = r#"
storage:
  s3:
    endpoint: "https://s3.example.com"
    region: "us-east-1"
    bucket: "lab"
    access_key_id: "key"
    secret_access_key: "secret"
clickhouse:
  url: "clickhouse://localhost:9000/default"
ethereum:
  networks:
    mainnet:
      config_url: "https://example/mainnet.yaml"
      genesis_time: 1606824023
modules:
  beacon:
    enabled: false
"#;
        let cfg = Config::from_yaml_str(yaml).unwrap();
        let snapshot = cfg.frontend_config();
        let beacon = &snapshot["modules"]["beacon"];
        assert_eq!(beacon["enabled"], false);
        assert!(beacon.get("networks").is_none());
        assert!(beacon.get("time_windows").is_none());
    }
}

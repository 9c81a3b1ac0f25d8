//! Publishes the frontend-facing `config.json` snapshot once per Runner
//! start, so the static frontend knows which modules and networks are
//! live without needing its own copy of the YAML config.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::{LabError, Result};
use crate::storage::ObjectStore;

const CONFIG_KEY: &str = "config.json";

pub struct FrontendConfigExporter {
    storage: Arc<dyn ObjectStore>,
}

impl FrontendConfigExporter {
    pub fn new(storage: Arc<dyn ObjectStore>) -> Self {
        Self { storage }
    }

    pub async fn export(&self, config: &Config) -> Result<()> {
        info!("publishing frontend config snapshot");
        let snapshot = config.frontend_config();
        let bytes = serde_json::to_vec(&snapshot).map_err(|e| LabError::Other(e.into()))?;
        self.storage.put_atomic(CONFIG_KEY, bytes, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;

    #[tokio::test]
    async fn export_publishes_config_json() {
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
        let config = Config::from_yaml_str(yaml).unwrap();
        let storage: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let exporter = FrontendConfigExporter::new(storage.clone());
        exporter.export(&config).await.unwrap();

        assert!(storage.exists(CONFIG_KEY).await.unwrap());
        let bytes = storage.get(CONFIG_KEY).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value["modules"]["beacon"]["enabled"].as_bool().unwrap());
    }
}

//! Top-level wiring: builds the shared collaborators (object store,
//! warehouse client, network catalog), registers modules independently
//! of one another, and runs until an OS termination signal arrives.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::frontend::FrontendConfigExporter;
use crate::network::NetworkCatalog;
use crate::processor::BoxModule;
use crate::state::StateStore;
use crate::storage::{ObjectStore, S3ObjectStore};
use crate::warehouse::WarehouseClient;

pub struct Runner {
    config: Config,
    storage: Arc<dyn ObjectStore>,
    warehouse: Arc<WarehouseClient>,
    networks: Arc<NetworkCatalog>,
    modules: Vec<BoxModule>,
    state_stores: Vec<Arc<StateStore>>,
}

impl Runner {
    /// `storage_override` lets callers (namely the CLI's `--storage
    /// fs:<dir>` dev mode) substitute a non-S3 [`ObjectStore`] without
    /// this constructor needing to know about every implementation.
    pub async fn new(
        config: Config,
        network_names: &[String],
        storage_override: Option<Arc<dyn ObjectStore>>,
    ) -> Result<Self> {
        let storage: Arc<dyn ObjectStore> = match storage_override {
            Some(storage) => storage,
            None => Arc::new(S3ObjectStore::new(&config.storage.s3).await?),
        };
        let warehouse = Arc::new(WarehouseClient::new(&config.clickhouse));
        warehouse.start().await?;
        let networks = Arc::new(NetworkCatalog::initialize(&config.ethereum, network_names).await?);

        Ok(Self {
            config,
            storage,
            warehouse,
            networks,
            modules: Vec::new(),
            state_stores: Vec::new(),
        })
    }

    pub fn storage(&self) -> Arc<dyn ObjectStore> {
        self.storage.clone()
    }

    pub fn warehouse(&self) -> Arc<WarehouseClient> {
        self.warehouse.clone()
    }

    pub fn networks(&self) -> Arc<NetworkCatalog> {
        self.networks.clone()
    }

    pub fn new_state_store(&mut self, module_name: &str) -> Arc<StateStore> {
        let store = StateStore::new(module_name, self.storage.clone());
        self.state_stores.push(store.clone());
        store
    }

    pub fn register_module(&mut self, module: BoxModule) {
        self.modules.push(module);
    }

    /// Starts every registered module, publishes the frontend config
    /// snapshot, then blocks until SIGINT/SIGTERM, then shuts everything
    /// down in reverse order. A single module failing to start is logged
    /// and does not prevent the others from running.
    pub async fn run(mut self) -> Result<()> {
        for module in &self.modules {
            info!(module = module.name(), "starting module");
            if let Err(e) = module.start().await {
                error!(module = module.name(), error = %e, "module failed to start");
            }
        }

        let exporter = FrontendConfigExporter::new(self.storage.clone());
        if let Err(e) = exporter.export(&self.config).await {
            warn!(error = %e, "failed to publish frontend config snapshot");
        }

        info!("runner started, waiting for termination signal");
        wait_for_termination().await;
        info!("termination signal received, shutting down");

        for module in self.modules.drain(..) {
            info!(module = module.name(), "stopping module");
            module.stop().await;
        }

        self.warehouse.stop().await;

        for store in self.state_stores.drain(..) {
            store.stop().await;
        }

        info!("runner shutdown complete");
        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}

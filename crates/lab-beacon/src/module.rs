//! Wires one [`SlotProcessor`] per configured network into a
//! [`lab_core::processor::Module`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use lab_core::config::{BeaconConfig, EthereumConfig};
use lab_core::processor::{Module, ModuleContext};

use crate::backlog::BacklogConfig;
use crate::slot_processor::SlotProcessor;

pub struct BeaconModule {
    ctx: ModuleContext,
    processors: Vec<(String, Arc<SlotProcessor>)>,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl BeaconModule {
    pub fn new(ctx: ModuleContext, config: &BeaconConfig, ethereum: &EthereumConfig) -> Self {
        let networks = config.merged_networks(ethereum);
        let mut processors = Vec::new();

        for (network_name, network_cfg) in networks {
            let network = match ctx.networks.get(&network_name) {
                Some(n) => n,
                None => {
                    warn!(network = %network_name, "beacon module configured for an unknown network, skipping");
                    continue;
                }
            };

            let backlog_config = BacklogConfig {
                target_date: Some(Utc::now() - ChronoDuration::days(network_cfg.backlog_days as i64)),
                ..Default::default()
            };

            let processor = Arc::new(SlotProcessor::new(
                ctx.clone(),
                network_name.clone(),
                network,
                network_cfg.head_lag_slots,
                backlog_config,
            ));
            processors.push((network_name, processor));
        }

        Self {
            ctx,
            processors,
            handles: tokio::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Module for BeaconModule {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    async fn start(&self) -> anyhow::Result<()> {
        info!(module = %self.ctx.name, networks = self.processors.len(), "starting beacon module");
        let mut handles = self.handles.lock().await;
        for (network_name, processor) in &self.processors {
            info!(network = %network_name, "starting slot processor");
            handles.extend(processor.start());
        }
        Ok(())
    }

    async fn stop(&self) {
        info!(module = %self.ctx.name, "stopping beacon module");
        for (_, processor) in &self.processors {
            processor.stop();
        }
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                error!(module = %self.ctx.name, error = %e, "slot processor task panicked");
            }
        }
    }
}

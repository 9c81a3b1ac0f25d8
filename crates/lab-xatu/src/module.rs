use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use lab_core::config::XatuPublicContributorsConfig;
use lab_core::processor::{Module, ModuleContext, Processor};

use crate::processor::{ContributorSummaryProcessor, build_processors};

pub struct XatuPublicContributorsModule {
    ctx: ModuleContext,
    processors: Vec<Arc<ContributorSummaryProcessor>>,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl XatuPublicContributorsModule {
    pub fn new(ctx: ModuleContext, config: &XatuPublicContributorsConfig) -> Self {
        let interval = config.interval().0;
        let processors = build_processors(&ctx, &config.networks, &config.time_windows, interval);
        Self {
            ctx,
            processors,
            cancel: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Module for XatuPublicContributorsModule {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    async fn start(&self) -> anyhow::Result<()> {
        info!(module = %self.ctx.name, processors = self.processors.len(), "starting xatu public contributors module");
        let mut handles = self.handles.lock().await;
        for processor in &self.processors {
            handles.push(Processor::start(processor.clone(), self.cancel.clone()).await);
        }
        Ok(())
    }

    async fn stop(&self) {
        info!(module = %self.ctx.name, "stopping xatu public contributors module");
        self.cancel.cancel();
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }
}

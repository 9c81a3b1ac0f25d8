//! Representative `beacon_chain_timings` processor: a per-network,
//! per-time-window block propagation summary. Stands in for the full
//! set of timing processors the reference module runs; the cadence,
//! config shape, and publish path are real, the query body is one
//! illustrative aggregate.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;

use lab_core::config::TimeWindowConfig;
use lab_core::processor::{ModuleContext, Processor};
use lab_core::warehouse::Params;

use crate::model::{PropagationSummaryRow, TimingsSummary};

pub struct BlockPropagationSummaryProcessor {
    ctx: ModuleContext,
    network: String,
    window: TimeWindowConfig,
    interval: StdDuration,
}

impl BlockPropagationSummaryProcessor {
    pub fn new(
        ctx: ModuleContext,
        network: impl Into<String>,
        window: TimeWindowConfig,
        interval: StdDuration,
    ) -> Self {
        Self {
            ctx,
            network: network.into(),
            window,
            interval,
        }
    }

    fn storage_key(&self) -> String {
        self.ctx
            .storage_key(&[&self.network, &self.window.label, "summary.json"])
    }

    async fn query_summary(&self) -> anyhow::Result<Vec<PropagationSummaryRow>> {
        let range_secs = self.window.range.0.as_secs();
        let sql = "SELECT meta_client_name, \
                avg(propagation_slot_start_diff) as avg_propagation_ms, \
                min(propagation_slot_start_diff) as min_propagation_ms, \
                max(propagation_slot_start_diff) as max_propagation_ms, \
                count(*) as sample_count \
             FROM default.beacon_api_eth_v1_events_block \
             WHERE meta_network_name = {network: String} \
               AND slot_start_date_time >= now() - INTERVAL {range_secs: UInt64} SECOND \
             GROUP BY meta_client_name \
             ORDER BY meta_client_name";
        let params = Params::new()
            .with("network", self.network.clone())
            .with("range_secs", range_secs);
        Ok(self.ctx.warehouse.query(sql, &params).await?)
    }
}

#[async_trait]
impl Processor for BlockPropagationSummaryProcessor {
    fn name(&self) -> &str {
        "block_propagation_summary"
    }

    fn interval(&self) -> StdDuration {
        self.interval
    }

    fn state(&self) -> &Arc<lab_core::state::StateStore> {
        &self.ctx.state
    }

    async fn process(&self) -> anyhow::Result<()> {
        let clients = self.query_summary().await?;
        let summary = TimingsSummary {
            network: self.network.clone(),
            window: self.window.label.clone(),
            generated_at: Utc::now(),
            clients,
        };
        let bytes = serde_json::to_vec(&summary)?;
        self.ctx
            .storage
            .put_atomic(&self.storage_key(), bytes, Some("public,max-age=300"))
            .await?;
        Ok(())
    }
}

pub fn build_processors(
    ctx: &ModuleContext,
    networks: &[String],
    time_windows: &[TimeWindowConfig],
    interval: StdDuration,
) -> Vec<Arc<BlockPropagationSummaryProcessor>> {
    let mut processors = Vec::new();
    for network in networks {
        for window in time_windows {
            processors.push(Arc::new(BlockPropagationSummaryProcessor::new(
                ctx.clone(),
                network.clone(),
                window.clone(),
                interval,
            )));
        }
    }
    processors
}

//! Representative `xatu_public_contributors` processor: a per-network,
//! per-time-window count of distinct public contributor nodes by client
//! and country. Stands in for the reference module's fan-out of named
//! sub-processors (countries/users/user_summaries/summary), run on one
//! shared interval as in the original.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;

use lab_core::config::TimeWindowConfig;
use lab_core::processor::{ModuleContext, Processor};
use lab_core::warehouse::Params;

use crate::model::{ContributorCountRow, ContributorSummary};

pub struct ContributorSummaryProcessor {
    ctx: ModuleContext,
    network: String,
    window: TimeWindowConfig,
    interval: StdDuration,
}

impl ContributorSummaryProcessor {
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

    async fn query_summary(&self) -> anyhow::Result<Vec<ContributorCountRow>> {
        let range_secs = self.window.range.0.as_secs();
        let sql = "SELECT meta_consensus_implementation, meta_client_geo_country, \
                uniqExact(meta_client_name) as contributor_count \
             FROM default.beacon_api_eth_v1_events_block \
             WHERE meta_network_name = {network: String} \
               AND meta_client_name LIKE '%ethpandaops%' \
               AND slot_start_date_time >= now() - INTERVAL {range_secs: UInt64} SECOND \
             GROUP BY meta_consensus_implementation, meta_client_geo_country \
             ORDER BY meta_consensus_implementation, meta_client_geo_country";
        let params = Params::new()
            .with("network", self.network.clone())
            .with("range_secs", range_secs);
        Ok(self.ctx.warehouse.query(sql, &params).await?)
    }
}

#[async_trait]
impl Processor for ContributorSummaryProcessor {
    fn name(&self) -> &str {
        "contributor_summary"
    }

    fn interval(&self) -> StdDuration {
        self.interval
    }

    fn state(&self) -> &Arc<lab_core::state::StateStore> {
        &self.ctx.state
    }

    async fn process(&self) -> anyhow::Result<()> {
        let contributors = self.query_summary().await?;
        let summary = ContributorSummary {
            network: self.network.clone(),
            window: self.window.label.clone(),
            generated_at: Utc::now(),
            contributors,
        };
        let bytes = serde_json::to_vec(&summary)?;
        self.ctx
            .storage
            .put_atomic(&self.storage_key(), bytes, Some("public,max-age=3600"))
            .await?;
        Ok(())
    }
}

pub fn build_processors(
    ctx: &ModuleContext,
    networks: &[String],
    time_windows: &[TimeWindowConfig],
    interval: StdDuration,
) -> Vec<Arc<ContributorSummaryProcessor>> {
    let mut processors = Vec::new();
    for network in networks {
        for window in time_windows {
            processors.push(Arc::new(ContributorSummaryProcessor::new(
                ctx.clone(),
                network.clone(),
                window.clone(),
                interval,
            )));
        }
    }
    processors
}

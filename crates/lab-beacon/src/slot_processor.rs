//! The per-(module, network) three-phase slot driver: head keeps up with
//! the chain tip, middle catches up the last stretch behind the tip, and
//! backlog walks backward toward a configured target. Ported from the
//! reference `SlotProcessor`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lab_core::error::Result;
use lab_core::geo::Geocoder;
use lab_core::network::EthereumNetwork;
use lab_core::processor::ModuleContext;
use lab_core::time::SLOTS_PER_EPOCH;

use crate::backlog::BacklogConfig;
use crate::model::{self, Proposer, SlotArtifact, Timings};
use crate::queries;
use crate::state::SlotProcessorState;

const BACKLOG_SLEEP: StdDuration = StdDuration::from_millis(500);
const TIGHT_LOOP_SLEEP: StdDuration = StdDuration::from_millis(50);
const IDLE_SLEEP: StdDuration = StdDuration::from_secs(1);
const SLOT_QUERY_GRACE: TimeDelta = TimeDelta::minutes(15);
const MIDDLE_LOOKBACK_SLOTS: u64 = 300;

pub struct SlotProcessor {
    ctx: ModuleContext,
    network: Arc<EthereumNetwork>,
    network_name: String,
    head_lag_slots: u64,
    backlog_config: BacklogConfig,
    geocoder: Geocoder,
    cancel: CancellationToken,
}

impl SlotProcessor {
    pub fn new(
        ctx: ModuleContext,
        network_name: impl Into<String>,
        network: Arc<EthereumNetwork>,
        head_lag_slots: u64,
        backlog_config: BacklogConfig,
    ) -> Self {
        Self {
            ctx,
            network,
            network_name: network_name.into(),
            head_lag_slots,
            backlog_config,
            geocoder: Geocoder::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn name(&self) -> String {
        format!("slot_{}", self.network_name)
    }

    fn storage_key(&self, slot: u64) -> String {
        self.ctx
            .storage_key(&["slots", &self.network_name, &format!("{slot}.json")])
    }

    /// `[slot_start - 15min, slot_end + 15min)`.
    fn graced_slot_window(&self, slot: u64) -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
        let (start, end) = self.network.clock().slot_window(slot);
        (start - SLOT_QUERY_GRACE, end + SLOT_QUERY_GRACE)
    }

    async fn process_slot(&self, slot: u64) -> bool {
        let key = self.storage_key(slot);
        match self.ctx.storage.exists(&key).await {
            Ok(true) => {
                debug!(slot, network = %self.network_name, "slot already processed, skipping");
                return true;
            }
            Ok(false) => {}
            Err(e) => {
                error!(slot, network = %self.network_name, error = %e, "failed to check slot existence");
                return false;
            }
        }

        let started_at = Utc::now();
        match self.process_slot_inner(slot, started_at).await {
            Ok(()) => true,
            Err(e) => {
                error!(slot, network = %self.network_name, error = %e, "error processing slot");
                false
            }
        }
    }

    async fn process_slot_inner(&self, slot: u64, started_at: chrono::DateTime<Utc>) -> Result<()> {
        let window = self.graced_slot_window(slot);
        let warehouse = &*self.ctx.warehouse;

        let (block, proposer) = tokio::try_join!(
            queries::block_data(warehouse, &self.network_name, slot, window),
            queries::proposer_data(warehouse, &self.network_name, slot, window),
        )?;

        let exact_window = self.network.clock().slot_window(slot);
        let (
            max_votes,
            entity,
            block_seen,
            blob_seen,
            block_p2p,
            blob_p2p,
            votes,
        ) = tokio::try_join!(
            queries::maximum_attestation_votes(warehouse, &self.network_name, slot, window),
            queries::proposer_entity(warehouse, &self.network_name, proposer.proposer_validator_index),
            queries::block_seen_at_slot_time(warehouse, &self.network_name, slot, window),
            queries::blob_seen_at_slot_time(warehouse, &self.network_name, slot, window),
            queries::block_first_seen_in_p2p_slot_time(warehouse, &self.network_name, slot, window),
            queries::blob_first_seen_in_p2p_slot_time(warehouse, &self.network_name, slot, window),
            queries::attestation_votes(warehouse, &self.network_name, slot, &block.block_root, exact_window),
        )?;

        let nodes = model::build_node_map(&self.geocoder, &block_seen, &blob_seen, &block_p2p, &blob_p2p);
        let windows = model::bucket_attestation_votes(&votes);

        let artifact = SlotArtifact {
            slot,
            network: self.network_name.clone(),
            processed_at: Utc::now(),
            processing_time_ms: (Utc::now() - started_at).num_milliseconds(),
            block,
            proposer: Proposer {
                slot: proposer.slot,
                pubkey: proposer.proposer_pubkey,
                validator_index: proposer.proposer_validator_index,
            },
            entity,
            nodes,
            timings: Timings {
                block_seen: block_seen_times(&block_seen),
                blob_seen: blob_seen_times(&blob_seen),
                block_first_seen_p2p: block_seen_times(&block_p2p),
                blob_first_seen_p2p: blob_seen_times(&blob_p2p),
            },
            attestations: model::Attestations {
                maximum_votes: max_votes,
                windows,
            },
        };

        let bytes = serde_json::to_vec(&artifact).map_err(|e| lab_core::LabError::Other(e.into()))?;
        self.ctx
            .storage
            .put(
                &self.storage_key(slot),
                bytes,
                Some("public,max-age=86400,s-maxage=86400"),
            )
            .await
    }

    fn calculate_backlog_target(&self) -> Result<u64> {
        self.backlog_config.target_slot(&self.network)
    }

    async fn load_or_init_state(&self, direction: &str) -> SlotProcessorState {
        let key = format!("{}_{}", self.name(), direction);
        if let Ok(state) = self.ctx.state.get_typed::<SlotProcessorState>(&key).await {
            return state;
        }

        let wallclock_slot = self.network.clock().current_slot();
        let head_target = wallclock_slot.saturating_sub(self.head_lag_slots);

        let state = match direction {
            "forward" => SlotProcessorState {
                target_slot: Some(head_target),
                current_slot: Some(head_target.saturating_sub(1)),
                last_processed_slot: None,
            },
            "middle" => {
                let target = head_target.saturating_sub(MIDDLE_LOOKBACK_SLOTS);
                let start = target.saturating_sub(MIDDLE_LOOKBACK_SLOTS);
                SlotProcessorState {
                    target_slot: Some(target),
                    current_slot: None,
                    last_processed_slot: Some(start),
                }
            }
            _ => {
                let target = self.calculate_backlog_target().unwrap_or(0);
                SlotProcessorState {
                    target_slot: Some(target),
                    current_slot: Some(head_target),
                    last_processed_slot: None,
                }
            }
        };

        if let Err(e) = self.ctx.state.set(&key, &state).await {
            warn!(network = %self.network_name, direction, error = %e, "failed to persist initial processor state");
        }
        state
    }

    async fn save_state(&self, direction: &str, state: &SlotProcessorState) {
        let key = format!("{}_{}", self.name(), direction);
        if let Err(e) = self.ctx.state.set(&key, state).await {
            warn!(network = %self.network_name, direction, error = %e, "failed to persist processor state");
        }
    }

    async fn run_head(&self) {
        info!(network = %self.network_name, "starting head processor");
        loop {
            let current_slot = self.network.clock().current_slot();
            let target = current_slot.saturating_sub(self.head_lag_slots);

            if !self.process_slot(target).await {
                error!(network = %self.network_name, slot = target, "failed to process head slot");
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(TIGHT_LOOP_SLEEP) => {}
            }
        }
        info!(network = %self.network_name, "head processor stopped");
    }

    /// Runs until caught up to its target, then returns. Middle
    /// advances past a failing slot so one bad slot never permanently
    /// stalls the region closest to the head.
    async fn run_middle(&self) {
        info!(network = %self.network_name, "starting middle processor");
        let mut state = self.load_or_init_state("middle").await;
        let target = state.target_slot.unwrap_or(0);
        let mut current = state.last_processed_slot.unwrap_or(0);

        while current < target {
            if self.cancel.is_cancelled() {
                break;
            }

            let ok = self.process_slot(current).await;
            if ok {
                debug!(network = %self.network_name, slot = current, "middle slot processed");
            } else {
                error!(network = %self.network_name, slot = current, "middle slot failed, advancing anyway");
            }
            current += 1;
            state.last_processed_slot = Some(current);
            self.save_state("middle", &state).await;

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(TIGHT_LOOP_SLEEP) => {}
            }
        }
        info!(network = %self.network_name, "middle processor caught up");
    }

    /// Walks backward from the head toward the configured target.
    /// Unlike middle, a failing slot does not advance state — it is
    /// retried on the next tick to preserve backfill completeness.
    async fn run_backlog(&self) {
        let target = match self.calculate_backlog_target() {
            Ok(t) => t,
            Err(e) => {
                error!(network = %self.network_name, error = %e, "invalid backlog config, not starting backlog processor");
                return;
            }
        };
        info!(network = %self.network_name, target, "starting backlog processor");

        let mut state = self.load_or_init_state("backward").await;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let current = state.current_slot.unwrap_or(target);
            if current <= target {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(IDLE_SLEEP) => continue,
                }
            }

            if self.process_slot(current).await {
                state.current_slot = Some(current - 1);
                self.save_state("backward", &state).await;
            } else {
                error!(network = %self.network_name, slot = current, "backlog slot failed, will retry");
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(BACKLOG_SLEEP) => {}
            }
        }
        info!(network = %self.network_name, "backlog processor stopped");
    }

    /// Launches head immediately, runs middle to completion, then
    /// launches backlog. Returns handles for all three so the owning
    /// module can await them on shutdown.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let head_self = self.clone();
        handles.push(tokio::spawn(async move { head_self.run_head().await }));

        let middle_self = self.clone();
        let backlog_self = self.clone();
        handles.push(tokio::spawn(async move {
            middle_self.run_middle().await;
            if !middle_self.cancel.is_cancelled() {
                backlog_self.run_backlog().await;
            }
        }));

        handles
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

fn block_seen_times(rows: &[crate::model::SeenAtSlotTimeRow]) -> std::collections::BTreeMap<String, i64> {
    rows.iter()
        .map(|r| (r.meta_client_name.clone(), r.slot_time_ms))
        .collect()
}

fn blob_seen_times(
    rows: &[crate::model::BlobSeenAtSlotTimeRow],
) -> std::collections::BTreeMap<String, std::collections::BTreeMap<u64, i64>> {
    let mut out: std::collections::BTreeMap<String, std::collections::BTreeMap<u64, i64>> =
        std::collections::BTreeMap::new();
    for row in rows {
        out.entry(row.meta_client_name.clone())
            .or_default()
            .insert(row.blob_index, row.slot_time_ms);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlobSeenAtSlotTimeRow, SeenAtSlotTimeRow};

    fn seen_row(client: &str, ms: i64) -> SeenAtSlotTimeRow {
        SeenAtSlotTimeRow {
            slot_time_ms: ms,
            meta_client_name: client.to_string(),
            meta_client_geo_city: String::new(),
            meta_client_geo_country: String::new(),
            meta_client_geo_continent_code: String::new(),
        }
    }

    fn blob_row(client: &str, blob_index: u64, ms: i64) -> BlobSeenAtSlotTimeRow {
        BlobSeenAtSlotTimeRow {
            slot_time_ms: ms,
            blob_index,
            meta_client_name: client.to_string(),
            meta_client_geo_city: String::new(),
            meta_client_geo_country: String::new(),
            meta_client_geo_continent_code: String::new(),
        }
    }

    #[test]
    fn epoch_conversion_matches_slots_per_epoch_constant() {
        assert_eq!(SLOTS_PER_EPOCH, 32);
    }

    #[test]
    fn block_seen_times_keys_by_client_name() {
        let rows = vec![seen_row("lighthouse-1", 100), seen_row("teku-1", 250)];
        let times = block_seen_times(&rows);
        assert_eq!(times.get("lighthouse-1"), Some(&100));
        assert_eq!(times.get("teku-1"), Some(&250));
    }

    #[test]
    fn blob_seen_times_nests_by_client_then_blob_index() {
        let rows = vec![
            blob_row("lighthouse-1", 0, 100),
            blob_row("lighthouse-1", 1, 120),
            blob_row("teku-1", 0, 90),
        ];
        let times = blob_seen_times(&rows);
        assert_eq!(times["lighthouse-1"][&0], 100);
        assert_eq!(times["lighthouse-1"][&1], 120);
        assert_eq!(times["teku-1"][&0], 90);
    }
}

//! Parameterized warehouse queries for a single slot, ported from the
//! reference `SlotProcessor`'s ClickHouse SQL bodies.
//!
//! Every query here is scoped to `meta_network_name` and a slot time
//! window; the window is `±15 minutes` around the slot except for
//! attestation votes, which use the exact slot window (see
//! `SlotProcessor::get_attestation_votes` upstream — propagation timing
//! needs to stay precise). All variable parts of the SQL — slot, network,
//! time bounds, block root — are bound as named `{name: Type}` query
//! parameters rather than spliced into the SQL text.

use chrono::{DateTime, Utc};

use lab_core::warehouse::{Params, WarehouseClient};
use lab_core::{LabError, Result};

use crate::model::{
    AttestationVoteRow, BlobSeenAtSlotTimeRow, BlockRow, EntityRow, MaxAttestationsRow,
    ProposerRow, SeenAtSlotTimeRow,
};

fn fmt_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn slot_window_params(network: &str, slot: u64, window: (DateTime<Utc>, DateTime<Utc>)) -> Params {
    Params::new()
        .with("slot", slot)
        .with("network", network.to_string())
        .with("start", fmt_time(window.0))
        .with("end", fmt_time(window.1))
}

pub async fn proposer_data(
    warehouse: &WarehouseClient,
    network: &str,
    slot: u64,
    window: (DateTime<Utc>, DateTime<Utc>),
) -> Result<ProposerRow> {
    let sql = "SELECT slot, proposer_pubkey, proposer_validator_index \
         FROM default.beacon_api_eth_v1_proposer_duty FINAL \
         WHERE slot = {slot: UInt64} \
           AND slot_start_date_time BETWEEN toDateTime({start: String}) AND toDateTime({end: String}) \
           AND meta_network_name = {network: String} \
         GROUP BY slot, proposer_pubkey, proposer_validator_index \
         LIMIT 1";
    let params = slot_window_params(network, slot, window);
    let rows: Vec<ProposerRow> = warehouse.query(sql, &params).await?;
    rows.into_iter()
        .next()
        .ok_or_else(|| LabError::not_found(format!("no proposer data for slot {slot}")))
}

pub async fn block_data(
    warehouse: &WarehouseClient,
    network: &str,
    slot: u64,
    window: (DateTime<Utc>, DateTime<Utc>),
) -> Result<BlockRow> {
    let sql = "SELECT slot, slot_start_date_time, epoch, epoch_start_date_time, block_root, \
            block_version, block_total_bytes, block_total_bytes_compressed, parent_root, \
            state_root, proposer_index, eth1_data_block_hash, eth1_data_deposit_root, \
            execution_payload_block_hash, execution_payload_block_number, \
            execution_payload_fee_recipient, execution_payload_base_fee_per_gas, \
            execution_payload_blob_gas_used, execution_payload_excess_blob_gas, \
            execution_payload_gas_limit, execution_payload_gas_used, \
            execution_payload_state_root, execution_payload_parent_hash, \
            execution_payload_transactions_count, execution_payload_transactions_total_bytes, \
            execution_payload_transactions_total_bytes_compressed \
         FROM default.beacon_api_eth_v2_beacon_block FINAL \
         WHERE slot = {slot: UInt64} \
           AND slot_start_date_time BETWEEN toDateTime({start: String}) AND toDateTime({end: String}) \
           AND meta_network_name = {network: String} \
         LIMIT 1";
    let params = slot_window_params(network, slot, window);
    let rows: Vec<BlockRow> = warehouse.query(sql, &params).await?;
    rows.into_iter()
        .next()
        .ok_or_else(|| LabError::not_found(format!("no block data for slot {slot}")))
}

pub async fn proposer_entity(
    warehouse: &WarehouseClient,
    network: &str,
    validator_index: u64,
) -> Result<Option<String>> {
    let sql = "SELECT entity FROM default.ethseer_validator_entity FINAL \
         WHERE index = {validator_index: UInt64} AND meta_network_name = {network: String} \
         GROUP BY entity LIMIT 1";
    let params = Params::new()
        .with("validator_index", validator_index)
        .with("network", network.to_string());
    let rows: Vec<EntityRow> = warehouse.query(sql, &params).await?;
    Ok(rows.into_iter().next().map(|r| r.entity))
}

/// API-observed block-seen timing, deduplicated per client by earliest
/// `event_date_time`.
///
/// The reference query unions two identically-filtered CTEs
/// (`api_events`, `head_events`) before deduplicating — an artifact of
/// the query having grown two near-identical event sources over time.
/// Both CTEs read the same table with the same predicate, so the union
/// contributes nothing beyond doubling the row count ahead of the
/// `ROW_NUMBER()` dedup; this collapses them into one source.
pub async fn block_seen_at_slot_time(
    warehouse: &WarehouseClient,
    network: &str,
    slot: u64,
    window: (DateTime<Utc>, DateTime<Utc>),
) -> Result<Vec<SeenAtSlotTimeRow>> {
    let sql = "SELECT slot_time, meta_client_name, meta_client_geo_city, meta_client_geo_country, \
            meta_client_geo_continent_code \
         FROM ( \
             SELECT propagation_slot_start_diff as slot_time, meta_client_name, \
                    meta_client_geo_city, meta_client_geo_country, meta_client_geo_continent_code, \
                    event_date_time, \
                    ROW_NUMBER() OVER (PARTITION BY meta_client_name ORDER BY event_date_time ASC) as rn \
             FROM default.beacon_api_eth_v1_events_block FINAL \
             WHERE slot = {slot: UInt64} \
               AND meta_network_name = {network: String} \
               AND slot_start_date_time BETWEEN toDateTime({start: String}) AND toDateTime({end: String}) \
         ) t \
         WHERE rn = 1 \
         ORDER BY event_date_time ASC";
    let params = slot_window_params(network, slot, window);
    warehouse.query(sql, &params).await
}

pub async fn block_first_seen_in_p2p_slot_time(
    warehouse: &WarehouseClient,
    network: &str,
    slot: u64,
    window: (DateTime<Utc>, DateTime<Utc>),
) -> Result<Vec<SeenAtSlotTimeRow>> {
    let sql = "SELECT propagation_slot_start_diff as slot_time, meta_client_name, \
            meta_client_geo_city, meta_client_geo_country, meta_client_geo_continent_code \
         FROM ( \
             SELECT *, ROW_NUMBER() OVER (PARTITION BY meta_client_name ORDER BY event_date_time ASC) as rn \
             FROM default.libp2p_gossipsub_beacon_block FINAL \
             WHERE slot = {slot: UInt64} \
               AND meta_network_name = {network: String} \
               AND slot_start_date_time BETWEEN toDateTime({start: String}) AND toDateTime({end: String}) \
         ) t \
         WHERE rn = 1 \
         ORDER BY event_date_time ASC";
    let params = slot_window_params(network, slot, window);
    warehouse.query(sql, &params).await
}

pub async fn blob_seen_at_slot_time(
    warehouse: &WarehouseClient,
    network: &str,
    slot: u64,
    window: (DateTime<Utc>, DateTime<Utc>),
) -> Result<Vec<BlobSeenAtSlotTimeRow>> {
    let sql = "SELECT propagation_slot_start_diff as slot_time, meta_client_name, \
            meta_client_geo_city, meta_client_geo_country, meta_client_geo_continent_code, blob_index \
         FROM ( \
             SELECT *, ROW_NUMBER() OVER (PARTITION BY meta_client_name, blob_index ORDER BY event_date_time ASC) as rn \
             FROM default.beacon_api_eth_v1_events_blob_sidecar FINAL \
             WHERE slot = {slot: UInt64} \
               AND meta_network_name = {network: String} \
               AND slot_start_date_time BETWEEN toDateTime({start: String}) AND toDateTime({end: String}) \
         ) t \
         WHERE rn = 1 \
         ORDER BY event_date_time ASC";
    let params = slot_window_params(network, slot, window);
    warehouse.query(sql, &params).await
}

pub async fn blob_first_seen_in_p2p_slot_time(
    warehouse: &WarehouseClient,
    network: &str,
    slot: u64,
    window: (DateTime<Utc>, DateTime<Utc>),
) -> Result<Vec<BlobSeenAtSlotTimeRow>> {
    let sql = "SELECT propagation_slot_start_diff as slot_time, meta_client_name, \
            meta_client_geo_city, meta_client_geo_country, meta_client_geo_continent_code, blob_index \
         FROM ( \
             SELECT *, ROW_NUMBER() OVER (PARTITION BY meta_client_name, blob_index ORDER BY event_date_time ASC) as rn \
             FROM default.libp2p_gossipsub_blob_sidecar FINAL \
             WHERE slot = {slot: UInt64} \
               AND meta_network_name = {network: String} \
               AND slot_start_date_time BETWEEN toDateTime({start: String}) AND toDateTime({end: String}) \
         ) t \
         WHERE rn = 1 \
         ORDER BY event_date_time ASC";
    let params = slot_window_params(network, slot, window);
    warehouse.query(sql, &params).await
}

pub async fn maximum_attestation_votes(
    warehouse: &WarehouseClient,
    network: &str,
    slot: u64,
    window: (DateTime<Utc>, DateTime<Utc>),
) -> Result<u64> {
    let sql = "SELECT MAX(committee_size * (CAST(committee_index AS UInt32) + 1)) as max_attestations \
         FROM ( \
             SELECT length(validators) as committee_size, committee_index \
             FROM default.beacon_api_eth_v1_beacon_committee FINAL \
             WHERE slot = {slot: UInt64} \
               AND meta_network_name = {network: String} \
               AND slot_start_date_time BETWEEN toDateTime({start: String}) AND toDateTime({end: String}) \
         )";
    let params = slot_window_params(network, slot, window);
    let rows: Vec<MaxAttestationsRow> = warehouse.query(sql, &params).await?;
    Ok(rows.into_iter().next().and_then(|r| r.max_attestations).unwrap_or(0))
}

/// Attestation propagation times, using the *exact* slot window (no ±15
/// minute grace) since attestation timing must stay precise. Drops any
/// observation later than 12s into the slot, same as the reference
/// query.
pub async fn attestation_votes(
    warehouse: &WarehouseClient,
    network: &str,
    slot: u64,
    block_root: &str,
    exact_window: (DateTime<Utc>, DateTime<Utc>),
) -> Result<Vec<(u64, i64)>> {
    let sql = "WITH \
         raw_data AS ( \
             SELECT attesting_validator_index, MIN(propagation_slot_start_diff) as min_propagation_time \
             FROM default.beacon_api_eth_v1_events_attestation \
             WHERE slot = {slot: UInt64} \
               AND meta_network_name = {network: String} \
               AND slot_start_date_time BETWEEN toDateTime({start: String}) AND toDateTime({end: String}) \
               AND beacon_block_root = {block_root: String} \
               AND attesting_validator_index IS NOT NULL \
               AND propagation_slot_start_diff <= 12000 \
             GROUP BY attesting_validator_index \
         ), \
         floor_time AS ( \
             SELECT MIN(min_propagation_time) as floor_time FROM raw_data \
         ) \
         SELECT attesting_validator_index, \
                FLOOR((min_propagation_time - floor_time) / 50) * 50 + floor_time as min_propagation_time \
         FROM raw_data, floor_time";
    let params = slot_window_params(network, slot, exact_window).with("block_root", block_root.to_string());
    let rows: Vec<AttestationVoteRow> = warehouse.query(sql, &params).await?;
    Ok(rows
        .into_iter()
        .map(|r| (r.attesting_validator_index, r.min_propagation_time))
        .collect())
}

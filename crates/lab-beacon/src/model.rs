//! Row shapes returned by the warehouse and the published slot artifact
//! assembled from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Row, Deserialize)]
pub struct ProposerRow {
    pub slot: u64,
    pub proposer_pubkey: String,
    pub proposer_validator_index: u64,
}

#[derive(Debug, Clone, Row, Deserialize)]
pub struct BlockRow {
    pub slot: u64,
    pub slot_start_date_time: DateTime<Utc>,
    pub epoch: u64,
    pub epoch_start_date_time: DateTime<Utc>,
    pub block_root: String,
    pub block_version: String,
    pub block_total_bytes: Option<u64>,
    pub block_total_bytes_compressed: Option<u64>,
    pub parent_root: String,
    pub state_root: String,
    pub proposer_index: u64,
    pub eth1_data_block_hash: String,
    pub eth1_data_deposit_root: String,
    pub execution_payload_block_hash: String,
    pub execution_payload_block_number: u64,
    pub execution_payload_fee_recipient: String,
    pub execution_payload_base_fee_per_gas: Option<u128>,
    pub execution_payload_blob_gas_used: Option<u64>,
    pub execution_payload_excess_blob_gas: Option<u64>,
    pub execution_payload_gas_limit: Option<u64>,
    pub execution_payload_gas_used: Option<u64>,
    pub execution_payload_state_root: String,
    pub execution_payload_parent_hash: String,
    pub execution_payload_transactions_count: Option<u64>,
    pub execution_payload_transactions_total_bytes: Option<u64>,
    pub execution_payload_transactions_total_bytes_compressed: Option<u64>,
}

#[derive(Debug, Clone, Row, Deserialize)]
pub struct SeenAtSlotTimeRow {
    pub slot_time_ms: i64,
    pub meta_client_name: String,
    pub meta_client_geo_city: String,
    pub meta_client_geo_country: String,
    pub meta_client_geo_continent_code: String,
}

#[derive(Debug, Clone, Row, Deserialize)]
pub struct BlobSeenAtSlotTimeRow {
    pub slot_time_ms: i64,
    pub blob_index: u64,
    pub meta_client_name: String,
    pub meta_client_geo_city: String,
    pub meta_client_geo_country: String,
    pub meta_client_geo_continent_code: String,
}

#[derive(Debug, Clone, Row, Deserialize)]
pub struct AttestationVoteRow {
    pub attesting_validator_index: u64,
    pub min_propagation_time: i64,
}

#[derive(Debug, Clone, Row, Deserialize)]
pub struct EntityRow {
    pub entity: String,
}

#[derive(Debug, Clone, Row, Deserialize)]
pub struct MaxAttestationsRow {
    pub max_attestations: Option<u64>,
}

/// One client's view into a slot, keyed by `meta_client_name` in
/// [`SlotArtifact::nodes`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Geo {
    pub city: String,
    pub country: String,
    pub continent: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub name: String,
    pub username: String,
    pub geo: Geo,
}

/// "ethpandaops" if the client name contains that token, else the second
/// `/`-delimited segment, else empty.
pub fn extract_username(name: &str) -> String {
    if name.contains("ethpandaops") {
        return "ethpandaops".to_string();
    }
    name.splitn(3, '/').nth(1).unwrap_or("").to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttestationWindow {
    pub start_ms: i64,
    pub end_ms: i64,
    pub validator_indices: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attestations {
    pub maximum_votes: u64,
    pub windows: Vec<AttestationWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposer {
    pub slot: u64,
    pub pubkey: String,
    pub validator_index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timings {
    pub block_seen: BTreeMap<String, i64>,
    pub blob_seen: BTreeMap<String, BTreeMap<u64, i64>>,
    pub block_first_seen_p2p: BTreeMap<String, i64>,
    pub blob_first_seen_p2p: BTreeMap<String, BTreeMap<u64, i64>>,
}

/// The compact, self-contained artifact published for one (network,
/// slot), one-to-one with the reference `OptimizedSlotData`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotArtifact {
    pub slot: u64,
    pub network: String,
    pub processed_at: DateTime<Utc>,
    pub processing_time_ms: i64,
    pub block: BlockRow,
    pub proposer: Proposer,
    pub entity: Option<String>,
    pub nodes: BTreeMap<String, Node>,
    pub timings: Timings,
    pub attestations: Attestations,
}

/// Buckets `{validator_index -> min_propagation_ms}` into 50ms windows
/// anchored to the floor of the earliest observed time across all
/// validators, deduplicating and sorting indices within each bucket.
///
/// This mirrors the SQL-computed bucketing in `get_attestation_votes`
/// (floor anchored at the batch minimum), not the standalone
/// absolute-modulo-50 bucketing found elsewhere in the reference
/// implementation's pure-Python transform path; the two diverge whenever
/// the earliest vote isn't itself a multiple of 50ms.
pub fn bucket_attestation_votes(votes: &[(u64, i64)]) -> Vec<AttestationWindow> {
    let Some(floor_time) = votes.iter().map(|(_, t)| *t).min() else {
        return Vec::new();
    };

    let mut buckets: BTreeMap<i64, Vec<u64>> = BTreeMap::new();
    for (validator_index, time_ms) in votes {
        let bucket_start = ((time_ms - floor_time) / 50) * 50 + floor_time;
        buckets.entry(bucket_start).or_default().push(*validator_index);
    }

    buckets
        .into_iter()
        .map(|(start_ms, mut indices)| {
            indices.sort_unstable();
            indices.dedup();
            AttestationWindow {
                start_ms,
                end_ms: start_ms + 50,
                validator_indices: indices,
            }
        })
        .collect()
}

pub fn build_node_map(
    geocoder: &lab_core::geo::Geocoder,
    block_seen: &[SeenAtSlotTimeRow],
    blob_seen: &[BlobSeenAtSlotTimeRow],
    block_p2p: &[SeenAtSlotTimeRow],
    blob_p2p: &[BlobSeenAtSlotTimeRow],
) -> BTreeMap<String, Node> {
    let mut nodes: BTreeMap<String, Node> = BTreeMap::new();

    let mut add = |name: &str, city: &str, country: &str, continent: &str| {
        nodes.entry(name.to_string()).or_insert_with(|| {
            let coords = geocoder.resolve(
                (!city.is_empty()).then_some(city),
                (!country.is_empty()).then_some(country),
                (!continent.is_empty()).then_some(continent),
            );
            Node {
                name: name.to_string(),
                username: extract_username(name),
                geo: Geo {
                    city: city.to_string(),
                    country: country.to_string(),
                    continent: continent.to_string(),
                    latitude: coords.map(|c| c.lat),
                    longitude: coords.map(|c| c.lon),
                },
            }
        });
    };

    for row in block_seen {
        add(
            &row.meta_client_name,
            &row.meta_client_geo_city,
            &row.meta_client_geo_country,
            &row.meta_client_geo_continent_code,
        );
    }
    for row in blob_seen {
        add(
            &row.meta_client_name,
            &row.meta_client_geo_city,
            &row.meta_client_geo_country,
            &row.meta_client_geo_continent_code,
        );
    }
    for row in block_p2p {
        add(
            &row.meta_client_name,
            &row.meta_client_geo_city,
            &row.meta_client_geo_country,
            &row.meta_client_geo_continent_code,
        );
    }
    for row in blob_p2p {
        add(
            &row.meta_client_name,
            &row.meta_client_geo_city,
            &row.meta_client_geo_country,
            &row.meta_client_geo_continent_code,
        );
    }

    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_prefers_ethpandaops_token() {
        assert_eq!(extract_username("pub/ethpandaops/lighthouse-1"), "ethpandaops");
    }

    #[test]
    fn username_falls_back_to_second_segment() {
        assert_eq!(extract_username("pub/alice/lighthouse-1"), "alice");
    }

    #[test]
    fn username_empty_without_second_segment() {
        assert_eq!(extract_username("standalone"), "");
    }

    #[test]
    fn attestation_votes_bucket_by_floor_of_minimum() {
        // earliest vote at 1234ms: floor anchor is 1234, not a multiple of 50
        let votes = vec![(1, 1234), (2, 1260), (3, 1284), (4, 1400)];
        let windows = bucket_attestation_votes(&votes);

        // bucket 0: [1234, 1284) contains 1234, 1260 (1260-1234=26 -> /50=0)
        assert_eq!(windows[0].start_ms, 1234);
        assert_eq!(windows[0].end_ms, 1284);
        assert_eq!(windows[0].validator_indices, vec![1, 2]);

        // 1284 - 1234 = 50 -> bucket 1284
        assert_eq!(windows[1].start_ms, 1284);
        assert_eq!(windows[1].validator_indices, vec![3]);
    }

    #[test]
    fn attestation_votes_dedup_and_sort_within_bucket() {
        let votes = vec![(5, 100), (3, 100), (3, 105), (1, 102)];
        let windows = bucket_attestation_votes(&votes);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].validator_indices, vec![1, 3, 5]);
    }

    #[test]
    fn empty_votes_produce_no_windows() {
        assert!(bucket_attestation_votes(&[]).is_empty());
    }
}

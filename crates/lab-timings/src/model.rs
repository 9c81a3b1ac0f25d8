//! Row and artifact shapes for the block-propagation timings summary.

use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Row, Deserialize)]
pub struct PropagationSummaryRow {
    pub meta_client_name: String,
    pub avg_propagation_ms: f64,
    pub min_propagation_ms: i64,
    pub max_propagation_ms: i64,
    pub sample_count: u64,
}

/// One time-window's worth of per-client propagation stats, published
/// under `beacon_chain_timings/<network>/<window>/summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingsSummary {
    pub network: String,
    pub window: String,
    pub generated_at: DateTime<Utc>,
    pub clients: Vec<PropagationSummaryRow>,
}

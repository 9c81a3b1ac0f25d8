//! Row and artifact shapes for the public-contributor summary.

use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Row, Deserialize)]
pub struct ContributorCountRow {
    pub meta_consensus_implementation: String,
    pub meta_client_geo_country: String,
    pub contributor_count: u64,
}

/// One time-window's worth of public contributor counts by client and
/// country, published under
/// `xatu_public_contributors/<network>/<window>/summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributorSummary {
    pub network: String,
    pub window: String,
    pub generated_at: DateTime<Utc>,
    pub contributors: Vec<ContributorCountRow>,
}

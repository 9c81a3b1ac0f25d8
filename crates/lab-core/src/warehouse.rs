//! Read-only warehouse access.
//!
//! The reference implementation runs its warehouse queries through a
//! thread-pool-backed SQL engine because its driver is synchronous; the
//! `clickhouse` crate talks the native ClickHouse wire protocol directly
//! over `hyper`, so there is no blocking call to shell out to
//! `spawn_blocking` for here — every query is `async` all the way down.

use clickhouse::Row;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::ClickHouseConfig;
use crate::error::{LabError, Result};

/// Named bindings for a query, substituted server-side into `{name: Type}`
/// placeholders in the SQL text — the Rust equivalent of the reference
/// implementation's SQLAlchemy `text(sql).bindparams(**params)` call.
/// Values are rendered with `Display`, matching how the `clickhouse`
/// crate's own `Query::param` expects its argument.
#[derive(Debug, Default, Clone)]
pub struct Params(Vec<(&'static str, String)>);

impl Params {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with(mut self, name: &'static str, value: impl std::fmt::Display) -> Self {
        self.0.push((name, value.to_string()));
        self
    }
}

/// Thin wrapper over the `clickhouse` crate's native async client.
///
/// Held as a concrete type rather than a trait object: query methods are
/// generic over the row type, which the `dyn`-safety rules don't allow
/// on a trait. Modules hold this behind an `Arc` instead.
pub struct WarehouseClient {
    client: clickhouse::Client,
}

impl WarehouseClient {
    pub fn new(config: &ClickHouseConfig) -> Self {
        let client = clickhouse::Client::default().with_url(&config.url);
        Self { client }
    }

    pub async fn start(&self) -> Result<()> {
        info!("starting clickhouse client");
        self.client
            .query("SELECT 1")
            .fetch_all::<u8>()
            .await
            .map_err(|e| LabError::Transient(e.to_string()))?;
        info!("successfully connected to clickhouse");
        Ok(())
    }

    pub async fn stop(&self) {
        info!("stopping clickhouse client");
    }

    /// Runs `sql` with `params` bound as named query parameters (ClickHouse's
    /// `{name: Type}` substitution), never by splicing values into the SQL
    /// text.
    pub async fn query<T>(&self, sql: &str, params: &Params) -> Result<Vec<T>>
    where
        T: Row + DeserializeOwned + Send + 'static,
    {
        debug!(sql, "executing warehouse query");
        let mut query = self.client.query(sql);
        for (name, value) in &params.0 {
            query = query.param(*name, value);
        }
        query
            .fetch_all::<T>()
            .await
            .map_err(|e| LabError::Transient(e.to_string()))
    }
}

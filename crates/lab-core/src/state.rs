//! Durable per-module key/value state, persisted as a single shared
//! `state.json` object with one sub-map per module name.
//!
//! Mirrors the reference state manager: state lives in memory behind a
//! mutex, is loaded once on start, flushed periodically, and flushed once
//! more on stop. Every flush re-reads the shared object first so modules
//! that flush concurrently don't clobber each other's sub-maps.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{LabError, Result};
use crate::storage::ObjectStore;

const STATE_KEY: &str = "state.json";
const FLUSH_INTERVAL: StdDuration = StdDuration::from_secs(60);

pub struct StateStore {
    name: String,
    storage: Arc<dyn ObjectStore>,
    state: Mutex<HashMap<String, Value>>,
    cancel: CancellationToken,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl StateStore {
    pub fn new(name: impl Into<String>, storage: Arc<dyn ObjectStore>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            storage,
            state: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            flush_task: Mutex::new(None),
        })
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        info!(module = %self.name, "starting state store");

        match self.storage.get(STATE_KEY).await {
            Ok(bytes) => {
                let full_state: HashMap<String, Value> = serde_json::from_slice(&bytes)
                    .map_err(|e| LabError::data_integrity(e.to_string()))?;
                let mine = full_state
                    .get(&self.name)
                    .and_then(|v| v.as_object())
                    .map(|m| m.clone().into_iter().collect())
                    .unwrap_or_default();
                *self.state.lock().await = mine;
                info!(module = %self.name, "loaded existing state");
            }
            Err(LabError::NotFound(_)) => {
                info!(module = %self.name, "no existing state found, creating empty state file");
                let mut empty: HashMap<String, Value> = HashMap::new();
                empty.insert(self.name.clone(), Value::Object(Default::default()));
                let bytes = serde_json::to_vec(&empty).map_err(|e| LabError::Other(e.into()))?;
                self.storage.put_atomic(STATE_KEY, bytes, None).await?;
            }
            Err(e) => {
                error!(module = %self.name, error = %e, "failed to initialize state");
                return Err(e);
            }
        }

        let this = self.clone();
        let handle = tokio::spawn(async move { this.flush_loop().await });
        *self.flush_task.lock().await = Some(handle);

        info!(module = %self.name, "started state store");
        Ok(())
    }

    pub async fn stop(self: &Arc<Self>) {
        info!(module = %self.name, "stopping state store");
        self.cancel.cancel();
        if let Some(handle) = self.flush_task.lock().await.take() {
            let _ = handle.await;
        }

        if let Err(e) = self.flush().await {
            error!(module = %self.name, error = %e, "failed to flush state on shutdown");
        } else {
            info!(module = %self.name, "final state flush complete");
        }
    }

    pub async fn flush(self: &Arc<Self>) -> Result<()> {
        self.write_state().await
    }

    async fn write_state(&self) -> Result<()> {
        let mut full_state: HashMap<String, Value> = match self.storage.get(STATE_KEY).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => {
                debug!(module = %self.name, "no existing state found, creating new state file");
                HashMap::new()
            }
        };

        let mine = self.state.lock().await.clone();
        full_state.insert(self.name.clone(), serde_json::to_value(mine).unwrap());

        let bytes = serde_json::to_vec(&full_state).map_err(|e| LabError::Other(e.into()))?;
        self.storage.put_atomic(STATE_KEY, bytes, None).await
    }

    async fn flush_loop(self: Arc<Self>) {
        debug!(module = %self.name, interval_secs = FLUSH_INTERVAL.as_secs(), "starting flush loop");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(FLUSH_INTERVAL) => {
                    if let Err(e) = self.write_state().await {
                        error!(module = %self.name, error = %e, "failed to flush state");
                    } else {
                        debug!(module = %self.name, "flushed state");
                    }
                }
            }
        }
    }

    pub async fn get(&self, key: &str) -> Result<Value> {
        self.state
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| LabError::not_found(key.to_string()))
    }

    pub async fn get_typed<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.get(key).await?;
        serde_json::from_value(value).map_err(|e| LabError::data_integrity(e.to_string()))
    }

    pub async fn set(&self, key: &str, value: impl serde::Serialize) -> Result<()> {
        debug!(key, "setting state value");
        let value = serde_json::to_value(value).map_err(|e| LabError::Other(e.into()))?;
        self.state.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    pub async fn delete(&self, key: &str) {
        debug!(key, "deleting state value");
        self.state.lock().await.remove(key);
    }

    pub async fn get_all(&self) -> HashMap<String, Value> {
        self.state.lock().await.clone()
    }

    pub async fn delete_all(&self) {
        self.state.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let storage = Arc::new(MemoryObjectStore::new());
        let store = StateStore::new("beacon", storage);
        store.start().await.unwrap();

        store.set("last_slot", 12345u64).await.unwrap();
        let value: u64 = store.get_typed("last_slot").await.unwrap();
        assert_eq!(value, 12345);

        store.stop().await;
    }

    #[tokio::test]
    async fn two_modules_do_not_clobber_each_others_state() {
        let storage: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let beacon = StateStore::new("beacon", storage.clone());
        let timings = StateStore::new("beacon_chain_timings", storage.clone());
        beacon.start().await.unwrap();
        timings.start().await.unwrap();

        beacon.set("x", 1u64).await.unwrap();
        timings.set("y", 2u64).await.unwrap();
        beacon.flush().await.unwrap();
        timings.flush().await.unwrap();

        let raw = storage.get("state.json").await.unwrap();
        let full: HashMap<String, serde_json::Value> = serde_json::from_slice(&raw).unwrap();
        assert!(full.contains_key("beacon"));
        assert!(full.contains_key("beacon_chain_timings"));

        beacon.stop().await;
        timings.stop().await;
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let storage = Arc::new(MemoryObjectStore::new());
        let store = StateStore::new("beacon", storage);
        store.start().await.unwrap();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, LabError::NotFound(_)));
        store.stop().await;
    }
}

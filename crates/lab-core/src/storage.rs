//! Object storage abstraction with an S3-backed implementation and a
//! local-filesystem stand-in for dev/test use.
//!
//! Everything written through [`ObjectStore`] is gzip-compressed at rest;
//! [`ObjectStore::get`] transparently decompresses on the way back out.
//! [`ObjectStore::put_atomic`] gives read-modify-write callers (notably
//! [`crate::state::StateStore`]) a publish that never exposes a
//! half-written object: write to a temp key, let it settle, copy into
//! place, delete the temp key.

use std::io::Read;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use flate2::Compression;
use flate2::read::{GzDecoder, GzEncoder};
use tracing::{debug, warn};

use crate::config::S3Config;
use crate::error::{LabError, Result};

pub const DEFAULT_STORE_CACHE: &str = "max-age=10800";
pub const DEFAULT_ATOMIC_CACHE: &str = "max-age=3600";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>, cache_control: Option<&str>) -> Result<()>;

    async fn put_atomic(&self, key: &str, data: Vec<u8>, cache_control: Option<&str>)
    -> Result<()>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;
}

fn content_type_for(key: &str) -> &'static str {
    if key.ends_with(".json") {
        "application/json"
    } else {
        "application/octet-stream"
    }
}

fn gzip(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(raw, Compression::default());
    let mut out = Vec::new();
    encoder
        .read_to_end(&mut out)
        .map_err(|e| LabError::Other(e.into()))?;
    Ok(out)
}

fn gunzip(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| LabError::Other(e.into()))?;
    Ok(out)
}

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn new(config: &S3Config) -> Result<Self> {
        debug!(endpoint = %config.endpoint, bucket = %config.bucket, "initializing S3 object store");
        let credentials = aws_sdk_s3::config::Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "lab-static-credentials",
        );
        let sdk_config = aws_config::SdkConfig::builder()
            .endpoint_url(&config.endpoint)
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .credentials_provider(aws_sdk_s3::config::SharedCredentialsProvider::new(
                credentials,
            ))
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .build();
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();
        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        })
    }

    async fn upload(&self, key: &str, data: Vec<u8>, cache_control: &str) -> Result<()> {
        let compressed = gzip(&data)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(compressed))
            .content_type(content_type_for(key))
            .content_encoding("gzip")
            .cache_control(cache_control)
            .send()
            .await
            .map_err(|e| LabError::Other(e.into()))?;
        Ok(())
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<()> {
        const MAX_ATTEMPTS: u32 = 5;
        let copy_source = format!("{}/{}", self.bucket, src_key);
        let policy = backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(StdDuration::from_secs(1))
            .with_multiplier(2.0)
            .with_max_elapsed_time(None)
            .build();

        let attempt = std::sync::atomic::AtomicU32::new(0);
        backoff::future::retry(policy, || async {
            let tries = attempt.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            self.client
                .copy_object()
                .bucket(&self.bucket)
                .copy_source(&copy_source)
                .key(dst_key)
                .content_type(content_type_for(dst_key))
                .content_encoding("gzip")
                .metadata_directive(aws_sdk_s3::types::MetadataDirective::Replace)
                .send()
                .await
                .map_err(|e| {
                    if tries >= MAX_ATTEMPTS {
                        warn!(src = src_key, dst = dst_key, error = %e, attempts = tries, "copy failed, giving up");
                        backoff::Error::permanent(e)
                    } else {
                        warn!(src = src_key, dst = dst_key, error = %e, attempts = tries, "copy failed, retrying");
                        backoff::Error::transient(e)
                    }
                })
        })
        .await
        .map_err(|e| LabError::Transient(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>, cache_control: Option<&str>) -> Result<()> {
        debug!(key, "storing object");
        self.upload(key, data, cache_control.unwrap_or(DEFAULT_STORE_CACHE))
            .await
    }

    async fn put_atomic(
        &self,
        key: &str,
        data: Vec<u8>,
        cache_control: Option<&str>,
    ) -> Result<()> {
        let temp_key = format!("temp/{key}");
        debug!(key, temp_key = %temp_key, "starting atomic store");

        let result: Result<()> = async {
            self.upload(&temp_key, data, cache_control.unwrap_or(DEFAULT_ATOMIC_CACHE))
                .await?;
            tokio::time::sleep(StdDuration::from_secs(1)).await;
            self.copy(&temp_key, key).await?;
            self.delete(&temp_key).await?;
            Ok(())
        }
        .await;

        if result.is_err() {
            if let Err(cleanup_err) = self.delete(&temp_key).await {
                warn!(temp_key = %temp_key, error = %cleanup_err, "failed to clean up temp object after failed atomic store");
            }
        }

        result
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        debug!(key, "getting object");
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|s| s.is_no_such_key()) == Some(true) {
                    LabError::not_found(key.to_string())
                } else {
                    LabError::Other(e.into())
                }
            })?;

        let is_gzip = response.content_encoding().map(|e| e == "gzip").unwrap_or(false);
        let body = response
            .body
            .collect()
            .await
            .map_err(|e| LabError::Other(e.into()))?
            .into_bytes()
            .to_vec();

        if is_gzip { gunzip(&body) } else { Ok(body) }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        debug!(key, "deleting object");
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| LabError::Other(e.into()))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|s| s.is_not_found()) == Some(true) {
                    Ok(false)
                } else {
                    Err(LabError::Other(e.into()))
                }
            }
        }
    }
}

/// Local-filesystem object store for dev/test use (`--storage fs:<dir>`),
/// rooted at a directory on disk. Writes go to a sibling temp file first
/// and are renamed into place, since a same-filesystem rename is already
/// atomic — no copy-and-delete dance is needed the way it is for S3.
pub struct FsObjectStore {
    root: std::path::PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> std::path::PathBuf {
        self.root.join(key)
    }

    async fn write_atomically(&self, path: &std::path::Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LabError::Other(e.into()))?;
        }
        let tmp_path = path.with_extension(format!("tmp.{}", std::process::id()));
        tokio::fs::write(&tmp_path, data)
            .await
            .map_err(|e| LabError::Other(e.into()))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| LabError::Other(e.into()))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>, _cache_control: Option<&str>) -> Result<()> {
        debug!(key, "storing object on local filesystem");
        let compressed = gzip(&data)?;
        self.write_atomically(&self.path_for(key), &compressed).await
    }

    async fn put_atomic(
        &self,
        key: &str,
        data: Vec<u8>,
        cache_control: Option<&str>,
    ) -> Result<()> {
        // A same-filesystem rename is already atomic, so the temp-key
        // publish dance `S3ObjectStore` needs buys nothing extra here.
        self.put(key, data, cache_control).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        debug!(key, "getting object from local filesystem");
        let compressed = tokio::fs::read(self.path_for(key)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LabError::not_found(key.to_string())
            } else {
                LabError::Other(e.into())
            }
        })?;
        gunzip(&compressed)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        debug!(key, "deleting object from local filesystem");
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LabError::Other(e.into())),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key))
            .await
            .unwrap_or(false))
    }
}

/// In-memory object store used by tests; the gzip and atomic-publish
/// semantics mirror [`S3ObjectStore`] without needing a real bucket.
#[cfg(test)]
pub struct MemoryObjectStore {
    objects: tokio::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

#[cfg(test)]
impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>, _cache_control: Option<&str>) -> Result<()> {
        self.objects.lock().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn put_atomic(
        &self,
        key: &str,
        data: Vec<u8>,
        _cache_control: Option<&str>,
    ) -> Result<()> {
        self.objects.lock().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| LabError::not_found(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().await.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_round_trips() {
        let raw = b"hello world, this is a test payload".to_vec();
        let compressed = gzip(&raw).unwrap();
        assert_ne!(compressed, raw);
        let restored = gunzip(&compressed).unwrap();
        assert_eq!(restored, raw);
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("state.json"), "application/json");
        assert_eq!(content_type_for("slots/123.bin"), "application/octet-stream");
    }

    #[tokio::test]
    async fn memory_store_put_then_get() {
        let store = MemoryObjectStore::new();
        store.put("a.json", b"{}".to_vec(), None).await.unwrap();
        assert!(store.exists("a.json").await.unwrap());
        assert_eq!(store.get("a.json").await.unwrap(), b"{}".to_vec());
        store.delete("a.json").await.unwrap();
        assert!(!store.exists("a.json").await.unwrap());
    }

    #[tokio::test]
    async fn memory_store_get_missing_key_is_not_found() {
        let store = MemoryObjectStore::new();
        let err = store.get("missing").await.unwrap_err();
        assert!(matches!(err, LabError::NotFound(_)));
    }

    #[tokio::test]
    async fn fs_store_put_then_get_round_trips_through_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.put("a.json", b"{\"x\":1}".to_vec(), None).await.unwrap();
        assert!(store.exists("a.json").await.unwrap());
        assert_eq!(store.get("a.json").await.unwrap(), b"{\"x\":1}".to_vec());
        store.delete("a.json").await.unwrap();
        assert!(!store.exists("a.json").await.unwrap());
    }

    #[tokio::test]
    async fn fs_store_put_atomic_creates_nested_key_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store
            .put_atomic("beacon/mainnet/state.json", b"{}".to_vec(), None)
            .await
            .unwrap();
        assert!(store.exists("beacon/mainnet/state.json").await.unwrap());
    }

    #[tokio::test]
    async fn fs_store_get_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let err = store.get("missing.json").await.unwrap_err();
        assert!(matches!(err, LabError::NotFound(_)));
    }
}

//! Test utilities for session module tests

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::config::SessionConfig;
use crate::session::context::SessionContext;
use crate::storage::{CacheData, CacheStore, InMemoryCacheStore, StorageError};

/// Store whose backend is always down
pub(crate) struct FailingCacheStore;

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn init(&self) -> Result<(), StorageError> {
        Err(StorageError::Connection("Connection refused".to_string()))
    }

    async fn put_with_ttl(&self, _: &str, _: CacheData, _: u64) -> Result<(), StorageError> {
        Err(StorageError::Connection("Connection refused".to_string()))
    }

    async fn get(&self, _: &str) -> Result<Option<CacheData>, StorageError> {
        Err(StorageError::Connection("Connection refused".to_string()))
    }

    async fn remove(&self, _: &str) -> Result<(), StorageError> {
        Err(StorageError::Connection("Connection refused".to_string()))
    }
}

/// In-memory store that logs every call and can be told to fail reads or writes
pub(crate) struct RecordingCacheStore {
    inner: InMemoryCacheStore,
    calls: Mutex<Vec<String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl RecordingCacheStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: InMemoryCacheStore::new(),
            calls: Mutex::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    /// Number of recorded calls starting with `op` (e.g. "put", "remove")
    pub(crate) async fn count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .count()
    }

    pub(crate) async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    /// Write raw bytes directly, bypassing the session layer
    pub(crate) async fn insert_raw(&self, key: &str, bytes: Vec<u8>) {
        self.inner
            .put_with_ttl(key, CacheData::from(bytes), 3600)
            .await
            .expect("in-memory put failed");
    }

    pub(crate) async fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner
            .get(key)
            .await
            .expect("in-memory get failed")
            .map(|d| d.value)
    }

    fn down() -> StorageError {
        StorageError::Connection("Connection refused".to_string())
    }
}

#[async_trait]
impl CacheStore for RecordingCacheStore {
    async fn init(&self) -> Result<(), StorageError> {
        self.calls.lock().await.push("init".to_string());
        self.inner.init().await
    }

    async fn put_with_ttl(&self, key: &str, value: CacheData, ttl: u64) -> Result<(), StorageError> {
        self.calls.lock().await.push(format!("put {key} ttl={ttl}"));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::down());
        }
        self.inner.put_with_ttl(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<CacheData>, StorageError> {
        self.calls.lock().await.push(format!("get {key}"));
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::down());
        }
        self.inner.get(key).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.calls.lock().await.push(format!("remove {key}"));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::down());
        }
        self.inner.remove(key).await
    }
}

/// Context over a fresh recording store with default configuration
pub(crate) fn recording_context() -> (Arc<SessionContext>, Arc<RecordingCacheStore>) {
    recording_context_with(SessionConfig::default())
}

pub(crate) fn recording_context_with(
    config: SessionConfig,
) -> (Arc<SessionContext>, Arc<RecordingCacheStore>) {
    let cache = Arc::new(RecordingCacheStore::new());
    let context = SessionContext::with_cache_store(config, cache.clone());
    (context, cache)
}

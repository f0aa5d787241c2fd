use std::sync::Arc;

use crate::config::SessionConfig;
use crate::session::codec::SessionSerializer;
use crate::session::errors::SessionError;
use crate::session::store::SessionStore;
use crate::storage::{CacheStore, build_cache_store};

/// Process-wide session settings and the shared store connection.
///
/// Built once at startup and passed by `Arc` to every request's
/// [`SessionLifecycleManager`](crate::SessionLifecycleManager).
#[derive(Debug)]
pub struct SessionContext {
    config: SessionConfig,
    store: SessionStore,
    serializer: SessionSerializer,
}

impl SessionContext {
    /// Build a context whose store is chosen by `config.store`.
    pub fn new(config: SessionConfig) -> Result<Arc<Self>, SessionError> {
        let cache = build_cache_store(&config.store)?;
        Ok(Self::with_cache_store(config, cache))
    }

    /// Build a context around an existing store, e.g. a fake in tests.
    pub fn with_cache_store(config: SessionConfig, cache: Arc<dyn CacheStore>) -> Arc<Self> {
        let store = SessionStore::new(cache, config.key_prefix.clone());
        let serializer = SessionSerializer::new(config.payload_format);
        Arc::new(Self {
            config,
            store,
            serializer,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn serializer(&self) -> SessionSerializer {
        self.serializer
    }

    /// Open the store connection. Only the first successful call connects.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.store.connect().await
    }
}

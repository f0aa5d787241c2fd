use std::sync::Arc;

use crate::session::errors::SessionError;
use crate::session::types::{SessionId, StoredPayload};
use crate::storage::CacheStore;

/// Session-level view of a [`CacheStore`]: every key is `<prefix>:<session id>`.
///
/// Each call is a single round trip to the backend; nothing is cached locally.
#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn CacheStore>,
    prefix: String,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn CacheStore>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, id: &SessionId) -> String {
        format!("{}:{}", self.prefix, id)
    }

    /// Connect the underlying store. Safe to call repeatedly.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.cache.init().await?;
        Ok(())
    }

    /// Fetch the stored bytes for `id`. A miss is `Ok(None)`; backend failures are
    /// `StoreUnavailable` and left to the caller to degrade.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub async fn load(&self, id: &SessionId) -> Result<Option<StoredPayload>, SessionError> {
        let data = self.cache.get(&self.key(id)).await?;
        tracing::trace!(hit = data.is_some(), "Session lookup");
        Ok(data.map(StoredPayload::from))
    }

    /// Overwrite the stored bytes and restart their TTL.
    #[tracing::instrument(skip(self, payload), fields(id = %id, bytes = payload.as_bytes().len()))]
    pub async fn save(
        &self,
        id: &SessionId,
        payload: StoredPayload,
        ttl_seconds: u64,
    ) -> Result<(), SessionError> {
        self.cache
            .put_with_ttl(&self.key(id), payload.into(), ttl_seconds)
            .await?;
        Ok(())
    }

    /// Remove the stored session. Deleting a missing session succeeds.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub async fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        self.cache.remove(&self.key(id)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

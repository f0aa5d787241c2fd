use async_trait::async_trait;

use crate::session::codec::SessionSerializer;
use crate::session::errors::SessionError;
use crate::session::store::SessionStore;
use crate::session::types::{SessionId, SessionRecord};

/// Save handler a [`SessionHost`](crate::SessionHost) calls into while running a session.
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Called when the host starts a session.
    async fn open(&self, session_name: &str) -> Result<(), SessionError>;

    /// Called after the session has been written or destroyed.
    async fn close(&self) -> Result<(), SessionError>;

    /// Load the record for `id`. Unknown ids yield an empty record.
    async fn read(&self, id: &SessionId) -> Result<SessionRecord, SessionError>;

    /// Persist the record for `id`, refreshing its lifetime.
    async fn write(&self, id: &SessionId, record: &SessionRecord) -> Result<(), SessionError>;

    /// Drop the stored record for `id`.
    async fn destroy(&self, id: &SessionId) -> Result<(), SessionError>;

    /// Reap sessions idle for longer than `max_lifetime` seconds, returning how many went away.
    async fn gc(&self, max_lifetime: u64) -> Result<u64, SessionError>;
}

/// [`SessionHandler`] persisting records through a [`SessionStore`].
#[derive(Debug, Clone)]
pub struct StoreSessionHandler {
    store: SessionStore,
    serializer: SessionSerializer,
    lifetime: u64,
}

impl StoreSessionHandler {
    pub fn new(store: SessionStore, serializer: SessionSerializer, lifetime: u64) -> Self {
        Self {
            store,
            serializer,
            lifetime,
        }
    }

    pub fn lifetime(&self) -> u64 {
        self.lifetime
    }
}

#[async_trait]
impl SessionHandler for StoreSessionHandler {
    async fn open(&self, session_name: &str) -> Result<(), SessionError> {
        tracing::trace!("Opening session handler for {session_name}");
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        Ok(())
    }

    /// Never fails: a miss, an unreachable store and an undecodable payload all start the
    /// request with an empty record.
    async fn read(&self, id: &SessionId) -> Result<SessionRecord, SessionError> {
        let payload = match self.store.load(id).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                tracing::debug!("No stored session for {id}, starting empty");
                return Ok(SessionRecord::new());
            }
            Err(e) => {
                tracing::warn!("Session store unavailable while loading {id}, starting empty: {e}");
                return Ok(SessionRecord::new());
            }
        };

        match self.serializer.decode(payload.as_bytes()) {
            Ok(record) => Ok(record),
            Err(e) => {
                tracing::warn!("Discarding undecodable session {id}: {e}");
                Ok(SessionRecord::new())
            }
        }
    }

    async fn write(&self, id: &SessionId, record: &SessionRecord) -> Result<(), SessionError> {
        let payload = self.serializer.encode(record)?;
        self.store.save(id, payload, self.lifetime).await.map_err(|e| {
            tracing::error!("Failed to save session {id}: {e}");
            e
        })
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), SessionError> {
        self.store.delete(id).await.map_err(|e| {
            tracing::error!("Failed to delete session {id}: {e}");
            e
        })
    }

    /// Expiry is the store's job (every write sets a TTL), so there is never anything to reap.
    async fn gc(&self, max_lifetime: u64) -> Result<u64, SessionError> {
        tracing::trace!("Session gc requested for max_lifetime={max_lifetime}, left to store TTL");
        Ok(0)
    }
}

use http::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::session::context::SessionContext;
use crate::session::cookie::{CookieRewriter, CookieWarning, RewriteOutcome};
use crate::session::errors::SessionError;
use crate::session::handler::StoreSessionHandler;
use crate::session::host::SessionHost;
use crate::session::types::{SameSite, SessionId, SessionRecord, SessionState};

/// One session's life within one request.
///
/// ```text
/// Uninitialized --start--> Active --flush--> Flushed
///                            |
///                            +----destroy--> Destroyed
/// ```
///
/// Data operations only touch the in-memory [`SessionRecord`]; the store sees a single write
/// when the manager is flushed at the end of the request.
pub struct SessionLifecycleManager<H: SessionHost> {
    context: Arc<SessionContext>,
    host: H,
    rewriter: CookieRewriter,
    record: SessionRecord,
    state: SessionState,
    initialized: bool,
    same_site: SameSite,
    /// Last `Set-Cookie` value produced by the rewriter
    rewritten: Option<HeaderValue>,
    cookie_warnings: Vec<CookieWarning>,
}

impl<H: SessionHost> SessionLifecycleManager<H> {
    pub fn new(context: Arc<SessionContext>, host: H) -> Self {
        let rewriter = CookieRewriter::new(host.session_name());
        let same_site = context.config().same_site;
        Self {
            context,
            host,
            rewriter,
            record: SessionRecord::new(),
            state: SessionState::Uninitialized,
            initialized: false,
            same_site,
            rewritten: None,
            cookie_warnings: Vec::new(),
        }
    }

    /// Connect the store and register the save handler with the host. Repeated calls do
    /// nothing.
    ///
    /// A store that cannot be reached is not an error here: loads degrade to empty sessions
    /// and saves report the failure.
    pub async fn initialize(&mut self) -> Result<(), SessionError> {
        if matches!(self.state, SessionState::Flushed | SessionState::Destroyed) {
            return Err(self.misuse("initialize"));
        }
        if self.initialized {
            return Ok(());
        }

        if let Err(e) = self.context.connect().await {
            tracing::warn!("Session store not reachable yet: {e}");
        }

        let config = self.context.config();
        let handler = StoreSessionHandler::new(
            self.context.store().clone(),
            self.context.serializer(),
            config.lifetime,
        );
        if !self.host.register_handler(Arc::new(handler)) {
            tracing::debug!("Session handler already registered with the host");
        }

        self.initialized = true;
        Ok(())
    }

    /// Resume or create the session, then apply `same_site` to the session cookie.
    ///
    /// Does nothing if the session is already active.
    pub async fn start(&mut self, same_site: SameSite) -> Result<&SessionRecord, SessionError> {
        match self.state {
            SessionState::Active => {
                tracing::debug!("Session already active, start ignored");
                return Ok(&self.record);
            }
            SessionState::Flushed | SessionState::Destroyed => return Err(self.misuse("start")),
            SessionState::Uninitialized => {}
        }

        self.initialize().await?;
        self.same_site = same_site;
        self.record = self.host.start().await?;
        self.state = SessionState::Active;
        self.rewrite_cookie();
        Ok(&self.record)
    }

    /// [`start`](Self::start) with the configured `SameSite` restriction.
    pub async fn start_default(&mut self) -> Result<&SessionRecord, SessionError> {
        let same_site = self.context.config().same_site;
        self.start(same_site).await
    }

    /// Value stored under `key`, or `default` when missing or `null`.
    pub fn get(&self, key: &str, default: Value) -> Result<Value, SessionError> {
        self.readable("get")?;
        Ok(present(self.record.get(key)).cloned().unwrap_or(default))
    }

    /// Value under `key` converted to `T`. `None` when missing or `null`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        self.readable("get")?;
        present(self.record.get(key))
            .map(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| SessionError::Serialization(format!("{key}: {e}")))
            })
            .transpose()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<(), SessionError> {
        self.writable("set")?;
        let value =
            serde_json::to_value(value).map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.record.insert(key, value);
        Ok(())
    }

    pub fn has(&self, key: &str) -> Result<bool, SessionError> {
        self.readable("has")?;
        Ok(present(self.record.get(key)).is_some())
    }

    pub fn delete(&mut self, key: &str) -> Result<(), SessionError> {
        self.writable("delete")?;
        self.record.remove(key);
        Ok(())
    }

    /// Remove `key` and return what it held, or `default` when missing or `null`.
    pub fn take(&mut self, key: &str, default: Value) -> Result<Value, SessionError> {
        self.writable("take")?;
        Ok(self
            .record
            .remove(key)
            .filter(|v| !v.is_null())
            .unwrap_or(default))
    }

    pub fn get_all(&self) -> Result<&SessionRecord, SessionError> {
        self.readable("get_all")?;
        Ok(&self.record)
    }

    pub fn replace_all(&mut self, record: SessionRecord) -> Result<(), SessionError> {
        self.writable("replace_all")?;
        self.record = record;
        Ok(())
    }

    pub fn id(&self) -> Result<SessionId, SessionError> {
        self.readable("read the id")?;
        self.host.id().cloned().ok_or_else(|| self.misuse("read the id"))
    }

    /// Rebind the session to `id`.
    ///
    /// Before `start` the id picks the session to load; while active it only changes where
    /// the record is saved, the record itself is kept.
    pub fn set_id(&mut self, id: SessionId) -> Result<(), SessionError> {
        if matches!(self.state, SessionState::Flushed | SessionState::Destroyed) {
            return Err(self.misuse("set the id"));
        }
        self.host.set_id(id);
        if self.state == SessionState::Active {
            self.rewrite_cookie();
        }
        Ok(())
    }

    /// Move the current record to a fresh id. With `delete_old` the previous id is removed
    /// from the store right away instead of expiring.
    pub async fn regenerate(&mut self, delete_old: bool) -> Result<SessionId, SessionError> {
        self.writable("regenerate")?;
        let id = self.host.regenerate_id(delete_old).await?;
        self.rewrite_cookie();
        Ok(id)
    }

    /// Clear the record, delete it from the store and end the session for good.
    ///
    /// Destroying twice is a no-op. If the store delete fails the record is already cleared
    /// and the session stays in its current state.
    pub async fn destroy(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Destroyed => {
                tracing::debug!("Session already destroyed");
                return Ok(());
            }
            SessionState::Uninitialized => return Err(self.misuse("destroy")),
            SessionState::Active | SessionState::Flushed => {}
        }

        self.record.clear();
        self.host.destroy().await?;
        self.state = SessionState::Destroyed;
        self.rewrite_cookie();
        tracing::debug!("Session destroyed");
        Ok(())
    }

    /// Write the record to the store once. Nothing happens unless the session is active.
    ///
    /// On failure the session stays active so the save can be retried.
    pub async fn flush(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            tracing::trace!("Nothing to flush while {}", self.state);
            return Ok(());
        }
        self.host.write_close(&self.record).await?;
        self.state = SessionState::Flushed;
        Ok(())
    }

    /// Ask the host to reap expired sessions. The store expires them by TTL, so this reports 0.
    pub async fn gc(&mut self) -> Result<u64, SessionError> {
        self.initialize().await?;
        self.host.gc().await
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn same_site(&self) -> SameSite {
        self.same_site
    }

    /// Diagnostics raised while rewriting the session cookie.
    pub fn cookie_warnings(&self) -> &[CookieWarning] {
        &self.cookie_warnings
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Response headers produced by the session so far, removed from the host.
    pub fn take_pending_headers(&mut self) -> HeaderMap {
        self.host.take_pending_headers()
    }

    fn rewrite_cookie(&mut self) {
        let headers = self.host.pending_headers_mut();
        if let (Some(done), Some(pending)) = (&self.rewritten, self.rewriter.pending(headers)) {
            if done == pending {
                tracing::trace!("Session cookie already rewritten");
                return;
            }
        }

        if let RewriteOutcome::Rewritten { header, warning } =
            self.rewriter.apply(headers, self.same_site)
        {
            self.rewritten = HeaderValue::from_str(&header).ok();
            self.cookie_warnings.extend(warning);
        }
    }

    fn readable(&self, operation: &'static str) -> Result<(), SessionError> {
        match self.state {
            SessionState::Active | SessionState::Flushed => Ok(()),
            _ => Err(self.misuse(operation)),
        }
    }

    fn writable(&self, operation: &'static str) -> Result<(), SessionError> {
        match self.state {
            SessionState::Active => Ok(()),
            _ => Err(self.misuse(operation)),
        }
    }

    fn misuse(&self, operation: &'static str) -> SessionError {
        let err = SessionError::InvalidState {
            operation,
            state: self.state,
        };
        tracing::error!("{err}");
        err
    }
}

impl<H: SessionHost> Drop for SessionLifecycleManager<H> {
    fn drop(&mut self) {
        if self.state == SessionState::Active {
            tracing::warn!("Session dropped while active; unsaved changes are lost");
        }
    }
}

impl<H: SessionHost + std::fmt::Debug> std::fmt::Debug for SessionLifecycleManager<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLifecycleManager")
            .field("host", &self.host)
            .field("state", &self.state)
            .field("keys", &self.record.len())
            .field("same_site", &self.same_site)
            .finish_non_exhaustive()
    }
}

/// `null` values count as absent.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

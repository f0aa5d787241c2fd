use async_trait::async_trait;
use headers::HeaderMapExt;
use http::header::{HeaderMap, HeaderValue, SET_COOKIE};
use std::sync::Arc;

use crate::config::CookieConfig;
use crate::session::errors::SessionError;
use crate::session::handler::SessionHandler;
use crate::session::types::{SessionId, SessionRecord, SessionState};

/// Whether the host currently runs a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    None,
    Active,
}

/// The session mechanism a [`SessionLifecycleManager`](crate::SessionLifecycleManager) drives.
///
/// A host owns the session id and the outgoing cookie; persistence goes through the registered
/// [`SessionHandler`].
#[async_trait]
pub trait SessionHost: Send + Sync {
    /// Name of the session cookie.
    fn session_name(&self) -> &str;

    /// Install the save handler. Returns `false` (and keeps the first one) if a handler is
    /// already registered.
    fn register_handler(&mut self, handler: Arc<dyn SessionHandler>) -> bool;

    fn has_handler(&self) -> bool;

    fn status(&self) -> HostStatus;

    /// Resume the session named by the request, or mint a new one, and load its record.
    async fn start(&mut self) -> Result<SessionRecord, SessionError>;

    fn id(&self) -> Option<&SessionId>;

    /// Bind the session to `id`. Takes effect for the next read and write.
    fn set_id(&mut self, id: SessionId);

    /// Move the running session to a fresh id, optionally deleting the stored record of the
    /// old one first.
    async fn regenerate_id(&mut self, delete_old: bool) -> Result<SessionId, SessionError>;

    /// Persist `record` under the current id and end the session.
    async fn write_close(&mut self, record: &SessionRecord) -> Result<(), SessionError>;

    /// Delete the stored record of the current id, ending the session if it is running.
    async fn destroy(&mut self) -> Result<(), SessionError>;

    async fn gc(&self) -> Result<u64, SessionError>;

    /// Headers to be added to the response, such as the session `Set-Cookie`.
    fn pending_headers(&self) -> &HeaderMap;

    fn pending_headers_mut(&mut self) -> &mut HeaderMap;

    /// Hand the pending headers over to the response, leaving none behind.
    fn take_pending_headers(&mut self) -> HeaderMap {
        std::mem::take(self.pending_headers_mut())
    }
}

/// [`SessionHost`] carrying the session id in an HTTP cookie.
pub struct HttpSessionHost {
    cookie: CookieConfig,
    lifetime: u64,
    inbound_id: Option<SessionId>,
    id: Option<SessionId>,
    status: HostStatus,
    handler: Option<Arc<dyn SessionHandler>>,
    headers: HeaderMap,
}

impl HttpSessionHost {
    /// Host for a request that carried no session cookie.
    pub fn new(cookie: CookieConfig, lifetime: u64) -> Self {
        Self {
            cookie,
            lifetime,
            inbound_id: None,
            id: None,
            status: HostStatus::None,
            handler: None,
            headers: HeaderMap::new(),
        }
    }

    /// Host resuming the session named by the request's `Cookie` header, if it names a
    /// well-formed id.
    pub fn from_request_headers(
        request_headers: &HeaderMap,
        cookie: CookieConfig,
        lifetime: u64,
    ) -> Self {
        let inbound_id = request_headers
            .typed_get::<headers::Cookie>()
            .and_then(|c| c.get(&cookie.name).map(str::to_string))
            .and_then(|raw| match SessionId::new(raw) {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::debug!("Ignoring inbound session cookie: {e}");
                    None
                }
            });

        Self {
            inbound_id,
            ..Self::new(cookie, lifetime)
        }
    }

    /// Id the request arrived with.
    pub fn inbound_id(&self) -> Option<&SessionId> {
        self.inbound_id.as_ref()
    }

    fn handler(&self, operation: &'static str) -> Result<Arc<dyn SessionHandler>, SessionError> {
        self.handler.clone().ok_or(SessionError::InvalidState {
            operation,
            state: SessionState::Uninitialized,
        })
    }

    fn require_active(&self, operation: &'static str) -> Result<SessionId, SessionError> {
        match (&self.status, &self.id) {
            (HostStatus::Active, Some(id)) => Ok(id.clone()),
            _ => Err(SessionError::InvalidState {
                operation,
                state: SessionState::Uninitialized,
            }),
        }
    }

    fn emit_cookie(&mut self, id: &SessionId) {
        let mut cookie = format!("{}={}; Path={}", self.cookie.name, id, self.cookie.path);
        if let Some(domain) = &self.cookie.domain {
            cookie.push_str(&format!("; Domain={domain}"));
        }
        if self.cookie.max_age > 0 {
            cookie.push_str(&format!("; Max-Age={}", self.cookie.max_age));
        }
        self.push_cookie(cookie);
    }

    fn emit_expired_cookie(&mut self) {
        let mut cookie = format!("{}=; Path={}", self.cookie.name, self.cookie.path);
        if let Some(domain) = &self.cookie.domain {
            cookie.push_str(&format!("; Domain={domain}"));
        }
        cookie.push_str("; Max-Age=0");
        self.push_cookie(cookie);
    }

    /// Replace any pending session cookie with `cookie`, keeping other `Set-Cookie` values.
    fn push_cookie(&mut self, mut cookie: String) {
        if self.cookie.secure {
            cookie.push_str("; Secure");
        }
        if self.cookie.http_only {
            cookie.push_str("; HttpOnly");
        }

        let value = match HeaderValue::from_str(&cookie) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Session cookie is not a valid header value: {e}");
                return;
            }
        };

        let prefix = format!("{}=", self.cookie.name);
        let others: Vec<HeaderValue> = self
            .headers
            .get_all(SET_COOKIE)
            .iter()
            .filter(|v| !v.as_bytes().starts_with(prefix.as_bytes()))
            .cloned()
            .collect();
        self.headers.remove(SET_COOKIE);
        for other in others {
            self.headers.append(SET_COOKIE, other);
        }
        self.headers.append(SET_COOKIE, value);
    }
}

impl std::fmt::Debug for HttpSessionHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSessionHost")
            .field("cookie", &self.cookie)
            .field("inbound_id", &self.inbound_id)
            .field("id", &self.id)
            .field("status", &self.status)
            .field("has_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionHost for HttpSessionHost {
    fn session_name(&self) -> &str {
        &self.cookie.name
    }

    fn register_handler(&mut self, handler: Arc<dyn SessionHandler>) -> bool {
        if self.handler.is_some() {
            return false;
        }
        self.handler = Some(handler);
        true
    }

    fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    fn status(&self) -> HostStatus {
        self.status
    }

    async fn start(&mut self) -> Result<SessionRecord, SessionError> {
        if self.status == HostStatus::Active {
            return Err(SessionError::InvalidState {
                operation: "start",
                state: SessionState::Active,
            });
        }
        let handler = self.handler("start")?;
        handler.open(&self.cookie.name).await?;

        let id = match self.id.clone().or_else(|| self.inbound_id.clone()) {
            Some(id) => id,
            None => SessionId::generate()?,
        };
        let record = handler.read(&id).await?;

        if self.inbound_id.as_ref() != Some(&id) {
            self.emit_cookie(&id);
        }
        tracing::debug!("Session {id} started with {} keys", record.len());
        self.id = Some(id);
        self.status = HostStatus::Active;
        Ok(record)
    }

    fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: SessionId) {
        if self.status == HostStatus::Active {
            self.emit_cookie(&id);
        }
        self.id = Some(id);
    }

    async fn regenerate_id(&mut self, delete_old: bool) -> Result<SessionId, SessionError> {
        let old = self.require_active("regenerate")?;
        if delete_old {
            self.handler("regenerate")?.destroy(&old).await?;
        }

        let id = SessionId::generate()?;
        self.emit_cookie(&id);
        tracing::debug!("Session id regenerated (old id deleted: {delete_old})");
        self.id = Some(id.clone());
        Ok(id)
    }

    async fn write_close(&mut self, record: &SessionRecord) -> Result<(), SessionError> {
        let id = self.require_active("write")?;
        let handler = self.handler("write")?;
        handler.write(&id, record).await?;
        handler.close().await?;
        self.status = HostStatus::None;
        Ok(())
    }

    async fn destroy(&mut self) -> Result<(), SessionError> {
        let id = self.id.clone().ok_or(SessionError::InvalidState {
            operation: "destroy",
            state: SessionState::Uninitialized,
        })?;
        let handler = self.handler("destroy")?;
        handler.destroy(&id).await?;
        if self.status == HostStatus::Active {
            handler.close().await?;
        }

        self.emit_expired_cookie();
        self.status = HostStatus::None;
        self.id = None;
        Ok(())
    }

    async fn gc(&self) -> Result<u64, SessionError> {
        self.handler("gc")?.gc(self.lifetime).await
    }

    fn pending_headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn pending_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
}

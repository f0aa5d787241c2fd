use axum::extract::FromRequestParts;
use http::{StatusCode, request::Parts};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use redis_session::{HttpSessionHost, SessionLifecycleManager};

pub type Manager = SessionLifecycleManager<HttpSessionHost>;

/// The request's session, available as an Axum extractor
///
/// Requires [`session_middleware`](crate::session_middleware) on the route. The handle is
/// shared with the middleware, which saves the session after the handler returns.
///
/// # Example
///
/// ```no_run
/// use redis_session::SameSite;
/// use redis_session_axum::{IntoResponseError, Session};
/// use http::StatusCode;
///
/// async fn visits(session: Session) -> Result<String, (StatusCode, String)> {
///     let mut session = session.lock().await;
///     session.start(SameSite::Lax).await.into_response_error()?;
///     let visits = session.get_as::<u64>("visits").into_response_error()?.unwrap_or(0) + 1;
///     session.set("visits", visits).into_response_error()?;
///     Ok(format!("{visits} visits"))
/// }
/// ```
#[derive(Clone)]
pub struct Session(Arc<Mutex<Manager>>);

impl Session {
    pub(crate) fn new(manager: Manager) -> Self {
        Self(Arc::new(Mutex::new(manager)))
    }

    pub async fn lock(&self) -> MutexGuard<'_, Manager> {
        self.0.lock().await
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            tracing::error!("Session extractor used on a route without session_middleware");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Session middleware not installed",
            )
        })
    }
}

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::{StatusCode, header::SET_COOKIE};
use std::sync::Arc;

use redis_session::{HttpSessionHost, SessionContext, SessionLifecycleManager};

use super::session::Session;

/// Runs one session lifecycle around the request.
///
/// The handler gets a [`Session`] through request extensions. Afterwards the session is saved
/// if it is still active and its cookie headers are added to the response. A failed save
/// turns the response into a 500 that carries no session cookie.
///
/// ```no_run
/// use axum::{Router, middleware, routing::get};
/// use redis_session::{SessionConfig, SessionContext};
/// use redis_session_axum::session_middleware;
///
/// # fn app() -> Result<Router, redis_session::SessionError> {
/// let context = SessionContext::new(SessionConfig::from_env())?;
/// let app: Router = Router::new()
///     .route("/", get(|| async { "hello" }))
///     .layer(middleware::from_fn_with_state(context, session_middleware));
/// # Ok(app)
/// # }
/// ```
pub async fn session_middleware(
    State(context): State<Arc<SessionContext>>,
    mut req: Request,
    next: Next,
) -> Response {
    let config = context.config();
    let host =
        HttpSessionHost::from_request_headers(req.headers(), config.cookie.clone(), config.lifetime);
    let session = Session::new(SessionLifecycleManager::new(context.clone(), host));
    req.extensions_mut().insert(session.clone());

    let mut response = next.run(req).await;

    let mut manager = session.lock().await;
    let saved = match manager.flush().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Failed to save session at end of request: {e}");
            response =
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to save session").into_response();
            false
        }
    };

    // An id whose record was never stored must not reach the client
    let session_prefix = format!("{}=", context.config().cookie.name);
    let pending = manager.take_pending_headers();
    for (name, value) in pending.iter() {
        let unsaved_session_cookie = !saved
            && *name == SET_COOKIE
            && value.as_bytes().starts_with(session_prefix.as_bytes());
        if unsaved_session_cookie {
            tracing::debug!("Dropping session cookie of unsaved session");
            continue;
        }
        response.headers_mut().append(name, value.clone());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IntoResponseError, Session};
    use async_trait::async_trait;
    use axum::{Router, body::Body, middleware, routing::get};
    use http::header::COOKIE;
    use redis_session::{
        CacheData, CacheStore, SameSite, SessionConfig, StorageError, StoreType,
    };
    use tower::ServiceExt;

    async fn count(session: Session) -> Result<String, (StatusCode, String)> {
        let mut session = session.lock().await;
        session.start(SameSite::Strict).await.into_response_error()?;
        let n = session.get_as::<u64>("count").into_response_error()?.unwrap_or(0) + 1;
        session.set("count", n).into_response_error()?;
        Ok(n.to_string())
    }

    async fn logout(session: Session) -> Result<&'static str, (StatusCode, String)> {
        let mut session = session.lock().await;
        session.start(SameSite::Strict).await.into_response_error()?;
        session.destroy().await.into_response_error()?;
        Ok("bye")
    }

    fn app(context: Arc<SessionContext>) -> Router {
        Router::new()
            .route("/count", get(count))
            .route("/logout", get(logout))
            .route("/plain", get(|| async { "no session" }))
            .layer(middleware::from_fn_with_state(context, session_middleware))
    }

    fn memory_context() -> Arc<SessionContext> {
        let mut config = SessionConfig::default();
        config.store.store_type = StoreType::Memory;
        SessionContext::new(config).unwrap()
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn session_cookie(response: &Response) -> Option<String> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .find(|v| v.starts_with("SESSIONID="))
    }

    #[tokio::test]
    async fn test_session_survives_requests() {
        let context = memory_context();

        let first = app(context.clone())
            .oneshot(get_request("/count", None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let cookie = session_cookie(&first).expect("new session sets a cookie");
        assert!(cookie.ends_with("; Path=/; HttpOnly; SameSite=Strict"));
        assert_eq!(body_text(first).await, "1");

        let pair = cookie.split(';').next().unwrap().to_string();
        let second = app(context.clone())
            .oneshot(get_request("/count", Some(&pair)))
            .await
            .unwrap();
        assert!(session_cookie(&second).is_none());
        assert_eq!(body_text(second).await, "2");
    }

    #[tokio::test]
    async fn test_untouched_session_sets_no_cookie() {
        let response = app(memory_context())
            .oneshot(get_request("/plain", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_logout_expires_cookie() {
        let context = memory_context();
        let first = app(context.clone())
            .oneshot(get_request("/count", None))
            .await
            .unwrap();
        let cookie = session_cookie(&first).unwrap();
        let pair = cookie.split(';').next().unwrap().to_string();

        let response = app(context.clone())
            .oneshot(get_request("/logout", Some(&pair)))
            .await
            .unwrap();
        assert_eq!(
            session_cookie(&response).unwrap(),
            "SESSIONID=; Path=/; Max-Age=0; HttpOnly; SameSite=Strict"
        );

        // The old id no longer has any data
        let response = app(context)
            .oneshot(get_request("/count", Some(&pair)))
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "1");
    }

    #[tokio::test]
    async fn test_extractor_without_middleware_is_rejected() {
        let app = Router::new().route("/count", get(count));
        let response = app.oneshot(get_request("/count", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    struct ReadOnlyStore;

    #[async_trait]
    impl CacheStore for ReadOnlyStore {
        async fn init(&self) -> Result<(), StorageError> {
            Ok(())
        }

        async fn put_with_ttl(&self, _: &str, _: CacheData, _: u64) -> Result<(), StorageError> {
            Err(StorageError::Connection("Connection refused".to_string()))
        }

        async fn get(&self, _: &str) -> Result<Option<CacheData>, StorageError> {
            Ok(None)
        }

        async fn remove(&self, _: &str) -> Result<(), StorageError> {
            Err(StorageError::Connection("Connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_save_is_server_error() {
        let context =
            SessionContext::with_cache_store(SessionConfig::default(), Arc::new(ReadOnlyStore));

        let response = app(context)
            .oneshot(get_request("/count", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // The new id was never stored, so the client must not be handed it
        assert!(session_cookie(&response).is_none());
        assert_eq!(body_text(response).await, "Failed to save session");
    }
}

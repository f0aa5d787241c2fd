mod error;
mod middleware;
mod session;

pub use error::IntoResponseError;
pub use middleware::session_middleware;
pub use session::{Manager, Session};

// Re-export the core library so applications only need this crate
pub use redis_session::{
    CookieConfig, SameSite, SessionConfig, SessionContext, SessionError, SessionId,
    SessionRecord, SessionState, StoreType,
};

//! redis-session - Redis-backed request sessions
//!
//! A [`SessionLifecycleManager`] runs one session per request: it resumes or creates the
//! session through a [`SessionHost`], keeps the data in memory while the request runs, writes
//! it back to the store once with a TTL, and enforces the `SameSite` attribute on the session
//! cookie the host emits.
//!
//! Shared state (configuration and the store connection) lives in a [`SessionContext`] built
//! once at startup.
//!
//! # Known limitations
//!
//! There is no locking between requests. Two requests carrying the same session id that both
//! change it race at the store, and the last save wins.

mod config;
mod session;
mod storage;
mod utils;

pub use config::{
    CookieConfig, DEFAULT_COOKIE_NAME, DEFAULT_KEY_PREFIX, DEFAULT_SESSION_LIFETIME,
    SessionConfig, StoreConfig, StoreScheme, StoreType,
};

pub use session::{
    CookieAttributes, CookieRewriter, CookieWarning, HostStatus, HttpSessionHost,
    MAX_NESTING_DEPTH, PayloadFormat,
    RewriteOutcome, SameSite, SessionContext, SessionError, SessionHandler, SessionHost,
    SessionId, SessionLifecycleManager, SessionRecord, SessionSerializer, SessionState,
    SessionStore, StoreSessionHandler, StoredPayload,
};

// Storage backends, for plugging a custom store into `SessionContext::with_cache_store`
pub use storage::{CacheData, CacheStore, InMemoryCacheStore, RedisCacheStore, StorageError};

pub use utils::{UtilError, gen_random_string};

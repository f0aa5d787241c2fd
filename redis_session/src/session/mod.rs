mod codec;
mod context;
mod cookie;
mod errors;
mod handler;
mod host;
mod manager;
mod store;
mod types;

#[cfg(test)]
mod test_utils;

pub use codec::{MAX_NESTING_DEPTH, PayloadFormat, SessionSerializer};
pub use context::SessionContext;
pub use cookie::{CookieAttributes, CookieRewriter, CookieWarning, RewriteOutcome};
pub(crate) use cookie::is_token_char;
pub use errors::SessionError;
pub use handler::{SessionHandler, StoreSessionHandler};
pub use host::{HostStatus, HttpSessionHost, SessionHost};
pub use manager::SessionLifecycleManager;
pub use store::SessionStore;
pub use types::{SameSite, SessionId, SessionRecord, SessionState, StoredPayload};

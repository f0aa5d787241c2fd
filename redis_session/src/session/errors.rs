use thiserror::Error;

use crate::session::types::SessionState;
use crate::storage::StorageError;
use crate::utils::UtilError;

#[derive(Debug, Error, Clone)]
pub enum SessionError {
    /// The backing store could not be reached or rejected the command
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    /// Stored bytes could not be decoded into a session record
    #[error("Corrupt session payload: {0}")]
    CorruptPayload(String),

    /// A `Set-Cookie` value could not be parsed during the rewrite
    #[error("Invalid cookie header: {0}")]
    InvalidCookieHeader(String),

    /// Lifecycle API used in a state that does not allow the operation
    #[error("Invalid session state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// A value could not be converted into the session data model
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// Error from utils operations
    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

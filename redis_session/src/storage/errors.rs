use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.kind() == redis::ErrorKind::IoError
            || err.is_connection_refusal()
            || err.is_connection_dropped()
        {
            Self::Connection(err.to_string())
        } else {
            Self::Storage(err.to_string())
        }
    }
}

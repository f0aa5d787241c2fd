use async_trait::async_trait;
use redis::{self, AsyncCommands, RedisResult, aio::MultiplexedConnection};
use std::future::Future;
use tokio::sync::Mutex;

use crate::storage::errors::StorageError;
use crate::storage::types::CacheData;

use super::types::{CacheStore, RedisCacheStore};

impl RedisCacheStore {
    /// Create a store for `url`. No connection is made until first use.
    pub fn open(url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StorageError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        tracing::debug!("Opening multiplexed Redis connection");
        let conn = self.client.get_multiplexed_async_connection().await?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn discard_connection(&self) {
        self.connection.lock().await.take();
    }

    /// Run `command` on the shared connection.
    ///
    /// When the connection turns out to be dead it is dropped and the command is sent once more
    /// on a fresh one. Only idempotent commands go through here.
    async fn run<T, F, Fut>(&self, command: F) -> Result<T, StorageError>
    where
        T: Send,
        F: Fn(MultiplexedConnection) -> Fut + Send + Sync,
        Fut: Future<Output = RedisResult<T>> + Send,
    {
        let conn = self.connection().await?;
        match command(conn).await.map_err(StorageError::from) {
            Err(StorageError::Connection(e)) => {
                tracing::warn!("Redis connection lost ({e}), reconnecting");
                self.discard_connection().await;
                let conn = self.connection().await?;
                Ok(command(conn).await?)
            }
            other => other,
        }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn init(&self) -> Result<(), StorageError> {
        // Verify the connection works
        let _conn = self.connection().await?;
        Ok(())
    }

    async fn put_with_ttl(
        &self,
        key: &str,
        value: CacheData,
        ttl: u64,
    ) -> Result<(), StorageError> {
        if ttl == 0 {
            return Err(StorageError::Storage(
                "TTL must be at least one second".to_string(),
            ));
        }
        let bytes = value.value;

        // SET key value EX ttl: value and expiry change together
        self.run(|mut conn| {
            let bytes = bytes.clone();
            async move {
                let _: () = conn.set_ex(key, bytes, ttl).await?;
                Ok::<_, redis::RedisError>(())
            }
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<CacheData>, StorageError> {
        let value = self
            .run(|mut conn| async move {
                let value: Option<Vec<u8>> = conn.get(key).await?;
                Ok::<_, redis::RedisError>(value)
            })
            .await?;
        Ok(value.map(CacheData::from))
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.run(|mut conn| async move {
            let _: () = conn.del(key).await?;
            Ok::<_, redis::RedisError>(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn redis_url() -> String {
        dotenvy::dotenv().ok();
        std::env::var("SESSION_STORE_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string())
    }

    #[test]
    fn test_open_rejects_malformed_url() {
        let result = RedisCacheStore::open("not a redis url");
        assert!(result.is_err());
    }

    #[test]
    fn test_open_is_lazy() {
        // Opening must not touch the network, so an unreachable port is fine here
        let store = RedisCacheStore::open("redis://127.0.0.1:1/");
        assert!(store.is_ok());
        assert!(store.unwrap().connection.try_lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_with_zero_ttl_is_rejected() {
        let store = RedisCacheStore::open("redis://127.0.0.1:1/").unwrap();
        let result = store.put_with_ttl("sessions:zero", CacheData::from(vec![1]), 0).await;
        assert!(matches!(result, Err(StorageError::Storage(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_error() {
        let store = RedisCacheStore::open("redis://127.0.0.1:1/").unwrap();
        let result = store.get("sessions:unreachable").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_redis_round_trip_and_expiry() {
        let store = RedisCacheStore::open(&redis_url()).unwrap();
        store.init().await.unwrap();

        let key = "sessions:redis_cache_store_test";
        store
            .put_with_ttl(key, CacheData::from(b"payload".to_vec()), 1)
            .await
            .unwrap();
        let value = store.get(key).await.unwrap();
        assert_eq!(value, Some(CacheData::from(b"payload".to_vec())));

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(store.get(key).await.unwrap().is_none());

        store.remove(key).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_redis_init_reuses_connection() {
        let store = RedisCacheStore::open(&redis_url()).unwrap();
        store.init().await.unwrap();
        store.init().await.unwrap();
        assert!(store.connection.lock().await.is_some());
    }

    /// Parse `<prefix><number>\r\n` at `pos`, returning the number and the next position.
    fn resp_header(buf: &[u8], pos: usize, prefix: u8) -> Option<(usize, usize)> {
        if *buf.get(pos)? != prefix {
            return None;
        }
        let end = pos + buf[pos..].windows(2).position(|w| w == b"\r\n")?;
        let n = std::str::from_utf8(&buf[pos + 1..end]).ok()?.parse().ok()?;
        Some((n, end + 2))
    }

    /// Parse one complete RESP command, returning its name and the bytes consumed.
    fn resp_command(buf: &[u8]) -> Option<(String, usize)> {
        let (args, mut pos) = resp_header(buf, 0, b'*')?;
        let mut name = String::new();
        for i in 0..args {
            let (len, next) = resp_header(buf, pos, b'$')?;
            if buf.len() < next + len + 2 {
                return None;
            }
            if i == 0 {
                name = String::from_utf8_lossy(&buf[next..next + len]).to_ascii_uppercase();
            }
            pos = next + len + 2;
        }
        Some((name, pos))
    }

    /// Minimal Redis stand-in: GET answers nil, everything else `+OK`.
    /// The first connection is closed right after it answers its first GET.
    async fn serve_flaky_redis(listener: TcpListener, accepted: Arc<AtomicUsize>) {
        while let Ok((mut socket, _)) = listener.accept().await {
            let nth = accepted.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    buf.extend_from_slice(&chunk[..n]);
                    while let Some((name, used)) = resp_command(&buf) {
                        buf.drain(..used);
                        let reply: &[u8] = if name == "GET" { b"$-1\r\n" } else { b"+OK\r\n" };
                        if socket.write_all(reply).await.is_err() {
                            return;
                        }
                        if name == "GET" && nth == 0 {
                            return;
                        }
                    }
                }
            });
        }
    }

    #[tokio::test]
    async fn test_dropped_connection_is_reopened() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        tokio::spawn(serve_flaky_redis(listener, accepted.clone()));

        let store = RedisCacheStore::open(&format!("redis://{addr}/")).unwrap();
        store.init().await.unwrap();
        assert!(store.get("sessions:first").await.unwrap().is_none());

        // The server has hung up on the first connection
        for _ in 0..3 {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            assert!(store.get("sessions:after_drop").await.unwrap().is_none());
        }
        store
            .put_with_ttl("sessions:after_drop", CacheData::from(vec![1]), 60)
            .await
            .unwrap();
        store.remove("sessions:after_drop").await.unwrap();

        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }
}

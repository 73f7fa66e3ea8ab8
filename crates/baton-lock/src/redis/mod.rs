//! Redis lock store.
//!
//! Built on the `redis` crate's [`ConnectionManager`]:
//!
//! | Operation | Command |
//! |-----------|---------|
//! | `try_acquire` | `SET key marker NX PX ttl` |
//! | `release` | `DEL key` |
//! | `release_if_held` | compare-and-delete script via `EVALSHA` |
//! | `ping` | `PING` |
//!
//! The manager is created on first use. Creating it (TCP connect plus the
//! `AUTH`/`SELECT` handshake) is bounded by `connect_timeout`, each command
//! by `command_timeout`. After a timeout or a transport failure the manager
//! is discarded and the next call connects again. An error reply keeps the
//! connection. Replies are matched to their requests by the multiplexer, so
//! a caller that gives up on a command never sees another command's reply.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{
    Cmd, ConnectionAddr, ConnectionInfo, FromRedisValue, RedisConnectionInfo, RedisResult, Script,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{LockError, Result};
use crate::store::LockStore;

/// Deletes KEYS[1] only when its value equals ARGV[1]
const RELEASE_IF_HELD_SCRIPT: &str = "if redis.call('get', KEYS[1]) == ARGV[1] then return redis.call('del', KEYS[1]) else return 0 end";

/// Connection settings for the Redis lock store
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: u32,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            database: 0,
            connect_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_secs(1),
        }
    }
}

impl RedisConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: i64::from(self.database),
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }
}

/// Lock store backed by a single Redis instance
pub struct RedisLockStore {
    config: RedisConfig,
    client: redis::Client,
    conn: Mutex<Option<ConnectionManager>>,
    release_script: Script,
}

impl RedisLockStore {
    /// Create the store; no connection is made until the first command
    pub fn new(config: RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.connection_info())?;
        Ok(Self {
            config,
            client,
            conn: Mutex::new(None),
            release_script: Script::new(RELEASE_IF_HELD_SCRIPT),
        })
    }

    /// The shared connection, created on first use
    async fn connection(&self) -> Result<ConnectionManager> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(
            self.config.connect_timeout,
            self.client.get_connection_manager(),
        )
        .await
        .map_err(|_| LockError::Timeout(self.config.connect_timeout))??;

        info!(
            address = %self.config.address(),
            database = self.config.database,
            "Connected to Redis lock store"
        );
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn disconnect(&self) {
        self.conn.lock().await.take();
    }

    /// Run one command under `command_timeout`.
    ///
    /// Error replies are returned as `LockError::Server`.
    async fn execute<T, F, Fut>(&self, command: &'static str, op: F) -> Result<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection().await?;

        match tokio::time::timeout(self.config.command_timeout, op(conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let err = LockError::from(e);
                if err.is_connectivity() {
                    warn!(command, error = %err, "Dropping Redis connection after failure");
                    self.disconnect().await;
                }
                Err(err)
            }
            Err(_) => {
                warn!(
                    command,
                    timeout = ?self.config.command_timeout,
                    "Dropping Redis connection after timeout"
                );
                self.disconnect().await;
                Err(LockError::Timeout(self.config.command_timeout))
            }
        }
    }

    async fn query<T>(&self, command: &'static str, cmd: Cmd) -> Result<T>
    where
        T: FromRedisValue + Send,
    {
        self.execute(command, move |mut conn| async move {
            let reply: RedisResult<T> = cmd.query_async(&mut conn).await;
            reply
        })
        .await
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn try_acquire(&self, key: &str, marker: &str, ttl: Duration) -> Result<bool> {
        // PX 0 is rejected by Redis
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(marker).arg("NX").arg("PX").arg(ttl_ms);

        let reply: Option<String> = self.query("SET", cmd).await?;

        let acquired = reply.is_some();
        if acquired {
            debug!(key = %key, ttl_ms, "Lock acquired");
        }
        Ok(acquired)
    }

    async fn release(&self, key: &str) -> Result<bool> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);

        let removed: i64 = self.query("DEL", cmd).await?;
        Ok(removed > 0)
    }

    async fn release_if_held(&self, key: &str, marker: &str) -> Result<bool> {
        let mut invocation = self.release_script.prepare_invoke();
        invocation.key(key).arg(marker);

        let removed: i64 = self
            .execute("EVALSHA", move |mut conn| async move {
                let reply: RedisResult<i64> = invocation.invoke_async(&mut conn).await;
                reply
            })
            .await?;
        Ok(removed > 0)
    }

    async fn ping(&self) -> Result<()> {
        let reply: String = self.query("PING", redis::cmd("PING")).await?;

        if reply == "PONG" {
            Ok(())
        } else {
            Err(LockError::Protocol(format!("unexpected PING reply: {}", reply)))
        }
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// In-process stand-in for a Redis server.
    ///
    /// Keys never expire. `hang` swallows commands without replying,
    /// `fail_next` answers the next command with an error, and a `SET` on a
    /// key starting with `slow` is answered after `SLOW_REPLY`.
    #[derive(Default)]
    struct FakeRedis {
        data: std::sync::Mutex<HashMap<String, String>>,
        commands: std::sync::Mutex<Vec<Vec<String>>>,
        connections: AtomicUsize,
        hang: AtomicBool,
        fail_next: AtomicBool,
    }

    const SLOW_REPLY: Duration = Duration::from_millis(100);

    impl FakeRedis {
        fn reply(&self, args: &[String]) -> String {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return "-ERR injected failure\r\n".to_string();
            }

            let mut data = self.data.lock().unwrap();
            match args[0].to_uppercase().as_str() {
                "PING" => "+PONG\r\n".to_string(),
                "SET" => {
                    if data.contains_key(&args[1]) {
                        "$-1\r\n".to_string()
                    } else {
                        data.insert(args[1].clone(), args[2].clone());
                        "+OK\r\n".to_string()
                    }
                }
                "DEL" => format!(":{}\r\n", data.remove(&args[1]).is_some() as i64),
                "EVAL" | "EVALSHA" => {
                    let key = &args[3];
                    if data.get(key) == Some(&args[4]) {
                        data.remove(key);
                        ":1\r\n".to_string()
                    } else {
                        ":0\r\n".to_string()
                    }
                }
                // AUTH, SELECT and connection setup chatter
                _ => "+OK\r\n".to_string(),
            }
        }

        fn saw(&self, command: &[&str]) -> bool {
            self.commands
                .lock()
                .unwrap()
                .iter()
                .any(|seen| seen.iter().map(String::as_str).eq(command.iter().copied()))
        }
    }

    /// Read one command sent as an array of bulk strings
    async fn read_command<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<Vec<String>> {
        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            line.clear();
            reader.read_line(&mut line).await.ok()?;
            let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
            let mut buf = vec![0u8; len + 2];
            reader.read_exact(&mut buf).await.ok()?;
            buf.truncate(len);
            args.push(String::from_utf8(buf).ok()?);
        }
        Some(args)
    }

    async fn start_fake() -> (SocketAddr, Arc<FakeRedis>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let fake = Arc::new(FakeRedis::default());

        let server = fake.clone();
        tokio::spawn(async move {
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                server.connections.fetch_add(1, Ordering::SeqCst);
                let server = server.clone();
                tokio::spawn(async move {
                    let mut reader = BufReader::new(socket);
                    while let Some(args) = read_command(&mut reader).await {
                        server.commands.lock().unwrap().push(args.clone());
                        if server.hang.load(Ordering::SeqCst) {
                            continue;
                        }
                        if args[0].eq_ignore_ascii_case("SET") && args[1].starts_with("slow") {
                            tokio::time::sleep(SLOW_REPLY).await;
                        }
                        let reply = server.reply(&args);
                        if reader.get_mut().write_all(reply.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        (addr, fake)
    }

    /// Listener that accepts connections and never answers
    async fn start_silent() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut sink = Vec::new();
                    let _ = socket.read_to_end(&mut sink).await;
                });
            }
        });

        addr
    }

    fn config_for(addr: SocketAddr) -> RedisConfig {
        RedisConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            connect_timeout: Duration::from_millis(500),
            command_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    fn store_for(addr: SocketAddr) -> RedisLockStore {
        RedisLockStore::new(config_for(addr)).unwrap()
    }

    #[test]
    fn test_redis_config_default() {
        let config = RedisConfig::default();
        assert_eq!(config.address(), "localhost:6379");
        assert!(config.password.is_none());
        assert_eq!(config.database, 0);

        let info = config.connection_info();
        assert_eq!(info.redis.db, 0);
        assert!(info.redis.password.is_none());
    }

    #[tokio::test]
    async fn test_acquire_release_roundtrip() {
        let (addr, fake) = start_fake().await;
        let store = store_for(addr);

        store.ping().await.unwrap();
        assert!(
            store
                .try_acquire("lock", "m1", Duration::from_secs(10))
                .await
                .unwrap()
        );
        assert!(
            !store
                .try_acquire("lock", "m2", Duration::from_secs(10))
                .await
                .unwrap()
        );
        assert!(fake.saw(&["SET", "lock", "m1", "NX", "PX", "10000"]));
        assert!(store.release("lock").await.unwrap());
        assert!(!store.release("lock").await.unwrap());

        // All commands went over one connection
        assert_eq!(fake.connections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_if_held() {
        let (addr, _fake) = start_fake().await;
        let store = store_for(addr);

        assert!(
            store
                .try_acquire("lock", "m1", Duration::from_secs(10))
                .await
                .unwrap()
        );
        assert!(!store.release_if_held("lock", "other").await.unwrap());
        assert!(store.release_if_held("lock", "m1").await.unwrap());
    }

    #[tokio::test]
    async fn test_auth_and_select_on_connect() {
        let (addr, fake) = start_fake().await;
        let store = RedisLockStore::new(RedisConfig {
            password: Some("secret".to_string()),
            database: 3,
            ..config_for(addr)
        })
        .unwrap();

        store.ping().await.unwrap();
        assert!(fake.saw(&["AUTH", "secret"]));
        assert!(fake.saw(&["SELECT", "3"]));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_an_error() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = store_for(addr);
        let err = store
            .try_acquire("lock", "m1", Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_silent_server_handshake_times_out() {
        let addr = start_silent().await;
        let store = RedisLockStore::new(RedisConfig {
            password: Some("secret".to_string()),
            ..config_for(addr)
        })
        .unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            store.try_acquire("lock", "m1", Duration::from_secs(10)),
        )
        .await
        .expect("handshake must be bounded by connect_timeout");

        let err = result.unwrap_err();
        assert!(matches!(err, LockError::Timeout(t) if t == Duration::from_millis(500)));
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_timeout_drops_connection() {
        let (addr, fake) = start_fake().await;
        let store = store_for(addr);
        store.ping().await.unwrap();

        fake.hang.store(true, Ordering::SeqCst);
        let err = store.ping().await.unwrap_err();
        assert!(matches!(err, LockError::Timeout(_)));

        fake.hang.store(false, Ordering::SeqCst);
        store.ping().await.unwrap();
        assert_eq!(fake.connections.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_reply_keeps_connection() {
        let (addr, fake) = start_fake().await;
        let store = store_for(addr);
        store.ping().await.unwrap();

        fake.fail_next.store(true, Ordering::SeqCst);
        let err = store
            .try_acquire("lock", "m1", Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Server(ref e) if e.contains("injected failure")));
        assert!(!err.is_connectivity());

        assert!(
            store
                .try_acquire("lock", "m1", Duration::from_secs(10))
                .await
                .unwrap()
        );
        assert_eq!(fake.connections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abandoned_request_does_not_leak_reply() {
        let (addr, fake) = start_fake().await;
        let store = RedisLockStore::new(RedisConfig {
            command_timeout: Duration::from_secs(1),
            ..config_for(addr)
        })
        .unwrap();
        store.ping().await.unwrap();

        // Give up on a SET whose reply is still on its way
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            store.try_acquire("slow-lock", "m1", Duration::from_secs(10)),
        )
        .await;
        assert!(abandoned.is_err());

        // The late "+OK" must not be taken as the answer to this SET
        assert!(
            !store
                .try_acquire("slow-lock", "m2", Duration::from_secs(10))
                .await
                .unwrap()
        );
        assert!(
            store
                .try_acquire("lock", "m3", Duration::from_secs(10))
                .await
                .unwrap()
        );
        assert!(store.release("lock").await.unwrap());
        assert_eq!(fake.connections.load(Ordering::SeqCst), 1);
    }
}

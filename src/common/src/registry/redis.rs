use ::redis::aio::ConnectionManager;
use ::redis::{Client, Cmd, ErrorKind, FromRedisValue, RedisError, cmd};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::RegistryStore;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};

/// Registry store backed by Redis.
///
/// The connection is established on first use and re-established by the
/// connection manager after failures, so a store created while Redis is down
/// starts working once it comes back.
pub struct RedisStore {
    client: Client,
    endpoint: String,
    connection: OnceCell<ConnectionManager>,
    operation_timeout: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.connection.initialized())
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

impl RedisStore {
    /// Create a store for the configured Redis endpoint. Does not connect yet.
    pub fn new(config: &RegistryConfig) -> RegistryResult<Self> {
        let url = config.redis_url()?;
        let client = Client::open(url.as_str())?;
        Ok(Self {
            client,
            endpoint: format!("{}:{}", config.host, config.port),
            connection: OnceCell::new(),
            operation_timeout: config.operation_timeout,
        })
    }

    async fn connection(&self) -> RegistryResult<ConnectionManager> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                log::debug!("Connecting to registry store at {}", self.endpoint);
                let manager = tokio::time::timeout(
                    self.operation_timeout,
                    self.client.get_connection_manager(),
                )
                .await?
                .map_err(|e| {
                    log::error!(
                        "Cannot connect to registry store at {}: {e}",
                        self.endpoint
                    );
                    RegistryError::from(e)
                })?;
                log::info!("Connected to registry store at {}", self.endpoint);
                Ok::<_, RegistryError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }

    /// Run `command` against `key`. Replies about the data at `key` become
    /// `MalformedRecord`; everything else is `StoreUnavailable`.
    async fn query<T: FromRedisValue>(&self, command: &Cmd, key: &str) -> RegistryResult<T> {
        let mut conn = self.connection().await?;
        let value: T = tokio::time::timeout(self.operation_timeout, command.query_async(&mut conn))
            .await?
            .map_err(|e| classify(e, key))?;
        Ok(value)
    }
}

fn classify(err: RedisError, key: &str) -> RegistryError {
    let message = err.to_string();
    let wrong_type = err.kind() == ErrorKind::TypeError
        || err.code() == Some("WRONGTYPE")
        || message.starts_with("WRONGTYPE");
    let bad_value = err.kind() == ErrorKind::ResponseError
        && (message.contains("not an integer") || message.contains("overflow"));
    if wrong_type || bad_value {
        RegistryError::malformed(key, message)
    } else {
        RegistryError::from(err)
    }
}

/// SETEX takes whole seconds; round partial seconds up so a record never
/// lives shorter than requested.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl RegistryStore for RedisStore {
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> RegistryResult<()> {
        let mut command = cmd("SETEX");
        command.arg(key).arg(ttl_seconds(ttl)).arg(value);
        self.query::<()>(&command, key).await
    }

    async fn exists(&self, key: &str) -> RegistryResult<bool> {
        let mut command = cmd("EXISTS");
        command.arg(key);
        self.query(&command, key).await
    }

    async fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>> {
        let mut command = cmd("GET");
        command.arg(key);
        self.query(&command, key).await
    }

    async fn set_add(&self, set: &str, member: &str) -> RegistryResult<()> {
        let mut command = cmd("SADD");
        command.arg(set).arg(member);
        self.query::<i64>(&command, set).await.map(|_| ())
    }

    async fn set_remove(&self, set: &str, member: &str) -> RegistryResult<()> {
        let mut command = cmd("SREM");
        command.arg(set).arg(member);
        self.query::<i64>(&command, set).await.map(|_| ())
    }

    async fn set_members(&self, set: &str) -> RegistryResult<Vec<String>> {
        let mut command = cmd("SMEMBERS");
        command.arg(set);
        self.query(&command, set).await
    }

    async fn set_exists(&self, set: &str) -> RegistryResult<bool> {
        self.exists(set).await
    }

    async fn incr(&self, key: &str) -> RegistryResult<i64> {
        let mut command = cmd("INCR");
        command.arg(key);
        self.query(&command, key).await
    }
}

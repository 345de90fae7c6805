//! Key-value primitives the registry protocol is built on.
//!
//! Every operation is a single independent request against the store. Liveness is
//! carried by expiring string keys, membership by one unordered set per fleet.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::RegistryResult;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Store operations needed by the registrant, the discoverer and the hit counter.
#[async_trait]
pub trait RegistryStore: std::fmt::Debug + Send + Sync + 'static {
    /// Write `key` with `value`, expiring after `ttl`. Overwrites any prior value.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration)
    -> RegistryResult<()>;

    /// Whether `key` currently exists (has not expired).
    async fn exists(&self, key: &str) -> RegistryResult<bool>;

    /// Read the raw value of `key`, `None` when it does not exist.
    async fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>>;

    /// Add `member` to `set`. Idempotent.
    async fn set_add(&self, set: &str, member: &str) -> RegistryResult<()>;

    /// Remove `member` from `set`. Removing an absent member is not an error.
    async fn set_remove(&self, set: &str, member: &str) -> RegistryResult<()>;

    /// Snapshot of all members of `set`.
    async fn set_members(&self, set: &str) -> RegistryResult<Vec<String>>;

    /// Whether `set` exists at all.
    async fn set_exists(&self, set: &str) -> RegistryResult<bool>;

    /// Increment the integer counter at `key`, returning the new value.
    async fn incr(&self, key: &str) -> RegistryResult<i64>;
}

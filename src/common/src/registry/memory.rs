use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::RegistryStore;
use crate::error::{RegistryError, RegistryResult};

#[derive(Debug, Clone)]
struct StringEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

#[derive(Debug, Default)]
struct State {
    strings: HashMap<String, StringEntry>,
    sets: HashMap<String, HashSet<String>>,
}

impl State {
    /// Drop `key` if its deadline has passed, returning the live entry otherwise.
    fn live_string(&mut self, key: &str, now: Instant) -> Option<&StringEntry> {
        let expired = self.strings.get(key).is_some_and(|e| !e.is_live(now));
        if expired {
            self.strings.remove(key);
        }
        self.strings.get(key)
    }
}

/// In-process registry store with explicit expiry deadlines.
///
/// Deadlines are measured with the tokio clock, so tests running with a paused
/// runtime can advance past a TTL without sleeping. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store becoming unreachable (or reachable again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> RegistryResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RegistryError::unavailable("memory store is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> RegistryResult<()> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        state.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.as_bytes().to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> RegistryResult<bool> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        if state.live_string(key, Instant::now()).is_some() {
            return Ok(true);
        }
        Ok(state.sets.contains_key(key))
    }

    async fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        if state.sets.contains_key(key) {
            return Err(RegistryError::malformed(key, "key holds a set, not a string"));
        }
        Ok(state
            .live_string(key, Instant::now())
            .map(|entry| entry.value.clone()))
    }

    async fn set_add(&self, set: &str, member: &str) -> RegistryResult<()> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        state
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, set: &str, member: &str) -> RegistryResult<()> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let now_empty = match state.sets.get_mut(set) {
            Some(members) => {
                members.remove(member);
                members.is_empty()
            }
            None => false,
        };
        // An empty set no longer exists, same as in Redis.
        if now_empty {
            state.sets.remove(set);
        }
        Ok(())
    }

    async fn set_members(&self, set: &str) -> RegistryResult<Vec<String>> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(state
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_exists(&self, set: &str) -> RegistryResult<bool> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(state.sets.contains_key(set))
    }

    async fn incr(&self, key: &str) -> RegistryResult<i64> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let current = match state.live_string(key, now) {
            Some(entry) => std::str::from_utf8(&entry.value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| RegistryError::malformed(key, "value is not an integer"))?,
            None => 0,
        };
        let next = current
            .checked_add(1)
            .ok_or_else(|| RegistryError::malformed(key, "increment would overflow"))?;
        let expires_at = state.strings.get(key).and_then(|e| e.expires_at);
        state.strings.insert(
            key.to_string(),
            StringEntry {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }
}

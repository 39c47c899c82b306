use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::Result;

/// Atomic "delete iff current value equals my token".
const DELETE_IF_EQ: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end"#;

/// Atomic "extend TTL iff current value equals my token".
const EXTEND_IF_EQ: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('pexpire', KEYS[1], ARGV[2])
else
    return 0
end"#;

/// Thin client over the shared key/value store backing all leases.
///
/// Every operation is atomic on the store side; the whole lock protocol
/// rests on that, so backends must never emulate these with read-then-write.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Conditional set-if-absent with TTL. Returns true iff the key was set.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` iff its current value equals `expected`.
    /// Returns true iff a key was deleted.
    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool>;

    /// Reset `key`'s TTL iff its current value equals `expected`.
    /// Returns true iff the lease was extended.
    async fn extend_if_eq(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool>;

    /// Whether `key` currently exists (diagnostics only, never a safety check).
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Unconditional set with TTL (heartbeats).
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Publish a payload on a pub/sub channel. Dropped if nobody listens.
    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;
}

/// Production backend over Redis.
///
/// Uses a multiplexed connection manager (reconnects internally) and two
/// small Lua scripts for the compare-and-delete / compare-and-extend pair.
pub struct RedisLockStore {
    conn: ConnectionManager,
    delete_script: Script,
    extend_script: Script,
}

impl RedisLockStore {
    /// Connect to the lock store. Fails fast; callers treat this as a
    /// startup error, not something to retry silently.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        debug!(%url, "connected to lock store");
        Ok(Self {
            conn,
            delete_script: Script::new(DELETE_IF_EQ),
            extend_script: Script::new(EXTEND_IF_EQ),
        })
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        // SET NX PX replies OK on success, Nil when the key is held.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .delete_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn extend_if_eq(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let extended: i64 = self
            .extend_script
            .key(key)
            .arg(expected)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let n: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(n == 1)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

struct Entry {
    value: String,
    expires_at: Instant,
}

const CHANNEL_CAPACITY: usize = 256;

/// In-process backend: a mutexed map with expiry instants plus a broadcast
/// channel per pub/sub topic.
///
/// Used by tests and by single-instance deployments that run without a
/// shared store. Provides the same atomicity guarantees (the map mutex
/// serialises every conditional op) but, by nature, no cross-process safety.
#[derive(Default)]
pub struct MemoryLockStore {
    entries: Mutex<HashMap<String, Entry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a pub/sub topic. Test observers use this to assert on
    /// published lifecycle events.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Remove the entry if its TTL has lapsed, mirroring store-side expiry.
    fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str) {
        if let Some(entry) = entries.get(key) {
            if entry.expires_at <= Instant::now() {
                entries.remove(key);
            }
        }
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge_expired(&mut entries, key);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge_expired(&mut entries, key);
        match entries.get(key) {
            Some(entry) if entry.value == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn extend_if_eq(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge_expired(&mut entries, key);
        match entries.get_mut(key) {
            Some(entry) if entry.value == expected => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge_expired(&mut entries, key);
        Ok(entries.contains_key(key))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let channels = self.channels.lock().unwrap();
        if let Some(tx) = channels.get(channel) {
            // No subscribers is fine; events are best-effort.
            let _ = tx.send(payload.to_string());
        }
        Ok(())
    }
}

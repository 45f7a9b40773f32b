//! In-process [`super::Store`] implementation.
//!
//! Good enough for a single-node deployment and for tests. Internally it's
//! one `Mutex`-guarded set of maps plus a `broadcast` channel per pub/sub
//! pattern subscriber — every op takes the same lock, so "atomic" `Multi`
//! commits fall out for free rather than needing a separate transaction log.

use super::{Multi, PubSubPayload, Store, StoreError, StoreOp, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

struct StrEntry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    hashes: HashMap<String, HashMap<String, String>>,
    lists: HashMap<String, Vec<String>>,
    zsets: HashMap<String, Vec<(i64, String)>>,
    strings: HashMap<String, StrEntry>,
    counters: HashMap<String, i64>,
}

impl Inner {
    fn sweep_expired(&mut self, key: &str) {
        if let Some(entry) = self.strings.get(key) {
            if let Some(exp) = entry.expires_at {
                if Instant::now() >= exp {
                    self.strings.remove(key);
                }
            }
        }
    }
}

/// A single broadcast bus shared by every `subscribe_pattern` caller; each
/// publish is checked against every live pattern before fan-out.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    bus: broadcast::Sender<(String, PubSubPayload)>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (bus, _) = broadcast::channel(1024);
        Self {
            inner: Mutex::new(Inner::default()),
            bus,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Periodic TTL sweep; intended to be driven by a background task on an
    /// interval (spec.md §4.1's "swept periodically").
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.strings.retain(|_, e| e.expires_at.map_or(true, |exp| exp > now));
    }

    fn apply(&self, inner: &mut Inner, op: &StoreOp) -> Option<(String, PubSubPayload)> {
        match op {
            StoreOp::HashSet { key, field, value } => {
                inner.hashes.entry(key.clone()).or_default().insert(field.clone(), value.clone());
                None
            }
            StoreOp::ListPush { key, value } => {
                inner.lists.entry(key.clone()).or_default().push(value.clone());
                None
            }
            StoreOp::ZAdd { key, score, member } => {
                let z = inner.zsets.entry(key.clone()).or_default();
                z.retain(|(_, m)| m != member);
                z.push((*score, member.clone()));
                z.sort_by_key(|(s, _)| *s);
                None
            }
            StoreOp::StrSet { key, value, ttl } => {
                inner.strings.insert(
                    key.clone(),
                    StrEntry {
                        value: value.clone(),
                        expires_at: ttl.map(|d| Instant::now() + d),
                    },
                );
                None
            }
            StoreOp::StrDel { key } => {
                inner.strings.remove(key);
                None
            }
            StoreOp::Incr { key, by } => {
                let c = inner.counters.entry(key.clone()).or_insert(0);
                *c += by;
                None
            }
            StoreOp::Publish { channel, payload } => Some((channel.clone(), payload.clone())),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<Vec<(String, String)>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.hashes.entry(key.to_string()).or_default().insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_exists(&self, key: &str, field: &str) -> StoreResult<bool> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner.hashes.get(key).is_some_and(|h| h.contains_key(field)))
    }

    async fn list_push(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let list = inner.lists.entry(key.to_string()).or_default();
        list.push(value.to_string());
        Ok(list.len() as u64)
    }

    async fn list_range(&self, key: &str, from: usize, to: usize) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner
            .lists
            .get(key)
            .map(|l| {
                let end = to.min(l.len().saturating_sub(1));
                if from > end || l.is_empty() {
                    Vec::new()
                } else {
                    l[from..=end].to_vec()
                }
            })
            .unwrap_or_default())
    }

    async fn list_len(&self, key: &str) -> StoreResult<usize> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner.lists.get(key).map_or(0, Vec::len))
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let z = inner.zsets.entry(key.to_string()).or_default();
        z.retain(|(_, m)| m != member);
        z.push((score, member.to_string()));
        z.sort_by_key(|(s, _)| *s);
        Ok(())
    }

    async fn zrange(&self, key: &str, from: usize, to: usize) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner
            .zsets
            .get(key)
            .map(|z| {
                let end = to.min(z.len().saturating_sub(1));
                if from > end || z.is_empty() {
                    Vec::new()
                } else {
                    z[from..=end].iter().map(|(_, m)| m.clone()).collect()
                }
            })
            .unwrap_or_default())
    }

    async fn zcard(&self, key: &str) -> StoreResult<usize> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner.zsets.get(key).map_or(0, Vec::len))
    }

    async fn str_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.strings.insert(
            key.to_string(),
            StrEntry {
                value: value.to_string(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn str_get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.sweep_expired(key);
        Ok(inner.strings.get(key).map(|e| e.value.clone()))
    }

    async fn str_append(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.sweep_expired(key);
        match inner.strings.get_mut(key) {
            Some(e) => e.value.push_str(value),
            None => {
                inner.strings.insert(
                    key.to_string(),
                    StrEntry {
                        value: value.to_string(),
                        expires_at: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn str_del(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.strings.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, by: i64) -> StoreResult<i64> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let c = inner.counters.entry(key.to_string()).or_insert(0);
        *c += by;
        Ok(*c)
    }

    async fn commit(&self, multi: Multi) -> StoreResult<()> {
        if multi.is_empty() {
            return Ok(());
        }
        let to_publish = {
            let mut inner = self.inner.lock().expect("memory store lock poisoned");
            multi
                .ops
                .iter()
                .filter_map(|op| self.apply(&mut inner, op))
                .collect::<Vec<_>>()
        };
        for (channel, payload) in to_publish {
            let _ = self.bus.send((channel, payload));
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()> {
        let _ = self.bus.send((channel.to_string(), payload.to_string()));
        Ok(())
    }

    async fn subscribe_pattern(&self, pattern: &str) -> StoreResult<broadcast::Receiver<(String, PubSubPayload)>> {
        if pattern.is_empty() {
            return Err(StoreError("empty subscribe pattern".into()));
        }
        let mut upstream = self.bus.subscribe();
        let (forward_tx, forward_rx) = broadcast::channel(1024);
        let pattern = pattern.to_string();
        tokio::spawn(async move {
            loop {
                match upstream.recv().await {
                    Ok((channel, payload)) => {
                        if pattern_matches(&pattern, &channel) {
                            let _ = forward_tx.send((channel, payload));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(forward_rx)
    }
}

/// Does `channel` match a simple trailing-`*` glob pattern such as
/// `"thread:*"`? Exact match if `pattern` has no `*`.
pub fn pattern_matches(pattern: &str, channel: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => channel.starts_with(prefix),
        None => pattern == channel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ttl_expires_on_read() {
        let store = MemoryStore::new();
        store.str_set("k", "v", Some(Duration::from_millis(10))).await.unwrap();
        assert_eq!(store.str_get("k").await.unwrap(), Some("v".to_string()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.str_get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn multi_commit_is_visible_atomically() {
        let store = MemoryStore::new();
        let multi = Multi::new()
            .hash_set("h", "f1", "v1")
            .hash_set("h", "f2", "v2")
            .incr("c", 5);
        store.commit(multi).await.unwrap();
        assert_eq!(store.hash_get("h", "f1").await.unwrap(), Some("v1".to_string()));
        assert_eq!(store.hash_get("h", "f2").await.unwrap(), Some("v2".to_string()));
        assert_eq!(store.incr("c", 0).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn pubsub_delivers_after_commit() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe_pattern("thread:*").await.unwrap();
        let multi = Multi::new().incr("x", 1).publish("thread:7", "hello");
        store.commit(multi).await.unwrap();
        let (channel, payload) = rx.recv().await.unwrap();
        assert!(pattern_matches("thread:*", &channel));
        assert_eq!(payload, "hello");
    }

    #[test]
    fn pattern_matching_handles_prefix_and_exact() {
        assert!(pattern_matches("thread:*", "thread:42"));
        assert!(!pattern_matches("thread:*", "other:42"));
        assert!(pattern_matches("registry", "registry"));
    }
}

//! Abstract durable storage + pub/sub engine (spec §4.1).
//!
//! [`Store`] is deliberately primitive-shaped — hash/list/sorted-set/string
//! operations plus pub/sub — rather than domain-shaped, so the posting core
//! never depends on a particular backend. [`MemoryStore`] is the only
//! implementation shipped; it is a complete, non-stub engine suitable for a
//! single-node deployment and for tests. A Redis-backed engine could
//! implement the same trait without any caller-visible change, the same way
//! a pluggable broadcast/stream topic backend is split from its callers.
//!
//! The one operation that doesn't map to a single method is `Multi`: callers
//! build up a batch of writes via [`Store::multi`] and call
//! [`Multi::commit`], which the trait guarantees is atomic and whose
//! publishes are ordered after the commit that produced them (spec §4.1).
//! A single op inside a `Multi` is not individually retryable — failure
//! aborts the whole batch, and callers retry (or don't) at the request
//! boundary, never mid-`Multi`.

pub mod memory;

use async_trait::async_trait;
use std::time::Duration;

pub use memory::MemoryStore;

/// A value published on a pub/sub channel. Opaque to the Store; callers
/// encode/decode their own wire messages into this.
pub type PubSubPayload = String;

/// One accumulated write in a [`Multi`] batch.
#[derive(Debug, Clone)]
pub enum StoreOp {
    HashSet {
        key: String,
        field: String,
        value: String,
    },
    ListPush {
        key: String,
        value: String,
    },
    ZAdd {
        key: String,
        score: i64,
        member: String,
    },
    StrSet {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    StrDel {
        key: String,
    },
    Incr {
        key: String,
        by: i64,
    },
    Publish {
        channel: String,
        payload: PubSubPayload,
    },
}

/// A batch of writes committed atomically by [`Store::commit`].
#[derive(Default, Debug, Clone)]
pub struct Multi {
    ops: Vec<StoreOp>,
}

impl Multi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_set(mut self, key: &str, field: &str, value: &str) -> Self {
        self.ops.push(StoreOp::HashSet {
            key: key.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn list_push(mut self, key: &str, value: &str) -> Self {
        self.ops.push(StoreOp::ListPush {
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn zadd(mut self, key: &str, score: i64, member: &str) -> Self {
        self.ops.push(StoreOp::ZAdd {
            key: key.to_string(),
            score,
            member: member.to_string(),
        });
        self
    }

    pub fn str_set(mut self, key: &str, value: &str, ttl: Option<Duration>) -> Self {
        self.ops.push(StoreOp::StrSet {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        });
        self
    }

    pub fn str_del(mut self, key: &str) -> Self {
        self.ops.push(StoreOp::StrDel { key: key.to_string() });
        self
    }

    pub fn incr(mut self, key: &str, by: i64) -> Self {
        self.ops.push(StoreOp::Incr {
            key: key.to_string(),
            by,
        });
        self
    }

    pub fn publish(mut self, channel: &str, payload: &str) -> Self {
        self.ops.push(StoreOp::Publish {
            channel: channel.to_string(),
            payload: payload.to_string(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// An error surfaced by a [`Store`] operation. Always `transient` per the
/// taxonomy in spec §7 — callers decide whether to retry at the request
/// boundary.
#[derive(Debug, Clone, thiserror::Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

pub type StoreResult<T> = Result<T, StoreError>;

/// The abstract engine spec §4.1 describes.
#[async_trait]
pub trait Store: Send + Sync {
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;
    async fn hash_get_all(&self, key: &str) -> StoreResult<Vec<(String, String)>>;
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;
    async fn hash_exists(&self, key: &str, field: &str) -> StoreResult<bool>;

    async fn list_push(&self, key: &str, value: &str) -> StoreResult<u64>;
    async fn list_range(&self, key: &str, from: usize, to: usize) -> StoreResult<Vec<String>>;
    async fn list_len(&self, key: &str) -> StoreResult<usize>;

    async fn zadd(&self, key: &str, score: i64, member: &str) -> StoreResult<()>;
    async fn zrange(&self, key: &str, from: usize, to: usize) -> StoreResult<Vec<String>>;
    async fn zcard(&self, key: &str) -> StoreResult<usize>;

    async fn str_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;
    async fn str_get(&self, key: &str) -> StoreResult<Option<String>>;
    async fn str_append(&self, key: &str, value: &str) -> StoreResult<()>;
    async fn str_del(&self, key: &str) -> StoreResult<()>;

    async fn incr(&self, key: &str, by: i64) -> StoreResult<i64>;

    /// Commit a [`Multi`] batch atomically. Publishes inside the batch are
    /// ordered strictly after the batch's writes become visible.
    async fn commit(&self, multi: Multi) -> StoreResult<()>;

    /// Publish a single message outside of a `Multi` (used for messages that
    /// have no accompanying write, e.g. nothing in this core — kept for
    /// completeness of the primitive set).
    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()>;

    /// Subscribe to every channel matching `pattern` (simple `*` glob at the
    /// end, matching the Registry's use case of one wildcard subscription
    /// covering every thread channel).
    async fn subscribe_pattern(&self, pattern: &str) -> StoreResult<tokio::sync::broadcast::Receiver<(String, PubSubPayload)>>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        (**self).hash_get(key, field).await
    }
    async fn hash_get_all(&self, key: &str) -> StoreResult<Vec<(String, String)>> {
        (**self).hash_get_all(key).await
    }
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        (**self).hash_set(key, field, value).await
    }
    async fn hash_exists(&self, key: &str, field: &str) -> StoreResult<bool> {
        (**self).hash_exists(key, field).await
    }
    async fn list_push(&self, key: &str, value: &str) -> StoreResult<u64> {
        (**self).list_push(key, value).await
    }
    async fn list_range(&self, key: &str, from: usize, to: usize) -> StoreResult<Vec<String>> {
        (**self).list_range(key, from, to).await
    }
    async fn list_len(&self, key: &str) -> StoreResult<usize> {
        (**self).list_len(key).await
    }
    async fn zadd(&self, key: &str, score: i64, member: &str) -> StoreResult<()> {
        (**self).zadd(key, score, member).await
    }
    async fn zrange(&self, key: &str, from: usize, to: usize) -> StoreResult<Vec<String>> {
        (**self).zrange(key, from, to).await
    }
    async fn zcard(&self, key: &str) -> StoreResult<usize> {
        (**self).zcard(key).await
    }
    async fn str_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        (**self).str_set(key, value, ttl).await
    }
    async fn str_get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).str_get(key).await
    }
    async fn str_append(&self, key: &str, value: &str) -> StoreResult<()> {
        (**self).str_append(key, value).await
    }
    async fn str_del(&self, key: &str) -> StoreResult<()> {
        (**self).str_del(key).await
    }
    async fn incr(&self, key: &str, by: i64) -> StoreResult<i64> {
        (**self).incr(key, by).await
    }
    async fn commit(&self, multi: Multi) -> StoreResult<()> {
        (**self).commit(multi).await
    }
    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()> {
        (**self).publish(channel, payload).await
    }
    async fn subscribe_pattern(&self, pattern: &str) -> StoreResult<tokio::sync::broadcast::Receiver<(String, PubSubPayload)>> {
        (**self).subscribe_pattern(pattern).await
    }
}

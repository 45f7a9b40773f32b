//! Process-wide post-id → owning-thread-id mapping (spec §4.2).
//!
//! Populated at startup by scanning every `thread:{op}:posts` list reachable
//! from `tag:{board}:threads`, then kept live by a single task subscribed to
//! the wildcard thread-channel pattern — exactly the "tail the pub/sub
//! stream" shape spec.md §2 describes. A lookup miss just means the caller
//! hasn't observed a very recent insert yet; callers are expected to fall
//! back to a direct Store read rather than treat a miss as fatal.

use crate::store::{PubSubPayload, Store};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// A decoded notification the Registry's tailing task understands. Anything
/// else on the wildcard channel is ignored.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    InsertPost { id: u64, op: u64 },
    DeletePost { id: u64 },
}

#[derive(Default)]
pub struct Registry {
    map: RwLock<HashMap<u64, u64>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, id: u64) -> Option<u64> {
        self.map.read().expect("registry lock poisoned").get(&id).copied()
    }

    /// Records `id -> op`. Entries are never rewritten once set (invariant
    /// 4): a second `record` for the same id with a different op is a bug
    /// upstream, not something the Registry corrects — it logs and keeps
    /// the original mapping.
    pub fn record(&self, id: u64, op: u64) {
        let mut map = self.map.write().expect("registry lock poisoned");
        match map.get(&id) {
            Some(existing) if *existing != op => {
                warn!(id, existing, attempted = op, "registry: refusing to rewrite post->op mapping");
            }
            _ => {
                map.insert(id, op);
            }
        }
    }

    pub fn remove(&self, id: u64) {
        self.map.write().expect("registry lock poisoned").remove(&id);
    }

    pub fn len(&self) -> usize {
        self.map.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Populate from the Store at startup: walk every board's thread set,
    /// then every thread's reply list, recording `reply_id -> op` (and
    /// `op -> op` for the OP itself).
    pub async fn populate_from_store(&self, store: &dyn Store, boards: &[String]) -> crate::store::StoreResult<()> {
        for board in boards {
            let threads = store.zrange(&format!("tag:{board}:threads"), 0, usize::MAX).await?;
            for op_str in threads {
                let Ok(op) = op_str.parse::<u64>() else { continue };
                self.record(op, op);
                let replies = store.list_range(&format!("thread:{op}:posts"), 0, usize::MAX).await?;
                for reply_str in replies {
                    if let Ok(reply_id) = reply_str.parse::<u64>() {
                        self.record(reply_id, op);
                    }
                }
            }
        }
        debug!(entries = self.len(), "registry populated from store");
        Ok(())
    }
}

/// Decode a raw pub/sub payload into a [`RegistryEvent`], if it's one the
/// Registry cares about. Other message kinds on the same channel are `None`.
pub fn decode_registry_event(kind: &str, payload: &str) -> Option<RegistryEvent> {
    match kind {
        "insert_post" => {
            let (id_str, op_str) = payload.split_once(':')?;
            Some(RegistryEvent::InsertPost {
                id: id_str.parse().ok()?,
                op: op_str.parse().ok()?,
            })
        }
        "delete_post" => Some(RegistryEvent::DeletePost {
            id: payload.parse().ok()?,
        }),
        _ => None,
    }
}

/// Drive the Registry's live-maintenance task: one wildcard subscription,
/// applied until the channel closes (store shutdown) or the task is
/// cancelled. Intended to be `tokio::spawn`ed once from `main`.
pub async fn run_registry_tail(registry: Arc<Registry>, store: Arc<dyn Store>, pattern: &str) {
    let mut rx = match store.subscribe_pattern(pattern).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(error = %e, "registry: failed to subscribe to thread channel pattern");
            return;
        }
    };
    loop {
        match rx.recv().await {
            Ok((_channel, payload)) => apply_encoded(&registry, &payload),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "registry: tailing task lagged, some inserts may be missed until next Store fallback");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn apply_encoded(registry: &Registry, payload: &PubSubPayload) {
    let Some((kind, body)) = payload.split_once('|') else {
        return;
    };
    match decode_registry_event(kind, body) {
        Some(RegistryEvent::InsertPost { id, op }) => registry.record(id, op),
        Some(RegistryEvent::DeletePost { id }) => registry.remove(id),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn record_is_monotonic_and_never_rewritten() {
        let r = Registry::new();
        r.record(5, 1);
        r.record(5, 2); // refused, logged
        assert_eq!(r.lookup(5), Some(1));
    }

    #[test]
    fn remove_clears_entry() {
        let r = Registry::new();
        r.record(5, 1);
        r.remove(5);
        assert_eq!(r.lookup(5), None);
    }

    #[tokio::test]
    async fn populate_from_store_walks_boards_and_threads() {
        let store = MemoryStore::new();
        store.zadd("tag:a:threads", 100, "1").await.unwrap();
        store.list_push("thread:1:posts", "2").await.unwrap();
        store.list_push("thread:1:posts", "3").await.unwrap();

        let r = Registry::new();
        r.populate_from_store(&store, &["a".to_string()]).await.unwrap();
        assert_eq!(r.lookup(1), Some(1));
        assert_eq!(r.lookup(2), Some(1));
        assert_eq!(r.lookup(3), Some(1));
    }

    #[test]
    fn decodes_insert_and_delete_events() {
        match decode_registry_event("insert_post", "42:7") {
            Some(RegistryEvent::InsertPost { id, op }) => {
                assert_eq!(id, 42);
                assert_eq!(op, 7);
            }
            other => panic!("unexpected: {other:?}"),
        }
        match decode_registry_event("delete_post", "42") {
            Some(RegistryEvent::DeletePost { id }) => assert_eq!(id, 42),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(decode_registry_event("unrelated", "x").is_none());
    }
}

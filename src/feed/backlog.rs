//! Per-thread append-only message log (spec §4.7).
//!
//! Modeled on the donor's ring-buffer-plus-counter shape, but without an
//! eviction cap: the Backlog is the thing late joiners replay against, so
//! dropping old entries would break "replay from counter k" for anyone who
//! fell far behind. Durability comes from mirroring each push to the
//! Store's `thread:{op}:history` list (spec §6); the in-memory `Vec` is the
//! hot-path read path.

use crate::store::Store;
use std::sync::Arc;
use tokio::sync::Notify;

/// A single logged entry: its strictly-increasing counter plus the already
/// wire-encoded message bytes.
#[derive(Debug, Clone)]
pub struct BacklogEntry {
    pub counter: u64,
    pub encoded: String,
}

/// Owned exclusively by a single `Feed` task — no internal lock, matching
/// the "Feed is the only mutator" rule in spec §5.
pub struct Backlog {
    op: u64,
    entries: Vec<BacklogEntry>,
    next_counter: u64,
    notify: Arc<Notify>,
}

impl Backlog {
    pub fn new(op: u64) -> Self {
        Self {
            op,
            entries: Vec::new(),
            next_counter: 0,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Append `encoded`, returning the counter it was assigned. Mirrors the
    /// entry into the Store's history list for durability; best-effort —
    /// a mirror failure is logged by the caller (the in-memory copy is
    /// already authoritative for live subscribers).
    pub async fn append(&mut self, encoded: String, store: &dyn Store) -> crate::store::StoreResult<u64> {
        let counter = self.next_counter;
        self.next_counter += 1;
        self.entries.push(BacklogEntry {
            counter,
            encoded: encoded.clone(),
        });
        self.notify.notify_waiters();
        store.list_push(&format!("thread:{}:history", self.op), &encoded).await?;
        Ok(counter)
    }

    /// All entries with `counter` in `(from, to]`-ish semantics: every entry
    /// whose counter is `> from` — used for "replay everything I haven't
    /// seen yet" (spec §4.4 `subscribe`).
    pub fn range_from(&self, from: u64) -> Vec<BacklogEntry> {
        self.entries.iter().filter(|e| e.counter >= from).cloned().collect()
    }

    pub fn length(&self) -> u64 {
        self.next_counter
    }

    pub fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn append_assigns_gap_free_monotone_counters() {
        let store = MemoryStore::new();
        let mut backlog = Backlog::new(42);
        let c0 = backlog.append("a".into(), &store).await.unwrap();
        let c1 = backlog.append("b".into(), &store).await.unwrap();
        let c2 = backlog.append("c".into(), &store).await.unwrap();
        assert_eq!((c0, c1, c2), (0, 1, 2));
        assert_eq!(backlog.length(), 3);
    }

    #[tokio::test]
    async fn range_from_replays_without_gaps() {
        let store = MemoryStore::new();
        let mut backlog = Backlog::new(1);
        for i in 0..5 {
            backlog.append(format!("msg{i}"), &store).await.unwrap();
        }
        let replay = backlog.range_from(2);
        let counters: Vec<u64> = replay.iter().map(|e| e.counter).collect();
        assert_eq!(counters, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn mirrors_into_store_history_list() {
        let store = MemoryStore::new();
        let mut backlog = Backlog::new(7);
        backlog.append("hello".into(), &store).await.unwrap();
        let history = store.list_range("thread:7:history", 0, usize::MAX).await.unwrap();
        assert_eq!(history, vec!["hello".to_string()]);
    }
}

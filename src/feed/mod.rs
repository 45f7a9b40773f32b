//! `FeedHub` and `Feed` (spec §4.4): one actor per live thread, multiplexing
//! broadcasts to subscribed clients and mirroring each thread's currently
//! open post bodies. Mirrors the donor's map-of-actors shape (`SessionManager`
//! holding one entry per session) but each `Feed` here is itself an actor —
//! a dedicated task owning an mpsc command queue is the sole mutator of its
//! subscriber list and `open_bodies` mirror, so there are no locks on the
//! broadcast hot path (spec §5).

pub mod backlog;

use crate::store::Store;
use crate::wire::{self, WireMessage};
use backlog::Backlog;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

const SUBSCRIBER_QUEUE_DEPTH: usize = 256;
const FEED_COMMAND_QUEUE_DEPTH: usize = 1024;

enum FeedCommand {
    Subscribe {
        client: Uuid,
        last_seen: u64,
        tx: mpsc::Sender<WireMessage>,
        done: oneshot::Sender<()>,
    },
    Unsubscribe {
        client: Uuid,
    },
    SetOpenBody {
        post_id: u64,
        body: String,
        msg: WireMessage,
    },
    InsertImage {
        post_id: u64,
        msg: WireMessage,
    },
    SpoilerImage {
        post_id: u64,
        msg: WireMessage,
    },
    ClosePost {
        post_id: u64,
    },
    Send {
        msg: WireMessage,
    },
    SubscriberCount {
        reply: oneshot::Sender<usize>,
    },
}

/// A capability to a live `Feed`'s command queue. Cheap to clone; cloning a
/// `FeedHandle` never clones the Feed's state, only the sender half of its
/// queue (spec §9's "subscriptions hold a capability to the Feed").
#[derive(Clone)]
pub struct FeedHandle {
    pub op: u64,
    cmd_tx: mpsc::Sender<FeedCommand>,
}

impl FeedHandle {
    /// Register `client` with last-seen backlog counter `last_seen`; `tx` is
    /// the client's outbound send queue. Blocks (briefly, in-process) until
    /// the Feed has finished replaying backlog + open-body snapshots, so the
    /// caller knows synchronization happened before treating the client as
    /// `synced` (spec §4.6's handshaking → synced transition).
    pub async fn subscribe(&self, client: Uuid, last_seen: u64, tx: mpsc::Sender<WireMessage>) {
        let (done_tx, done_rx) = oneshot::channel();
        let _ = self
            .cmd_tx
            .send(FeedCommand::Subscribe {
                client,
                last_seen,
                tx,
                done: done_tx,
            })
            .await;
        let _ = done_rx.await;
    }

    pub async fn unsubscribe(&self, client: Uuid) {
        let _ = self.cmd_tx.send(FeedCommand::Unsubscribe { client }).await;
    }

    pub async fn set_open_body(&self, post_id: u64, body: String, msg: WireMessage) {
        let _ = self.cmd_tx.send(FeedCommand::SetOpenBody { post_id, body, msg }).await;
    }

    pub async fn insert_image(&self, post_id: u64, msg: WireMessage) {
        let _ = self.cmd_tx.send(FeedCommand::InsertImage { post_id, msg }).await;
    }

    pub async fn spoiler_image(&self, post_id: u64, msg: WireMessage) {
        let _ = self.cmd_tx.send(FeedCommand::SpoilerImage { post_id, msg }).await;
    }

    /// Evict `post_id`'s entry from the open-body mirror. Call once a post
    /// closes so later `subscribe()` replays don't resurrect a closed post's
    /// snapshot (spec §4.4) and the mirror doesn't grow without bound.
    pub async fn close_post(&self, post_id: u64) {
        let _ = self.cmd_tx.send(FeedCommand::ClosePost { post_id }).await;
    }

    pub async fn send(&self, msg: WireMessage) {
        let _ = self.cmd_tx.send(FeedCommand::Send { msg }).await;
    }

    pub async fn subscriber_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(FeedCommand::SubscriberCount { reply }).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

struct FeedActor {
    op: u64,
    store: Arc<dyn Store>,
    subscribers: HashMap<Uuid, mpsc::Sender<WireMessage>>,
    open_bodies: HashMap<u64, String>,
    backlog: Backlog,
}

impl FeedActor {
    /// Send `msg` to every subscriber; a subscriber whose queue is full is
    /// dropped rather than allowed to stall the broadcast (spec §4.6: a full
    /// queue drops that client's connection, never the Feed's progress).
    fn broadcast(&mut self, msg: &WireMessage) {
        let mut dead = Vec::new();
        for (client, tx) in &self.subscribers {
            if tx.try_send(msg.clone()).is_err() {
                dead.push(*client);
            }
        }
        for client in dead {
            self.subscribers.remove(&client);
            warn!(op = self.op, client = %client, "feed: dropped subscriber with full send queue");
        }
    }

    async fn append_and_broadcast(&mut self, msg: WireMessage) {
        match wire::encode(&msg) {
            Ok(encoded) => {
                if let Err(e) = self.backlog.append(encoded, self.store.as_ref()).await {
                    warn!(op = self.op, error = %e, "feed: failed to mirror backlog entry to store");
                }
            }
            Err(e) => warn!(op = self.op, error = %e, "feed: failed to encode message for backlog"),
        }
        self.broadcast(&msg);
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<FeedCommand>) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                FeedCommand::Subscribe { client, last_seen, tx, done } => {
                    for entry in self.backlog.range_from(last_seen) {
                        if let Ok(msg) = wire::decode(&entry.encoded) {
                            let _ = tx.try_send(msg);
                        }
                    }
                    for (post_id, body) in &self.open_bodies {
                        let snapshot = WireMessage::Splice(crate::wire::SplicePayload {
                            id: *post_id,
                            start: 0,
                            len: 0,
                            text: body.clone(),
                        });
                        let _ = tx.try_send(snapshot);
                    }
                    self.subscribers.insert(client, tx);
                    let _ = done.send(());
                }
                FeedCommand::Unsubscribe { client } => {
                    self.subscribers.remove(&client);
                }
                FeedCommand::SetOpenBody { post_id, body, msg } => {
                    self.open_bodies.insert(post_id, body);
                    self.append_and_broadcast(msg).await;
                }
                FeedCommand::InsertImage { post_id, msg } => {
                    let _ = post_id;
                    self.append_and_broadcast(msg).await;
                }
                FeedCommand::SpoilerImage { post_id, msg } => {
                    let _ = post_id;
                    self.append_and_broadcast(msg).await;
                }
                FeedCommand::ClosePost { post_id } => {
                    self.open_bodies.remove(&post_id);
                }
                FeedCommand::Send { msg } => {
                    self.append_and_broadcast(msg).await;
                }
                FeedCommand::SubscriberCount { reply } => {
                    let _ = reply.send(self.subscribers.len());
                }
            }
        }
        debug!(op = self.op, "feed actor shutting down, no handles remain");
    }
}

struct FeedEntry {
    handle: FeedHandle,
    empty_since: Option<Instant>,
}

/// Map of `thread_id -> Feed`, behind an `RwLock` (mirrors the donor's
/// `SessionManager` shape). Idle feeds are retained until
/// [`FeedHub::sweep_idle`] evicts them — not torn down the instant the last
/// subscriber leaves, since a reconnecting author may still hold an open
/// post there (spec §4.4).
pub struct FeedHub {
    store: Arc<dyn Store>,
    feeds: RwLock<HashMap<u64, FeedEntry>>,
    idle_eviction: Duration,
}

impl FeedHub {
    pub fn new(store: Arc<dyn Store>, idle_eviction: Duration) -> Self {
        Self {
            store,
            feeds: RwLock::new(HashMap::new()),
            idle_eviction,
        }
    }

    /// Get the handle for `op`'s feed, spawning its actor task if this is
    /// the first access.
    pub async fn get_or_create(&self, op: u64) -> FeedHandle {
        if let Some(entry) = self.feeds.read().await.get(&op) {
            return entry.handle.clone();
        }
        let mut feeds = self.feeds.write().await;
        if let Some(entry) = feeds.get(&op) {
            return entry.handle.clone();
        }
        let (cmd_tx, cmd_rx) = mpsc::channel(FEED_COMMAND_QUEUE_DEPTH);
        let actor = FeedActor {
            op,
            store: Arc::clone(&self.store),
            subscribers: HashMap::new(),
            open_bodies: HashMap::new(),
            backlog: Backlog::new(op),
        };
        tokio::spawn(actor.run(cmd_rx));
        let handle = FeedHandle { op, cmd_tx };
        feeds.insert(
            op,
            FeedEntry {
                handle: handle.clone(),
                empty_since: None,
            },
        );
        handle
    }

    /// Drop every feed that has had zero subscribers for longer than
    /// `idle_eviction`. Intended to be driven by a periodic background task.
    pub async fn sweep_idle(&self) {
        let mut to_check: Vec<u64> = self.feeds.read().await.keys().copied().collect();
        to_check.sort_unstable();
        let now = Instant::now();
        let mut feeds = self.feeds.write().await;
        for op in to_check {
            let Some(entry) = feeds.get_mut(&op) else { continue };
            let count = entry.handle.subscriber_count().await;
            if count > 0 {
                entry.empty_since = None;
                continue;
            }
            match entry.empty_since {
                None => entry.empty_since = Some(now),
                Some(since) if now.duration_since(since) >= self.idle_eviction => {
                    feeds.remove(&op);
                    debug!(op, "feedhub: evicted idle feed");
                }
                Some(_) => {}
            }
        }
    }

    pub async fn feed_count(&self) -> usize {
        self.feeds.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::wire::{SplicePayload, WireMessage};

    #[tokio::test]
    async fn subscribe_replays_backlog_then_open_body_snapshot() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let hub = FeedHub::new(store, Duration::from_secs(600));
        let handle = hub.get_or_create(1).await;

        handle
            .send(WireMessage::Splice(SplicePayload {
                id: 101,
                start: 0,
                len: 0,
                text: "hi".into(),
            }))
            .await;
        handle.set_open_body(101, "hi".to_string(), WireMessage::Append(crate::wire::AppendPayload { post_id: 101, rune: '!' as u32 })).await;

        let (tx, mut rx) = mpsc::channel(16);
        handle.subscribe(Uuid::new_v4(), 0, tx).await;

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, WireMessage::Splice(_)));
    }

    #[tokio::test]
    async fn close_post_evicts_open_body_snapshot() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let hub = FeedHub::new(store, Duration::from_secs(600));
        let handle = hub.get_or_create(1).await;

        handle.set_open_body(101, "hi".to_string(), WireMessage::Append(crate::wire::AppendPayload { post_id: 101, rune: '!' as u32 })).await;
        handle.close_post(101).await;

        let (tx, mut rx) = mpsc::channel(16);
        handle.subscribe(Uuid::new_v4(), 0, tx).await;

        let mut saw_snapshot = false;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, WireMessage::Splice(ref s) if s.id == 101 && s.start == 0 && s.len == 0) {
                saw_snapshot = true;
            }
        }
        assert!(!saw_snapshot, "closed post's open-body snapshot should not be replayed");
    }

    #[tokio::test]
    async fn full_subscriber_queue_is_dropped_not_blocking() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let hub = FeedHub::new(store, Duration::from_secs(600));
        let handle = hub.get_or_create(1).await;

        let (tx, _rx) = mpsc::channel(1);
        handle.subscribe(Uuid::new_v4(), 0, tx).await;
        assert_eq!(handle.subscriber_count().await, 1);

        for i in 0..10u32 {
            handle
                .send(WireMessage::Backspace(crate::wire::BackspacePayload { post_id: u64::from(i) }))
                .await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn sweep_idle_evicts_after_threshold() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let hub = FeedHub::new(store, Duration::from_millis(20));
        hub.get_or_create(1).await;
        assert_eq!(hub.feed_count().await, 1);
        hub.sweep_idle().await;
        assert_eq!(hub.feed_count().await, 1);
        tokio::time::sleep(Duration::from_millis(30)).await;
        hub.sweep_idle().await;
        assert_eq!(hub.feed_count().await, 0);
    }
}

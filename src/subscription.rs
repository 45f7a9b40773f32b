//! Per-connection session state (spec §4.6).
//!
//! A `Subscription` is owned by the connection's dispatch loop (see `ws`) —
//! it is not shared, so its fields need no internal locking; the loop that
//! owns it processes inbound messages strictly in arrival order, which is
//! what gives each Client FIFO-per-connection ordering (spec §5 guarantee 1).

use crate::feed::FeedHandle;
use crate::model::OpenPost;
use std::collections::HashMap;
use uuid::Uuid;

/// `connected -> handshaking -> synced -> (writing* | idle)* -> closed`
/// (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connected,
    Handshaking,
    Synced,
    Idle,
    Writing,
    Closed,
}

/// Per-connection session state: identity, throttling inputs, the one
/// OpenPost this client may hold, and its per-thread backlog cursors.
pub struct Subscription {
    pub id: Uuid,
    pub ip: String,
    pub session: String,
    pub state: ClientState,
    pub needs_captcha: bool,
    open: Option<OpenPost>,
    feeds: HashMap<u64, FeedHandle>,
    cursors: HashMap<u64, u64>,
}

impl Subscription {
    pub fn new(ip: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ip: ip.into(),
            session: session.into(),
            state: ClientState::Connected,
            needs_captcha: false,
            open: None,
            feeds: HashMap::new(),
            cursors: HashMap::new(),
        }
    }

    pub fn begin_handshake(&mut self) {
        if self.state == ClientState::Connected {
            self.state = ClientState::Handshaking;
        }
    }

    /// Record that this connection is now registered with `thread`'s Feed
    /// at cursor `cursor`. Transitions `handshaking -> synced` on first call.
    pub fn mark_synced(&mut self, thread: u64, cursor: u64, feed: FeedHandle) {
        self.feeds.insert(thread, feed);
        self.cursors.insert(thread, cursor);
        if matches!(self.state, ClientState::Connected | ClientState::Handshaking) {
            self.state = ClientState::Synced;
        }
        if matches!(self.state, ClientState::Synced) {
            self.state = ClientState::Idle;
        }
    }

    pub fn feed_for(&self, thread: u64) -> Option<&FeedHandle> {
        self.feeds.get(&thread)
    }

    pub fn cursor_for(&self, thread: u64) -> u64 {
        self.cursors.get(&thread).copied().unwrap_or(0)
    }

    pub fn advance_cursor(&mut self, thread: u64, cursor: u64) {
        self.cursors.insert(thread, cursor);
    }

    /// Invariant 2: a Client has at most one OpenPost at a time.
    pub fn has_open_post(&self) -> bool {
        self.open.is_some()
    }

    /// Begin composing `post` (idle -> writing). Fails if one is already
    /// open — the caller surfaces this as `CoreError::AlreadyOpen`.
    pub fn try_open(&mut self, post: OpenPost) -> Result<(), ()> {
        if self.open.is_some() {
            return Err(());
        }
        self.open = Some(post);
        if self.state == ClientState::Idle {
            self.state = ClientState::Writing;
        }
        Ok(())
    }

    pub fn open_mut(&mut self) -> Option<&mut OpenPost> {
        self.open.as_mut()
    }

    /// `closePost` clears the OpenPost and returns the client to idle
    /// (spec §4.5 step 4, §4.6).
    pub fn clear_open(&mut self) {
        self.open = None;
        if self.state == ClientState::Writing {
            self.state = ClientState::Idle;
        }
    }

    pub fn close(&mut self) {
        self.state = ClientState::Closed;
    }

    /// Unsubscribe this client from every Feed it joined and mark it closed.
    /// Intended to run once, when the connection's dispatch loop exits.
    pub async fn disconnect(&mut self) {
        for feed in self.feeds.values() {
            feed.unsubscribe(self.id).await;
        }
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Store};
    use std::sync::Arc;
    use std::time::Duration;

    async fn dummy_feed() -> FeedHandle {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let hub = crate::feed::FeedHub::new(store, Duration::from_secs(60));
        hub.get_or_create(1).await
    }

    #[tokio::test]
    async fn state_machine_progresses_through_handshake_to_idle() {
        let mut sub = Subscription::new("1.2.3.4", "sess");
        assert_eq!(sub.state, ClientState::Connected);
        sub.begin_handshake();
        assert_eq!(sub.state, ClientState::Handshaking);
        sub.mark_synced(1, 0, dummy_feed().await);
        assert_eq!(sub.state, ClientState::Idle);
    }

    #[tokio::test]
    async fn only_one_open_post_at_a_time() {
        let mut sub = Subscription::new("1.2.3.4", "sess");
        sub.mark_synced(1, 0, dummy_feed().await);
        assert!(sub.try_open(OpenPost::new(101, 101, "a")).is_ok());
        assert_eq!(sub.state, ClientState::Writing);
        assert!(sub.try_open(OpenPost::new(102, 101, "a")).is_err());
        sub.clear_open();
        assert_eq!(sub.state, ClientState::Idle);
        assert!(!sub.has_open_post());
    }
}

//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::feed::FeedHub;
use crate::model::{BoardPolicy, DiceResolver};
use crate::parser::FilterTable;
use crate::postwriter::PostWriter;
use crate::registry::Registry;
use crate::store::{MemoryStore, Store};
use crate::throttle::{Throttle, ThrottleConfig};

/// Shared application state for the boardcore server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    pub store: Arc<dyn Store>,
    /// Concrete handle to the same store as `store`, kept only so `main` can
    /// drive its periodic TTL sweep without downcasting the trait object.
    pub mem_store: Arc<MemoryStore>,
    pub registry: Arc<Registry>,
    pub feeds: Arc<FeedHub>,
    pub throttle: Arc<Throttle>,
    pub post_writer: Arc<PostWriter>,
    /// Per-board policy table (spec §9 design note: `#steal` and similar
    /// board-specific rules live behind this, never hardcoded in PostWriter).
    pub board_policies: Arc<Vec<BoardPolicy>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let mem_store = Arc::new(MemoryStore::new());
        let store: Arc<dyn Store> = Arc::clone(&mem_store) as Arc<dyn Store>;
        let registry = Arc::new(Registry::new());
        let feeds = Arc::new(FeedHub::new(
            Arc::clone(&store),
            Duration::from_secs(config.board.feed_idle_eviction_secs),
        ));
        let throttle = Arc::new(Throttle::new(ThrottleConfig {
            thread_throttle: Duration::from_secs(config.board.thread_throttle_secs),
            spam_score_threshold: config.board.spam_score_threshold,
        }));
        let board_policies = Arc::new(vec![
            BoardPolicy::new("a").allows_steal(),
            BoardPolicy::new("q").text_only(),
        ]);
        let post_writer = Arc::new(PostWriter {
            store: Arc::clone(&store),
            feeds: Arc::clone(&feeds),
            registry: Arc::clone(&registry),
            resolver: Arc::new(DiceResolver),
            filters: Arc::new(FilterTable::new()),
            throttle: Arc::clone(&throttle),
            max_body_len: config.board.max_body_len,
            max_lines: config.board.max_lines,
        });

        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
            store,
            mem_store,
            registry,
            feeds,
            throttle,
            post_writer,
            board_policies,
        }
    }
}

//! The mutation protocol (spec §4.5): every operation that changes a
//! specific open post. All operations require the caller already holds an
//! [`OpenPost`]; PostWriter itself never tracks which client owns which
//! post — that's the Subscription's job (spec §4.6). Each operation here
//! does its CPU work first (validate, mutate the buffer, encode the
//! broadcast message) and only then suspends on Store I/O and Feed enqueue,
//! per the no-suspend-mid-CPU-work rule in spec §5.

use crate::error::{CoreError, Result};
use crate::feed::FeedHub;
use crate::model::{BoardPolicy, Image, OpenPost, CHAR_SCORE, IMAGE_SCORE, MAX_BODY_LEN, MAX_LINES};
use crate::parser::{self, CommandTable, FilterTable};
use crate::registry::Registry;
use crate::store::{Multi, Store};
use crate::throttle::Throttle;
use crate::wire::{
    AppendPayload, BackspacePayload, ClosePostPayload, InsertImagePayload, SplicePayload, SpoilerPayload,
    StoleImageFromPayload, StoleImageToPayload, WireMessage,
};
use std::sync::Arc;

/// Everything a PostWriter operation needs beyond the caller's `OpenPost`.
pub struct PostWriter {
    pub store: Arc<dyn Store>,
    pub feeds: Arc<FeedHub>,
    pub registry: Arc<Registry>,
    pub resolver: Arc<dyn CommandTable>,
    pub filters: Arc<FilterTable>,
    pub throttle: Arc<Throttle>,
    /// Configured body/line limits (`[board] max_body_len`/`max_lines`).
    /// Callers that don't read them from `Config` can fall back to
    /// [`MAX_BODY_LEN`]/[`MAX_LINES`].
    pub max_body_len: usize,
    pub max_lines: usize,
}

impl PostWriter {
    fn policy_for<'a>(&self, policies: &'a [BoardPolicy], board: &str) -> Option<&'a BoardPolicy> {
        policies.iter().find(|p| p.tag == board)
    }

    /// Allocate a post id and make it visible: `reserve_post` then
    /// `insert_post` from spec §3's lifecycle paragraph. `op` is `None` to
    /// start a new thread (the new post becomes its own `op`) or `Some` to
    /// reply into an existing one. `sage` suppresses the bump.
    ///
    /// Post ids come from a single global counter (invariant 5) — a post id
    /// is consumed here even if the caller never finishes composing it, so
    /// gaps are expected and not a bug.
    pub async fn open_new_post(
        &self,
        board: &str,
        op: Option<u64>,
        name: String,
        tripcode: Option<String>,
        email: Option<String>,
        time: u64,
        sage: bool,
    ) -> Result<OpenPost> {
        let id = self.store.incr("postctr", 1).await.map_err(|e| CoreError::Store(e.0))? as u64;
        let thread_op = op.unwrap_or(id);

        if let Some(existing_op) = op {
            if !self.store.hash_exists(&format!("thread:{existing_op}"), "board").await.map_err(|e| CoreError::Store(e.0))? {
                return Err(CoreError::NoSuchThread);
            }
        }

        let mut multi = Multi::new()
            .hash_set(&format!("post:{id}"), "op", &thread_op.to_string())
            .hash_set(&format!("post:{id}"), "board", board)
            .hash_set(&format!("post:{id}"), "name", &name)
            .hash_set(&format!("post:{id}"), "time", &time.to_string())
            .str_set(&format!("post:{id}:body"), "", None);
        if let Some(trip) = &tripcode {
            multi = multi.hash_set(&format!("post:{id}"), "tripcode", trip);
        }
        if let Some(addr) = &email {
            multi = multi.hash_set(&format!("post:{id}"), "email", addr);
        }

        if op.is_none() {
            multi = multi.hash_set(&format!("thread:{thread_op}"), "board", board);
        } else {
            multi = multi.list_push(&format!("thread:{thread_op}:posts"), &id.to_string());
        }

        // Bumping moves a thread's sort key (spec §9): suppressed by `sage`,
        // and always applied (to `1`) the first time a thread is created.
        if op.is_none() || !sage {
            let bumpctr = self.store.incr(&format!("thread:{thread_op}:bumpctr"), 1).await.map_err(|e| CoreError::Store(e.0))?;
            multi = multi.hash_set(&format!("thread:{thread_op}"), "bumpctr", &bumpctr.to_string()).zadd(&format!("tag:{board}:threads"), bumpctr, &thread_op.to_string());
        }

        // Feeds the Registry's live tail (registry.rs) so other processes'
        // Registries observe this insert without waiting on populate_from_store.
        multi = multi.publish(&format!("thread:{thread_op}"), &format!("insert_post|{id}:{thread_op}"));

        self.store.commit(multi).await.map_err(|e| CoreError::Store(e.0))?;
        self.registry.record(id, thread_op);

        let feed = self.feeds.get_or_create(thread_op).await;
        feed.send(WireMessage::InsertPost(crate::wire::InsertPostPayload {
            num: id,
            op: thread_op,
            time,
            name,
            tripcode,
            email,
            image: None,
        }))
        .await;

        Ok(OpenPost::new(id, thread_op, board))
    }

    /// `appendRune` — spec §4.5. Returns whether this write pushed the
    /// author's spam score over the captcha threshold (spec §4.8); the
    /// caller (the connection's Subscription) is responsible for acting on
    /// that by refusing further writes until a fresh captcha is solved.
    pub async fn append_rune(&self, open: &mut OpenPost, ip: &str, session: &str, rune: char) -> Result<bool> {
        if open.len + 1 > self.max_body_len {
            return Err(CoreError::BodyTooLong);
        }
        if !parser::is_printable(rune, true) {
            return Err(CoreError::NonPrintable);
        }
        if rune == '\n' && open.lines + 1 > self.max_lines {
            return Err(CoreError::TooManyLines);
        }

        let msg = WireMessage::Append(AppendPayload {
            post_id: open.id,
            rune: rune as u32,
        });

        open.body.push(rune);
        open.len += 1;
        if rune == '\n' {
            open.lines += 1;
        }

        self.update_body(open, &msg).await?;
        let captcha = self
            .throttle
            .increment_spam_score(self.store.as_ref(), session, ip, CHAR_SCORE as i64)
            .await
            .map_err(|e| CoreError::Store(e.0))?;
        Ok(captcha)
    }

    /// `backspace` — spec §4.5.
    pub async fn backspace(&self, open: &mut OpenPost, ip: &str, session: &str) -> Result<bool> {
        if open.len == 0 {
            return Err(CoreError::EmptyPost);
        }
        let removed = open.body.pop().ok_or(CoreError::EmptyPost)?;
        open.len -= 1;
        if removed == '\n' {
            open.lines -= 1;
        }

        let msg = WireMessage::Backspace(BackspacePayload { post_id: open.id });
        self.update_body(open, &msg).await?;
        let captcha = self
            .throttle
            .increment_spam_score(self.store.as_ref(), session, ip, CHAR_SCORE as i64)
            .await
            .map_err(|e| CoreError::Store(e.0))?;
        Ok(captcha)
    }

    /// `spliceText` — spec §4.5. `start`/`del_len` are rune indices.
    pub async fn splice_text(
        &self,
        open: &mut OpenPost,
        ip: &str,
        session: &str,
        start: usize,
        del_len: usize,
        text: &str,
    ) -> Result<bool> {
        let current_rune_len = open.len;
        let text_rune_len = text.chars().count();

        if start > self.max_body_len
            || del_len > self.max_body_len
            || start + del_len > current_rune_len
            || (del_len == 0 && text.is_empty())
            || text_rune_len > self.max_body_len
            || text.contains('\0')
            || !parser::all_printable(text, true)
        {
            return if del_len == 0 && text.is_empty() {
                Err(CoreError::SpliceNoop)
            } else {
                Err(CoreError::SpliceOutOfRange)
            };
        }

        let new_len_unclamped = current_rune_len - del_len + text_rune_len;
        let mut final_text = text.to_string();
        let mut broadcast_len = del_len;
        let mut overflowed = false;

        if new_len_unclamped > self.max_body_len {
            let overflow = new_len_unclamped - self.max_body_len;
            let keep = text_rune_len.saturating_sub(overflow);
            final_text = text.chars().take(keep).collect();
            broadcast_len = current_rune_len - start;
            overflowed = true;
        }

        // Copy-on-splice: rebuild into a fresh String rather than mutating
        // the shared buffer in place (spec §5, §9).
        let start_byte = open.byte_offset(start);
        let end_byte = open.byte_offset(start + del_len);
        let retained_tail = &open.body[end_byte..];
        // When the insert overflows the body cap, `broadcast_len` widens to
        // cover the whole tail from `start` onward, so the broadcast text
        // must include that tail too or a client replaying
        // `body[0:start] + text + body[start+len:]` truncates the post.
        let broadcast_text = if overflowed {
            format!("{final_text}{retained_tail}")
        } else {
            final_text.clone()
        };
        let mut rebuilt = String::with_capacity(open.body.len() - (end_byte - start_byte) + final_text.len());
        rebuilt.push_str(&open.body[..start_byte]);
        rebuilt.push_str(&final_text);
        rebuilt.push_str(retained_tail);

        let new_lines = rebuilt.matches('\n').count();
        if new_lines > self.max_lines {
            return Err(CoreError::TooManyLines);
        }

        open.body = rebuilt;
        open.len = open.body.chars().count();
        open.lines = new_lines + 1;

        let msg = WireMessage::Splice(SplicePayload {
            id: open.id,
            start,
            len: broadcast_len,
            text: broadcast_text,
        });

        self.update_body(open, &msg).await?;
        let score = final_text.chars().count() as i64 + 1;
        let captcha = self
            .throttle
            .increment_spam_score(self.store.as_ref(), session, ip, score)
            .await
            .map_err(|e| CoreError::Store(e.0))?;
        Ok(captcha)
    }

    /// `closePost` — spec §4.5. `board_policies` are consulted for the
    /// `#steal` rule; `identity` is this client's opaque author token.
    pub async fn close_post(
        &self,
        open: &mut OpenPost,
        ip: &str,
        session: &str,
        policies: &[BoardPolicy],
    ) -> Result<()> {
        let policy = self.policy_for(policies, &open.board);

        if open.len > 0 {
            let handled = self.filters.apply_filters(&open.board, &mut open.body);
            if handled {
                let msg = WireMessage::Splice(SplicePayload {
                    id: open.id,
                    start: 0,
                    len: open.len,
                    text: open.body.clone(),
                });
                open.len = open.body.chars().count();
                open.lines = open.body.matches('\n').count() + 1;
                self.feeds.get_or_create(open.op).await.set_open_body(open.id, open.body.clone(), msg).await;
            }
        }

        let parsed = parser::parse_body(&open.body, &self.registry, self.resolver.as_ref(), open.id, true);

        let allows_steal = policy.is_some_and(|p| p.allows_steal);
        if allows_steal && open.body.contains("#steal") {
            if let Some(&from_id) = parsed.links.last() {
                if let Ok(Some(image)) = self.steal_image(from_id, open.id).await {
                    let from_op = self.op_of(from_id).await;
                    self.feeds
                        .get_or_create(from_op.unwrap_or(open.op))
                        .await
                        .send(WireMessage::StoleImageFrom(StoleImageFromPayload { from_id }))
                        .await;
                    self.feeds
                        .get_or_create(open.op)
                        .await
                        .send(WireMessage::StoleImageTo(StoleImageToPayload { id: open.id, image }))
                        .await;
                    let _ = self
                        .throttle
                        .increment_spam_score(self.store.as_ref(), session, ip, IMAGE_SCORE as i64)
                        .await;
                }
            }
        }

        let mut multi = Multi::new()
            .hash_set(&format!("post:{}", open.id), "body", &open.body)
            .hash_set(&format!("post:{}", open.id), "closed", "1")
            .str_del(&format!("post:{}:body", open.id));
        for link in &parsed.links {
            multi = multi.hash_set(&format!("post:{}:links", open.id), &link.to_string(), "1");
        }
        self.store.commit(multi).await.map_err(|e| CoreError::Store(e.0))?;

        let feed = self.feeds.get_or_create(open.op).await;
        feed.send(WireMessage::ClosePost(ClosePostPayload { id: open.id })).await;
        feed.close_post(open.id).await;

        open.is_open = false;
        Ok(())
    }

    /// Resolve `id`'s owning thread, falling back to a direct Store read
    /// when the in-process Registry hasn't observed it yet (registry.rs
    /// documents lookup misses as expected, not fatal).
    async fn op_of(&self, id: u64) -> Option<u64> {
        if let Some(op) = self.registry.lookup(id) {
            return Some(op);
        }
        self.store
            .hash_get(&format!("post:{id}"), "op")
            .await
            .ok()
            .flatten()
            .and_then(|s| s.parse().ok())
    }

    /// Transfer the image owned by `from_id` onto `to_id`, atomically.
    /// Returns `Ok(None)` if `from_id` has no image to steal.
    async fn steal_image(&self, from_id: u64, to_id: u64) -> Result<Option<Image>> {
        let Some(image_json) = self.store.hash_get(&format!("post:{from_id}"), "image").await.map_err(|e| CoreError::Store(e.0))? else {
            return Ok(None);
        };
        let image: Image = serde_json::from_str(&image_json).map_err(|e| CoreError::Invariant(e.to_string()))?;

        let multi = Multi::new()
            .hash_set(&format!("post:{from_id}"), "image", "")
            .hash_set(&format!("post:{to_id}"), "image", &image_json)
            .hash_set("MD5s", &image.md5, &to_id.to_string());
        self.store.commit(multi).await.map_err(|e| CoreError::Store(e.0))?;
        Ok(Some(image))
    }

    /// `insertImage` — spec §4.5.
    pub async fn insert_image(
        &self,
        open: &mut OpenPost,
        policies: &[BoardPolicy],
        token: &str,
        name: &str,
        spoiler: bool,
    ) -> Result<()> {
        let policy = self.policy_for(policies, &open.board);
        if policy.is_some_and(|p| p.text_only) {
            return Err(CoreError::TextOnlyBoard);
        }
        let existing = self.store.hash_get(&format!("post:{}", open.id), "image").await.map_err(|e| CoreError::Store(e.0))?;
        if existing.is_some_and(|v| !v.is_empty()) {
            return Err(CoreError::HasImage);
        }

        let staged = self.store.str_get(&format!("imgtoken:{token}")).await.map_err(|e| CoreError::Store(e.0))?;
        let Some(staged_json) = staged else {
            return Err(CoreError::ImageTokenInvalid);
        };
        let mut image: Image = serde_json::from_str(&staged_json).map_err(|_| CoreError::ImageTokenInvalid)?;
        image.spoiler = spoiler;

        if self.store.hash_exists("MD5s", &image.md5).await.map_err(|e| CoreError::Store(e.0))? {
            return Err(CoreError::DuplicateImage);
        }

        let image_json = serde_json::to_string(&image).map_err(|e| CoreError::Invariant(e.to_string()))?;
        let multi = Multi::new()
            .hash_set(&format!("post:{}", open.id), "image", &image_json)
            .hash_set("MD5s", &image.md5, &open.id.to_string())
            .str_del(&format!("imgtoken:{token}"))
            .incr(&format!("thread:{}:imgctr", open.op), 1);
        let _ = name;
        self.store.commit(multi).await.map_err(|e| CoreError::Store(e.0))?;

        self.feeds
            .get_or_create(open.op)
            .await
            .insert_image(
                open.id,
                WireMessage::InsertImage(InsertImagePayload {
                    id: open.id,
                    image,
                    spoiler,
                }),
            )
            .await;
        Ok(())
    }

    /// `spoilerImage` — spec §4.5. Idempotent.
    pub async fn spoiler_image(&self, open: &mut OpenPost, ip: &str, session: &str) -> Result<bool> {
        let key = format!("post:{}", open.id);
        let Some(image_json) = self.store.hash_get(&key, "image").await.map_err(|e| CoreError::Store(e.0))? else {
            return Err(CoreError::HasImage);
        };
        if image_json.is_empty() {
            return Err(CoreError::HasImage);
        }
        let mut image: Image = serde_json::from_str(&image_json).map_err(|e| CoreError::Invariant(e.to_string()))?;
        if image.spoiler {
            return Ok(false); // already spoilered: NOOP
        }
        image.spoiler = true;
        let updated = serde_json::to_string(&image).map_err(|e| CoreError::Invariant(e.to_string()))?;
        self.store.hash_set(&key, "image", &updated).await.map_err(|e| CoreError::Store(e.0))?;

        self.feeds.get_or_create(open.op).await.spoiler_image(open.id, WireMessage::Spoiler(SpoilerPayload { post_id: open.id })).await;
        let captcha = self
            .throttle
            .increment_spam_score(self.store.as_ref(), session, ip, CHAR_SCORE as i64)
            .await
            .map_err(|e| CoreError::Store(e.0))?;
        Ok(captcha)
    }

    /// Shared tail of append/backspace/splice: write the new open body to
    /// the Store and hand the broadcast message to the Feed (spec §4.5's
    /// `updateBody`).
    async fn update_body(&self, open: &OpenPost, msg: &WireMessage) -> Result<()> {
        self.store
            .str_set(&format!("post:{}:body", open.id), &open.body, None)
            .await
            .map_err(|e| CoreError::Store(e.0))?;
        self.feeds.get_or_create(open.op).await.set_open_body(open.id, open.body.clone(), msg.clone()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiceResolver;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn writer() -> PostWriter {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        PostWriter {
            store: Arc::clone(&store),
            feeds: Arc::new(FeedHub::new(store, Duration::from_secs(600))),
            registry: Arc::new(Registry::new()),
            resolver: Arc::new(DiceResolver),
            filters: Arc::new(FilterTable::new()),
            throttle: Arc::new(Throttle::new(Default::default())),
            max_body_len: MAX_BODY_LEN,
            max_lines: MAX_LINES,
        }
    }

    fn writer_with_limits(max_body_len: usize, max_lines: usize) -> PostWriter {
        PostWriter { max_body_len, max_lines, ..writer() }
    }

    #[tokio::test]
    async fn boundary_scenario_1_append_three_runes() {
        let pw = writer();
        let mut open = OpenPost::new(101, 101, "a");
        for c in ['a', 'b', 'c'] {
            pw.append_rune(&mut open, "1.1.1.1", "s", c).await.unwrap();
        }
        assert_eq!(open.body, "abc");
        assert_eq!(open.len, 3);
        assert_eq!(open.lines, 1);
    }

    #[tokio::test]
    async fn boundary_scenario_2_splice_replaces_range() {
        let pw = writer();
        let mut open = OpenPost::new(101, 101, "a");
        open.body = "hello".to_string();
        open.len = 5;
        pw.splice_text(&mut open, "1.1.1.1", "s", 1, 3, "EY").await.unwrap();
        assert_eq!(open.body, "hEYo");
        assert_eq!(open.len, 4);
    }

    #[tokio::test]
    async fn boundary_scenario_3_splice_overflow_trims_but_broadcasts_full_tail() {
        let pw = writer_with_limits(6, MAX_LINES);
        let mut open = OpenPost::new(101, 101, "a");
        open.body = "abcde".to_string();
        open.len = 5;

        let feed = pw.feeds.get_or_create(open.op).await;
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        feed.subscribe(uuid::Uuid::new_v4(), 0, tx).await;

        pw.splice_text(&mut open, "1.1.1.1", "s", 0, 0, "XYZ").await.unwrap();

        // Inserting "XYZ" at the front would make the body 8 runes; trimmed
        // to the 6-rune cap keeps only "X" of the insert.
        assert_eq!(open.body, "Xabcde");
        assert_eq!(open.len, 6);

        let msg = rx.recv().await.unwrap();
        match msg {
            WireMessage::Splice(s) => {
                assert_eq!(s.start, 0);
                assert_eq!(s.len, 5); // current_rune_len - start, widened past del_len
                // Broadcast text must include the retained tail, or a client
                // computing body[0:start] + text + body[start+len:] discards it.
                assert_eq!(s.text, "Xabcde");
            }
            other => panic!("expected Splice, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn boundary_scenario_4_empty_splice_is_noop_error() {
        let pw = writer();
        let mut open = OpenPost::new(101, 101, "a");
        let err = pw.splice_text(&mut open, "1.1.1.1", "s", 0, 0, "").await.unwrap_err();
        assert!(matches!(err, CoreError::SpliceNoop));
    }

    #[tokio::test]
    async fn boundary_scenario_5_double_backspace_on_single_char() {
        let pw = writer();
        let mut open = OpenPost::new(101, 101, "a");
        open.body = "x".to_string();
        open.len = 1;
        pw.backspace(&mut open, "1.1.1.1", "s").await.unwrap();
        let err = pw.backspace(&mut open, "1.1.1.1", "s").await.unwrap_err();
        assert!(matches!(err, CoreError::EmptyPost));
    }

    #[tokio::test]
    async fn append_then_backspace_round_trips_body_and_len() {
        let pw = writer();
        let mut open = OpenPost::new(101, 101, "a");
        pw.append_rune(&mut open, "1.1.1.1", "s", 'x').await.unwrap();
        pw.backspace(&mut open, "1.1.1.1", "s").await.unwrap();
        assert_eq!(open.body, "");
        assert_eq!(open.len, 0);
    }

    #[tokio::test]
    async fn splice_out_of_range_is_rejected() {
        let pw = writer();
        let mut open = OpenPost::new(101, 101, "a");
        open.body = "hi".to_string();
        open.len = 2;
        let err = pw.splice_text(&mut open, "1.1.1.1", "s", 5, 0, "x").await.unwrap_err();
        assert!(matches!(err, CoreError::SpliceOutOfRange));
    }

    #[tokio::test]
    async fn open_new_post_starts_a_thread_and_registers_its_op() {
        let pw = writer();
        let open = pw.open_new_post("a", None, "Anonymous".to_string(), None, None, 1_000, false).await.unwrap();
        assert_eq!(open.op, open.id);
        assert_eq!(pw.registry.lookup(open.id), Some(open.id));
    }

    #[tokio::test]
    async fn open_new_post_reply_bumps_unless_sage() {
        let pw = writer();
        let thread = pw.open_new_post("a", None, "Anonymous".to_string(), None, None, 1_000, false).await.unwrap();
        let reply = pw
            .open_new_post("a", Some(thread.op), "Anonymous".to_string(), None, None, 1_001, false)
            .await
            .unwrap();
        assert_eq!(reply.op, thread.op);
        assert_ne!(reply.id, thread.id);
        let bumpctr = pw.store.hash_get(&format!("thread:{}", thread.op), "bumpctr").await.unwrap();
        assert_eq!(bumpctr, Some("2".to_string()));
    }

    #[tokio::test]
    async fn open_new_post_reply_to_missing_thread_fails() {
        let pw = writer();
        let err = pw.open_new_post("a", Some(999), "Anonymous".to_string(), None, None, 1_000, false).await.unwrap_err();
        assert!(matches!(err, CoreError::NoSuchThread));
    }

    #[tokio::test]
    async fn steal_publishes_stole_from_to_the_source_thread_not_the_destination() {
        let pw = writer();
        let policies = vec![BoardPolicy::new("a").allows_steal()];

        // Source post 101 lives in thread 101 and owns an image.
        let image = Image {
            source_name: "f.png".to_string(),
            server_name: "f-server.png".to_string(),
            thumb_name: "f-thumb.png".to_string(),
            md5: "deadbeef".to_string(),
            src_dims: (1, 1),
            thumb_dims: (1, 1),
            size_bytes: 1,
            spoiler: false,
        };
        pw.store
            .hash_set("post:101", "image", &serde_json::to_string(&image).unwrap())
            .await
            .unwrap();
        pw.registry.record(101, 101);

        // Destination post 202 lives in a different thread, 900, and links
        // back to 101 with #steal.
        pw.registry.record(900, 900);
        pw.registry.record(202, 900);

        let source_feed = pw.feeds.get_or_create(101).await;
        let (src_tx, mut src_rx) = tokio::sync::mpsc::channel(16);
        source_feed.subscribe(uuid::Uuid::new_v4(), 0, src_tx).await;

        let dest_feed = pw.feeds.get_or_create(900).await;
        let (dst_tx, mut dst_rx) = tokio::sync::mpsc::channel(16);
        dest_feed.subscribe(uuid::Uuid::new_v4(), 0, dst_tx).await;

        let mut open = OpenPost::new(202, 900, "a");
        open.body = ">>101 #steal".to_string();
        open.len = open.body.chars().count();
        pw.close_post(&mut open, "1.1.1.1", "s", &policies).await.unwrap();

        let from_msg = src_rx.recv().await.unwrap();
        assert!(matches!(from_msg, WireMessage::StoleImageFrom(_)), "source thread should see StoleImageFrom");

        let mut saw_to = false;
        while let Ok(msg) = dst_rx.try_recv() {
            if matches!(msg, WireMessage::StoleImageTo(_)) {
                saw_to = true;
            }
        }
        assert!(saw_to, "destination thread should see StoleImageTo");
    }

    #[tokio::test]
    async fn insert_image_fails_on_text_only_board() {
        let pw = writer();
        let mut open = OpenPost::new(101, 101, "a");
        let policies = vec![BoardPolicy::new("a").text_only()];
        let err = pw.insert_image(&mut open, &policies, "tok", "f.png", false).await.unwrap_err();
        assert!(matches!(err, CoreError::TextOnlyBoard));
    }
}

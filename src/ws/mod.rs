//! WebSocket transport for the posting protocol (spec §4.6, §6).
//!
//! ## Connection lifecycle
//!
//! 1. Client connects to `GET /api/ws?session=<opaque-id>`. The session id is
//!    an opaque client-supplied string used purely for spam-score bucketing
//!    (spec §4.8) — it is not an auth token, since boardcore has no concept
//!    of accounts.
//! 2. Every frame is `<2-digit kind><json-payload>` (spec §6, [`crate::wire`]).
//! 3. `Synchronise` joins a thread's Feed at a backlog cursor; `ReservePost`
//!    opens a new post (starting a thread or replying); `Append`/`Backspace`/
//!    `Splice`/`Spoiler`/`InsertImageRequest` mutate the sender's open post;
//!    `ClosePost` finalizes it.
//! 4. On disconnect the connection's [`Subscription`] is torn down: every
//!    Feed it joined is unsubscribed (spec §4.6's `closed` transition).

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::subscription::Subscription;
use crate::wire::{self, ErrorPayload, WireMessage};
use crate::state::AppState;

const SEND_QUEUE_DEPTH: usize = 256;

/// Query parameters for the WebSocket upgrade request.
#[derive(Deserialize)]
pub struct WsQuery {
    /// Opaque per-browser-tab identifier, used only for spam-score bucketing.
    pub session: String,
}

/// `GET /api/ws?session=<id>` — WebSocket upgrade handler.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state, addr.ip().to_string(), query.session))
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Main per-connection event loop.
///
/// Splits the socket into a sink (outgoing) and stream (incoming). Outgoing
/// traffic — direct replies to this connection *and* every Feed broadcast it
/// is subscribed to — already funnels through the same `tx`, so unlike a
/// transport with a second broadcast source there is only one thing to poll
/// here: the incoming WS stream.
#[allow(clippy::too_many_lines)]
async fn handle_ws(socket: WebSocket, state: AppState, ip: String, session: String) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<WireMessage>(SEND_QUEUE_DEPTH);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let body = match wire::encode(&msg) {
                Ok(b) => b,
                Err(e) => {
                    warn!(error = %e, "ws: failed to encode outbound message");
                    continue;
                }
            };
            if ws_sink.send(Message::Text(body.into())).await.is_err() {
                break;
            }
        }
    });

    let mut sub = Subscription::new(ip.clone(), session);
    sub.begin_handshake();
    debug!(client = %sub.id, %ip, "ws: connected");

    while let Some(Ok(msg)) = ws_stream.next().await {
        match msg {
            Message::Text(text) => {
                let decoded = match wire::decode(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        let _ = tx
                            .send(WireMessage::Error(ErrorPayload {
                                code: "bad_frame".to_string(),
                                message: e.to_string(),
                            }))
                            .await;
                        continue;
                    }
                };
                if let Err(e) = dispatch(&state, &mut sub, &tx, decoded).await {
                    let _ = tx
                        .send(WireMessage::Error(ErrorPayload {
                            code: e.code().to_string(),
                            message: e.to_string(),
                        }))
                        .await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    sub.disconnect().await;
    send_task.abort();
    debug!(client = %sub.id, "ws: disconnected");
}

/// Dispatch one decoded [`WireMessage`] against shared state and this
/// connection's [`Subscription`]. Kinds the server only ever emits
/// (`InsertPost`, `InsertImage`, `StoleImageFrom`, `StoleImageTo`, `Error`,
/// `Pong`) are rejected coming from a client.
async fn dispatch(
    state: &AppState,
    sub: &mut Subscription,
    tx: &mpsc::Sender<WireMessage>,
    msg: WireMessage,
) -> Result<(), CoreError> {
    match msg {
        WireMessage::Ping => {
            let _ = tx.send(WireMessage::Pong).await;
            Ok(())
        }

        WireMessage::Synchronise(p) => {
            let feed = state.feeds.get_or_create(p.thread).await;
            feed.subscribe(sub.id, p.cursor, tx.clone()).await;
            sub.mark_synced(p.thread, p.cursor, feed);
            Ok(())
        }

        WireMessage::ReservePost(p) => {
            if sub.has_open_post() {
                return Err(CoreError::AlreadyOpen);
            }
            if p.op.is_none()
                && state
                    .throttle
                    .check_throttle(state.store.as_ref(), &sub.ip)
                    .await
                    .map_err(|e| CoreError::Store(e.0))?
            {
                return Err(CoreError::IpThrottled);
            }

            let open = state
                .post_writer
                .open_new_post(&p.board, p.op, p.name, p.tripcode, p.email, now_secs(), p.sage)
                .await?;

            if p.op.is_none() {
                state
                    .throttle
                    .mark_thread_started(state.store.as_ref(), &sub.ip)
                    .await
                    .map_err(|e| CoreError::Store(e.0))?;
            }

            let feed = state.feeds.get_or_create(open.op).await;
            let last_seen = sub.cursor_for(open.op);
            feed.subscribe(sub.id, last_seen, tx.clone()).await;
            sub.mark_synced(open.op, last_seen, feed);
            sub.try_open(open).map_err(|()| CoreError::AlreadyOpen)
        }

        WireMessage::Append(p) => {
            let open = sub.open_mut().filter(|o| o.id == p.post_id).ok_or(CoreError::NoPostOpen)?;
            let rune = char::from_u32(p.rune).ok_or(CoreError::NonPrintable)?;
            let captcha = state.post_writer.append_rune(open, &sub.ip, &sub.session, rune).await?;
            sub.needs_captcha |= captcha;
            Ok(())
        }

        WireMessage::Backspace(p) => {
            let open = sub.open_mut().filter(|o| o.id == p.post_id).ok_or(CoreError::NoPostOpen)?;
            let captcha = state.post_writer.backspace(open, &sub.ip, &sub.session).await?;
            sub.needs_captcha |= captcha;
            Ok(())
        }

        WireMessage::Splice(p) => {
            let open = sub.open_mut().filter(|o| o.id == p.id).ok_or(CoreError::NoPostOpen)?;
            let captcha = state
                .post_writer
                .splice_text(open, &sub.ip, &sub.session, p.start, p.len, &p.text)
                .await?;
            sub.needs_captcha |= captcha;
            Ok(())
        }

        WireMessage::Spoiler(p) => {
            let open = sub.open_mut().filter(|o| o.id == p.post_id).ok_or(CoreError::NoPostOpen)?;
            let captcha = state.post_writer.spoiler_image(open, &sub.ip, &sub.session).await?;
            sub.needs_captcha |= captcha;
            Ok(())
        }

        WireMessage::InsertImageRequest(p) => {
            let open = sub.open_mut().filter(|o| o.id == p.post_id).ok_or(CoreError::NoPostOpen)?;
            state
                .post_writer
                .insert_image(open, &state.board_policies, &p.token, &p.name, p.spoiler)
                .await
        }

        WireMessage::ClosePost(p) => {
            let open = sub.open_mut().filter(|o| o.id == p.id).ok_or(CoreError::NoPostOpen)?;
            state.post_writer.close_post(open, &sub.ip, &sub.session, &state.board_policies).await?;
            sub.clear_open();
            Ok(())
        }

        WireMessage::Pong
        | WireMessage::InsertPost(_)
        | WireMessage::InsertImage(_)
        | WireMessage::StoleImageFrom(_)
        | WireMessage::StoleImageTo(_)
        | WireMessage::Error(_) => Err(CoreError::UnexpectedKind),
    }
}

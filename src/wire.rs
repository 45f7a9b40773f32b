//! Wire protocol: frame bodies of the form `<2-digit kind><json-payload>`
//! (spec §6). Axum's WebSocket transport already frames each message as a
//! unit, so there is no separate byte-level length-delimited codec here —
//! one WS message carries exactly one `WireMessage` body.

use crate::model::Image;
use serde::{Deserialize, Serialize};

macro_rules! kinds {
    ($($variant:ident = $code:expr),+ $(,)?) => {
        /// The message kind, encoded as a fixed 2-digit decimal prefix.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Kind {
            $($variant),+
        }

        impl Kind {
            pub fn code(self) -> &'static str {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            pub fn from_code(code: &str) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

kinds! {
    Append = "00",
    Backspace = "01",
    Splice = "02",
    InsertPost = "03",
    InsertImage = "04",
    Spoiler = "05",
    ClosePost = "06",
    StoleImageFrom = "07",
    StoleImageTo = "08",
    Synchronise = "09",
    Error = "10",
    Ping = "11",
    Pong = "12",
    /// C→S only: request to attach a staged image to the sender's open
    /// post. Not in spec.md's wire table (which only lists the resulting
    /// broadcast, `InsertImage`) — supplemented here because a client has
    /// to send *something* to trigger `insertImage` and the broadcast
    /// payload doesn't carry the upload token.
    InsertImageRequest = "13",
    /// C→S only: request to reserve+insert a new post (a fresh thread when
    /// `op` is absent, a reply otherwise). Not in spec.md's wire table
    /// either, for the same reason as `InsertImageRequest` — `reserve_post`/
    /// `insert_post` (spec §3) need a trigger and the table only documents
    /// the resulting `InsertPost` broadcast.
    ReservePost = "14",
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendPayload {
    pub post_id: u64,
    pub rune: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackspacePayload {
    pub post_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplicePayload {
    pub id: u64,
    pub start: usize,
    pub len: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertPostPayload {
    pub num: u64,
    pub op: u64,
    pub time: u64,
    pub name: String,
    pub tripcode: Option<String>,
    pub email: Option<String>,
    pub image: Option<Image>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertImagePayload {
    pub id: u64,
    pub image: Image,
    pub spoiler: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoilerPayload {
    pub post_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosePostPayload {
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoleImageFromPayload {
    pub from_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoleImageToPayload {
    pub id: u64,
    pub image: Image,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynchronisePayload {
    pub thread: u64,
    pub cursor: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertImageRequestPayload {
    pub post_id: u64,
    pub token: String,
    pub name: String,
    pub spoiler: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservePostPayload {
    pub board: String,
    pub op: Option<u64>,
    pub name: String,
    pub tripcode: Option<String>,
    pub email: Option<String>,
    pub sage: bool,
}

/// A fully decoded wire message.
#[derive(Debug, Clone)]
pub enum WireMessage {
    Append(AppendPayload),
    Backspace(BackspacePayload),
    Splice(SplicePayload),
    InsertPost(InsertPostPayload),
    InsertImage(InsertImagePayload),
    Spoiler(SpoilerPayload),
    ClosePost(ClosePostPayload),
    StoleImageFrom(StoleImageFromPayload),
    StoleImageTo(StoleImageToPayload),
    Synchronise(SynchronisePayload),
    Error(ErrorPayload),
    Ping,
    Pong,
    InsertImageRequest(InsertImageRequestPayload),
    ReservePost(ReservePostPayload),
}

impl WireMessage {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Append(_) => Kind::Append,
            Self::Backspace(_) => Kind::Backspace,
            Self::Splice(_) => Kind::Splice,
            Self::InsertPost(_) => Kind::InsertPost,
            Self::InsertImage(_) => Kind::InsertImage,
            Self::Spoiler(_) => Kind::Spoiler,
            Self::ClosePost(_) => Kind::ClosePost,
            Self::StoleImageFrom(_) => Kind::StoleImageFrom,
            Self::StoleImageTo(_) => Kind::StoleImageTo,
            Self::Synchronise(_) => Kind::Synchronise,
            Self::Error(_) => Kind::Error,
            Self::Ping => Kind::Ping,
            Self::Pong => Kind::Pong,
            Self::InsertImageRequest(_) => Kind::InsertImageRequest,
            Self::ReservePost(_) => Kind::ReservePost,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("frame too short to contain a kind prefix")]
    TooShort,
    #[error("unknown message kind {0:?}")]
    UnknownKind(String),
    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a [`WireMessage`] to its frame body: `<2-digit kind><json>`.
/// `Ping`/`Pong` carry no payload, so their body is just the kind prefix.
pub fn encode(msg: &WireMessage) -> Result<String, WireError> {
    let kind = msg.kind().code();
    let body = match msg {
        WireMessage::Append(p) => serde_json::to_string(p)?,
        WireMessage::Backspace(p) => serde_json::to_string(p)?,
        WireMessage::Splice(p) => serde_json::to_string(p)?,
        WireMessage::InsertPost(p) => serde_json::to_string(p)?,
        WireMessage::InsertImage(p) => serde_json::to_string(p)?,
        WireMessage::Spoiler(p) => serde_json::to_string(p)?,
        WireMessage::ClosePost(p) => serde_json::to_string(p)?,
        WireMessage::StoleImageFrom(p) => serde_json::to_string(p)?,
        WireMessage::StoleImageTo(p) => serde_json::to_string(p)?,
        WireMessage::Synchronise(p) => serde_json::to_string(p)?,
        WireMessage::Error(p) => serde_json::to_string(p)?,
        WireMessage::Ping | WireMessage::Pong => String::new(),
        WireMessage::InsertImageRequest(p) => serde_json::to_string(p)?,
        WireMessage::ReservePost(p) => serde_json::to_string(p)?,
    };
    Ok(format!("{kind}{body}"))
}

/// Decode a frame body produced by [`encode`].
pub fn decode(frame: &str) -> Result<WireMessage, WireError> {
    if frame.len() < 2 {
        return Err(WireError::TooShort);
    }
    let (code, body) = frame.split_at(2);
    let kind = Kind::from_code(code).ok_or_else(|| WireError::UnknownKind(code.to_string()))?;
    Ok(match kind {
        Kind::Append => WireMessage::Append(serde_json::from_str(body)?),
        Kind::Backspace => WireMessage::Backspace(serde_json::from_str(body)?),
        Kind::Splice => WireMessage::Splice(serde_json::from_str(body)?),
        Kind::InsertPost => WireMessage::InsertPost(serde_json::from_str(body)?),
        Kind::InsertImage => WireMessage::InsertImage(serde_json::from_str(body)?),
        Kind::Spoiler => WireMessage::Spoiler(serde_json::from_str(body)?),
        Kind::ClosePost => WireMessage::ClosePost(serde_json::from_str(body)?),
        Kind::StoleImageFrom => WireMessage::StoleImageFrom(serde_json::from_str(body)?),
        Kind::StoleImageTo => WireMessage::StoleImageTo(serde_json::from_str(body)?),
        Kind::Synchronise => WireMessage::Synchronise(serde_json::from_str(body)?),
        Kind::Error => WireMessage::Error(serde_json::from_str(body)?),
        Kind::Ping => WireMessage::Ping,
        Kind::Pong => WireMessage::Pong,
        Kind::InsertImageRequest => WireMessage::InsertImageRequest(serde_json::from_str(body)?),
        Kind::ReservePost => WireMessage::ReservePost(serde_json::from_str(body)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips_identity() {
        let msg = WireMessage::Splice(SplicePayload {
            id: 101,
            start: 1,
            len: 3,
            text: "héllo→".to_string(),
        });
        let encoded = encode(&msg).unwrap();
        assert!(encoded.starts_with("02"));
        let decoded = decode(&encoded).unwrap();
        match decoded {
            WireMessage::Splice(p) => {
                assert_eq!(p.id, 101);
                assert_eq!(p.text, "héllo→");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ping_pong_have_empty_bodies() {
        assert_eq!(encode(&WireMessage::Ping).unwrap(), "11");
        assert_eq!(encode(&WireMessage::Pong).unwrap(), "12");
        assert!(matches!(decode("11").unwrap(), WireMessage::Ping));
    }

    #[test]
    fn reserve_post_round_trips() {
        let msg = WireMessage::ReservePost(ReservePostPayload {
            board: "a".to_string(),
            op: Some(42),
            name: "Anonymous".to_string(),
            tripcode: None,
            email: None,
            sage: true,
        });
        let encoded = encode(&msg).unwrap();
        assert!(encoded.starts_with("14"));
        match decode(&encoded).unwrap() {
            WireMessage::ReservePost(p) => assert_eq!(p.op, Some(42)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_unknown_kind_and_short_frames() {
        assert!(matches!(decode("x").unwrap_err(), WireError::TooShort));
        assert!(matches!(decode("99{}").unwrap_err(), WireError::UnknownKind(_)));
    }
}

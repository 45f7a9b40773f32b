//! Crate-wide error taxonomy.
//!
//! Error kinds mirror the categories the core distinguishes for propagation
//! purposes: `validation` and `protocol` errors are the offending client's
//! problem and never tear anything down; `transient` is a retryable Store
//! failure; `fatal` aborts the current operation and is logged; `throttle`
//! carries a captcha-required signal instead of a hard failure.

use thiserror::Error;

/// The taxonomy a [`CoreError`] belongs to, used to decide how to log and
/// whether to surface a captcha challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Protocol,
    Transient,
    Fatal,
    Throttle,
}

/// All errors produced by the posting core.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("no post open")]
    NoPostOpen,
    #[error("post is empty")]
    EmptyPost,
    #[error("body too long")]
    BodyTooLong,
    #[error("too many lines")]
    TooManyLines,
    #[error("non-printable character")]
    NonPrintable,
    #[error("splice is a no-op")]
    SpliceNoop,
    #[error("splice coordinates out of range")]
    SpliceOutOfRange,
    #[error("post already has an image")]
    HasImage,
    #[error("board does not accept images")]
    TextOnlyBoard,
    #[error("image token not found or expired")]
    ImageTokenInvalid,
    #[error("image already attached to a visible post")]
    DuplicateImage,
    #[error("thread does not exist")]
    NoSuchThread,
    #[error("post does not exist")]
    NoSuchPost,
    #[error("client already has an open post")]
    AlreadyOpen,
    #[error("store operation failed: {0}")]
    Store(String),
    #[error("store operation timed out")]
    StoreTimeout,
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error("captcha required")]
    CaptchaRequired,
    #[error("ip is throttled")]
    IpThrottled,
    #[error("message kind is not valid coming from a client")]
    UnexpectedKind,
}

impl CoreError {
    /// The taxonomy bucket this error falls into, used by callers to decide
    /// log level and whether the connection may continue.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoPostOpen
            | Self::EmptyPost
            | Self::BodyTooLong
            | Self::TooManyLines
            | Self::NonPrintable
            | Self::SpliceNoop
            | Self::SpliceOutOfRange
            | Self::DuplicateImage => ErrorKind::Validation,
            Self::HasImage | Self::TextOnlyBoard | Self::AlreadyOpen | Self::UnexpectedKind => ErrorKind::Protocol,
            Self::Store(_) | Self::StoreTimeout => ErrorKind::Transient,
            Self::NoSuchThread | Self::NoSuchPost | Self::Invariant(_) => ErrorKind::Fatal,
            Self::CaptchaRequired | Self::IpThrottled => ErrorKind::Throttle,
            Self::ImageTokenInvalid => ErrorKind::Validation,
        }
    }

    /// Short machine-readable code sent to the client in an `error` frame.
    /// Never leaks internal Store detail — `Store`/`Invariant` messages are
    /// logged server-side but the wire code is generic.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoPostOpen => "no_post_open",
            Self::EmptyPost => "empty_post",
            Self::BodyTooLong => "body_too_long",
            Self::TooManyLines => "too_many_lines",
            Self::NonPrintable => "non_printable",
            Self::SpliceNoop => "splice_noop",
            Self::SpliceOutOfRange => "splice_out_of_range",
            Self::HasImage => "has_image",
            Self::TextOnlyBoard => "text_only",
            Self::ImageTokenInvalid => "image_token_invalid",
            Self::DuplicateImage => "duplicate_image",
            Self::NoSuchThread | Self::NoSuchPost => "not_found",
            Self::AlreadyOpen => "already_open",
            Self::Store(_) | Self::StoreTimeout => "internal",
            Self::Invariant(_) => "internal",
            Self::CaptchaRequired => "captcha_required",
            Self::IpThrottled => "ip_throttled",
            Self::UnexpectedKind => "unexpected_kind",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_never_leak_store_detail() {
        let e = CoreError::Store("redis ECONNRESET at 10.0.0.1:6379".into());
        assert_eq!(e.code(), "internal");
        assert_eq!(e.kind(), ErrorKind::Transient);
    }

    #[test]
    fn kinds_match_taxonomy() {
        assert_eq!(CoreError::SpliceNoop.kind(), ErrorKind::Validation);
        assert_eq!(CoreError::HasImage.kind(), ErrorKind::Protocol);
        assert_eq!(CoreError::NoSuchPost.kind(), ErrorKind::Fatal);
        assert_eq!(CoreError::CaptchaRequired.kind(), ErrorKind::Throttle);
    }
}

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! boardcore — the real-time posting core of a threaded discussion board.
//!
//! This library exposes the building blocks:
//! - `config` — configuration loading
//! - `model` — thread/post/image data model
//! - `parser` — body-text command and filter parsing
//! - `store` — the key/value/pub-sub abstraction backing everything durable
//! - `feed` — per-thread actor multiplexing broadcasts to subscribers
//! - `registry` — process-wide post-id to thread-id lookup
//! - `throttle` — spam-score and thread-creation throttling
//! - `postwriter` — the open-post mutation protocol
//! - `subscription` — per-connection session state
//! - `wire` — the WebSocket wire protocol
//! - `ws` — WebSocket transport
//! - `state` — shared application state

pub mod config;
pub mod error;
pub mod feed;
pub mod model;
pub mod parser;
pub mod postwriter;
pub mod registry;
pub mod state;
pub mod store;
pub mod subscription;
pub mod throttle;
pub mod wire;
pub mod ws;

pub use config::Config;
pub use error::{CoreError, Result};
pub use state::AppState;

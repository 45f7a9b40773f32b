//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `BOARDCORE_LISTEN`, `BOARDCORE_DATA_DIR`
//! 2. **Config file** — path via `--config <path>`, or `boardcore.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:1337"
//!
//! [board]
//! max_body_len = 2000
//! max_lines = 100
//! spam_score_threshold = 3000
//! thread_throttle_secs = 30
//! feed_idle_eviction_secs = 600
//!
//! [store]
//! backend = "memory"
//! data_dir = "/var/lib/boardcore"
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// WebSocket listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:1337`).
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// Posting-rule limits and timing, shared across every board unless a
/// per-board policy overrides them.
#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    /// Maximum body length in runes (default 2000).
    #[serde(default = "default_max_body_len")]
    pub max_body_len: usize,
    /// Maximum number of lines per post (default 100).
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    /// Spam score at which a captcha is required (default 3000).
    #[serde(default = "default_spam_score_threshold")]
    pub spam_score_threshold: i64,
    /// Seconds an IP is barred from starting a new thread (default 30).
    #[serde(default = "default_thread_throttle_secs")]
    pub thread_throttle_secs: u64,
    /// Seconds an idle (subscriberless) Feed is kept alive before eviction
    /// (default 600 — long enough for a reconnecting author to resume).
    #[serde(default = "default_feed_idle_eviction_secs")]
    pub feed_idle_eviction_secs: u64,
}

/// Store backend selection.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Backend identifier. Only `"memory"` ships in this crate; the field
    /// exists so a future Redis-backed engine can be selected the same way.
    #[serde(default = "default_store_backend")]
    pub backend: String,
    /// Directory for any backend that persists to disk (unused by the
    /// in-process backend, reserved for future ones).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:1337".to_string()
}
fn default_max_body_len() -> usize {
    2000
}
fn default_max_lines() -> usize {
    100
}
fn default_spam_score_threshold() -> i64 {
    3000
}
fn default_thread_throttle_secs() -> u64 {
    30
}
fn default_feed_idle_eviction_secs() -> u64 {
    600
}
fn default_store_backend() -> String {
    "memory".to_string()
}
fn default_data_dir() -> String {
    "/var/lib/boardcore".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            max_body_len: default_max_body_len(),
            max_lines: default_max_lines(),
            spam_score_threshold: default_spam_score_threshold(),
            thread_throttle_secs: default_thread_throttle_secs(),
            feed_idle_eviction_secs: default_feed_idle_eviction_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file (panics on failure). Otherwise looks
    /// for `boardcore.toml` in the current directory, falling back to compiled
    /// defaults.
    pub fn load(path: Option<&str>) -> Self {
        let mut config = if let Some(p) = path {
            let content = std::fs::read_to_string(p).unwrap_or_else(|e| panic!("Failed to read config file {p}: {e}"));
            toml::from_str(&content).unwrap_or_else(|e| panic!("Failed to parse config file {p}: {e}"))
        } else if Path::new("boardcore.toml").exists() {
            let content = std::fs::read_to_string("boardcore.toml").expect("Failed to read boardcore.toml");
            toml::from_str(&content).expect("Failed to parse boardcore.toml")
        } else {
            Config {
                server: ServerConfig::default(),
                board: BoardConfig::default(),
                store: StoreConfig::default(),
                logging: LoggingConfig::default(),
            }
        };

        if let Ok(listen) = std::env::var("BOARDCORE_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(data_dir) = std::env::var("BOARDCORE_DATA_DIR") {
            config.store.data_dir = data_dir;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_limits() {
        let c = BoardConfig::default();
        assert_eq!(c.max_body_len, 2000);
        assert_eq!(c.max_lines, 100);
    }
}

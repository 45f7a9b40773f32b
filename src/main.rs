#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # boardcore
//!
//! Real-time posting core for a threaded discussion board.
//!
//! boardcore exposes a single WebSocket endpoint that lets clients follow a
//! thread's live edit stream and compose posts character-by-character, the
//! way an anonymous imageboard's JS frontend talks to its backend. Durable
//! storage, the HTTP read surface (catalog/thread rendering), image
//! thumbnailing, and moderation are all out of scope — see `SPEC_FULL.md`.
//!
//! ## Subcommands
//!
//! - `boardcore serve` (default) — run the WebSocket server

use std::net::SocketAddr;
use std::time::Duration;

use axum::{routing::get, Router};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use boardcore::{
    config::Config,
    registry,
    state::AppState,
    ws,
};

/// Real-time posting core for a threaded discussion board.
#[derive(Parser)]
#[command(name = "boardcore", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the WebSocket server (default when no subcommand given).
    Serve {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_path = match cli.command {
        Some(Commands::Serve { config }) => config,
        None => None,
    };

    run_server(config_path.as_deref()).await;
}

async fn run_server(config_path: Option<&str>) {
    let config = Config::load(config_path);

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("boardcore v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.server.listen);

    let known_boards = vec!["a".to_string(), "q".to_string()];

    let state = AppState::new(config);

    if let Err(e) = state.registry.populate_from_store(state.store.as_ref(), &known_boards).await {
        tracing::error!("failed to populate registry from store: {e}");
    }
    tokio::spawn(registry::run_registry_tail(
        std::sync::Arc::clone(&state.registry),
        std::sync::Arc::clone(&state.store),
        "thread:*",
    ));

    // GUARD: Headers must be listed explicitly — `allow_headers(Any)` works in
    // Chrome but Firefox rejects credentialed requests without explicit listing.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ]);

    let app = Router::new()
        .route("/api/ws", get(ws::ws_upgrade))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let listener = TcpListener::bind(&state.config.server.listen).await.expect("Failed to bind");
    info!("Server ready");

    // Periodic TTL sweep on the Store (spam-score counters, throttle
    // markers) and idle-Feed eviction (spec §4.4, §4.8).
    let sweep_store = state.mem_store.clone();
    let sweep_feeds = state.feeds.clone();
    let sweep_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            sweep_store.sweep();
            sweep_feeds.sweep_idle().await;
        }
    });

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to register SIGTERM");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .expect("Server error");

    info!("Shutting down...");
    sweep_task.abort();
    info!("Goodbye");
}

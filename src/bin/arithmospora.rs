//! Arithmospora server: loads configuration, publishes every configured
//! source, and serves each over its own WebSocket route.

#![allow(clippy::expect_used, reason = "Acceptable in a binary crate")]
#![allow(clippy::unwrap_used, reason = "Acceptable in a binary crate")]
#![allow(clippy::unused_async, reason = "Handler functions need to be async")]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use arithmospora::client::handle_socket;
use arithmospora::config::{Config, SocketConfig};
use arithmospora::logging::{setup_logging, spawn_stats_logger};
use arithmospora::source::Source;
use arithmospora::upstream::{MemoryStore, SharedStore};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Arithmospora: a reactive statistic tree and WebSocket fan-out server.
#[derive(Debug, Parser)]
struct Args {
	/// Path to the TOML configuration file.
	#[arg(short, long, default_value = "Config.toml")]
	config: std::path::PathBuf,
}

#[derive(Clone)]
struct AppState {
	sources: Arc<HashMap<String, Arc<Source>>>,
	socket: SocketConfig,
}

#[tokio::main]
async fn main() {
	let args = Args::parse();
	let config = Config::load(&args.config).expect("failed to load configuration");
	let _guard = setup_logging("logs");

	let store: SharedStore = Arc::new(MemoryStore::new());
	let mut sources = HashMap::new();
	let (errors_tx, mut errors_rx) = tokio::sync::mpsc::unbounded_channel();

	for source_config in &config.sources {
		let source = Source::from_config(&store, source_config);
		source
			.publish(config.debounce.min(), config.debounce.max(), errors_tx.clone())
			.await
			.expect("failed to publish source");
		source.spawn_periodic_refresh();
		let _ = sources.insert(source_config.name.clone(), source);
	}

	let _error_logger = tokio::spawn(async move {
		while let Some(err) = errors_rx.recv().await {
			tracing::warn!(%err, "refresh error");
		}
	});

	spawn_stats_logger(sources.values().cloned().collect());

	let state = AppState { sources: Arc::new(sources), socket: config.socket };
	let app = Router::new()
		.route("/ws/{source}", get(ws_handler))
		.route("/healthz", get(healthz))
		.layer(TraceLayer::new_for_http())
		.layer(CatchPanicLayer::new())
		.with_state(state);

	let address: SocketAddr = config.transport.address.parse().expect("invalid listen address");
	let listener = TcpListener::bind(address).await.expect("failed to bind listen address");
	info!(%address, "listening");
	notify_ready();
	axum::serve(listener, app).await.expect("server error");
}

async fn ws_handler(Path(source_name): Path<String>, State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
	let Some(source) = state.sources.get(&source_name).cloned() else {
		return axum::http::StatusCode::NOT_FOUND.into_response();
	};
	let socket_config = state.socket;
	ws.on_upgrade(move |socket| async move {
		handle_socket(socket, source.hub.clone(), socket_config).await;
	})
}

/// Health check for process supervisors (container orchestrators, systemd
/// watchdogs) polling over HTTP; always 200 once the router is serving.
async fn healthz() {}

/// Tells a systemd-style process supervisor that startup is complete, by
/// sending `READY=1` to the datagram socket named in `NOTIFY_SOCKET`. A
/// no-op (not an error) when the process wasn't launched under one, which
/// is the common case outside a systemd unit.
#[cfg(unix)]
fn notify_ready() {
	let Ok(socket_path) = std::env::var("NOTIFY_SOCKET") else {
		return;
	};
	let Ok(socket) = std::os::unix::net::UnixDatagram::unbound() else {
		return;
	};
	if let Err(err) = socket.send_to(b"READY=1", &socket_path) {
		tracing::warn!(%err, "failed to notify process supervisor of readiness");
	}
}

/// No `NOTIFY_SOCKET` mechanism off Unix; the `/healthz` route is the
/// supervisor-facing readiness signal there.
#[cfg(not(unix))]
fn notify_ready() {}

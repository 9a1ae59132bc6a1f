//! pairpad server
//!
//! Real-time layer for a collaborative editor: shared documents with
//! presence over `/ws`, PTY-backed terminals over `/term`, and a small file
//! API for the workspaces both of them operate on.

mod api;
mod config;
mod document;
mod logging;
mod outbound;
mod presence;
mod pty;
mod room;
mod state;
mod terminal;
mod terminal_socket;
mod websocket;
mod workspace;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use axum::{routing::get, Router};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Args, Config};
use crate::logging::init_logging;
use crate::state::AppState;
use crate::terminal_socket::terminal_ws_handler;
use crate::websocket::ws_handler;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(api::service_info))
        .route("/health", get(api::health_handler))
        .route("/ws", get(ws_handler))
        .route("/term", get(terminal_ws_handler))
        .route("/workspaces", get(api::list_workspaces))
        .route("/projects/{project}/files", get(api::list_files))
        .route(
            "/projects/{project}/file",
            get(api::read_file).post(api::write_file),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args(Args::parse())?;
    config.ensure_dirs()?;
    let logging = init_logging(&config)?;

    let state = Arc::new(AppState::new(config));
    let config = state.config();
    info!(
        component = "server",
        event = "server.starting",
        run_id = %logging.run_id,
        bind = %config.bind,
        workspace_root = %config.workspace_root.display(),
        default_shell = %config.default_shell,
        "Starting pairpad server"
    );

    let bind = config.bind;
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(
        component = "server",
        event = "server.listening",
        bind = %bind,
        "Listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let terminated = state.shutdown();
    info!(
        component = "server",
        event = "server.stopped",
        terminated_sessions = terminated,
        "Server stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(
            component = "server",
            event = "server.signal_failed",
            error = %e,
            "Failed to listen for ctrl-c"
        );
        std::future::pending::<()>().await;
    }
    info!(
        component = "server",
        event = "server.shutdown_requested",
        "Shutdown requested"
    );
}

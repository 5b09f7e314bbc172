mod cli;
mod error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;

use cli::CliArgs;
use gproxy_core::{Dispatcher, RateLimiter, StatsRecorder, WreqUpstream};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = CliArgs::parse();

    let config = match gproxy_common::load_config(Path::new(&args.config)) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(event = "config_load_failed", config = %args.config, error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };
    tracing::info!(
        event = "config_loaded",
        providers = config.providers.len(),
        api_keys = config.api_keys.len(),
        "configuration loaded"
    );

    let read_timeout = cli::read_timeout_override();
    let upstream = WreqUpstream::new(read_timeout);
    let state = Arc::new(AppState {
        config,
        dispatcher: Dispatcher::new(upstream.client()),
        rate_limiter: RateLimiter::new(),
        stats: StatsRecorder::new(
            args.stats_file.clone(),
            std::time::Duration::from_secs(args.stats_save_interval),
        ),
        upstream,
    });

    let periodic_state = state.clone();
    tokio::spawn(async move { periodic_state.stats.run_periodic().await });

    let app = build_router(state.clone());

    let bind = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!(event = "listening", addr = %bind, "gateway listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving")?;

    state.stats.persist_final().await;
    Ok(())
}

/// Mounts `/v1/...` and the legacy `/uni/v1/...` mirror (spec.md §6) behind
/// a permissive, global CORS layer — the reference's CORS middleware covers
/// every route, not just the one endpoint spec.md calls out an explicit
/// `OPTIONS` test for (SPEC_FULL.md §11).
fn build_router(state: state::SharedState) -> Router {
    Router::new()
        .route(routes::CHAT_PATH, post(routes::chat_completions))
        .route(routes::CHAT_PATH_LEGACY, post(routes::chat_completions_legacy))
        .route(routes::IMAGES_PATH, post(routes::images_generations))
        .route(routes::IMAGES_PATH_LEGACY, post(routes::images_generations_legacy))
        .route("/v1/models", get(routes::list_models))
        .route("/uni/v1/models", get(routes::list_models))
        .route("/generate-api-key", get(routes::generate_api_key))
        .route("/stats", get(routes::admin_stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!(event = "shutdown_signal_received", "shutting down");
}

use anyhow::Context;
use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use photobooth_proxy::config::{Args, mask_key};
use photobooth_proxy::rate_limit::{RateLimitScope, RateLimiter, window_sweeper};
use photobooth_proxy::server::create_app;
use photobooth_proxy::state::AppState;
use photobooth_proxy::upstream::UpstreamClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional, real env vars win
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let api_key = args.require_api_key()?;
    match &api_key {
        Some(key) => tracing::info!(api_key = %mask_key(key), "API key loaded"),
        None => {
            tracing::warn!("GEMINI_API_KEY not set, proxy requests will fail until it is configured")
        }
    }

    let upstream = UpstreamClient::new(args.upstream_url.clone(), api_key, args.upstream_timeout())
        .context("failed to build upstream http client")?;

    let rate_limiter = Arc::new(RateLimiter::new(args.rate_limit, args.rate_window()));

    // per-client windows pile up, the global one never does
    if args.rate_limit_scope == RateLimitScope::Client {
        let sweep_every = args.rate_window().max(Duration::from_secs(1));
        tokio::spawn(window_sweeper(rate_limiter.clone(), sweep_every));
    }

    let state = Arc::new(AppState {
        upstream,
        rate_limiter,
        rate_limit_scope: args.rate_limit_scope,
        max_body_bytes: args.max_body_bytes(),
    });

    let app = create_app(state);

    let addr = args.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("Proxy running on http://{}", addr);
    tracing::info!("Proxy endpoint: POST /api/photobooth -> {}", args.upstream_url);
    tracing::info!(
        "Rate limit: {} requests per {} seconds ({:?} scope)",
        args.rate_limit,
        args.rate_window,
        args.rate_limit_scope
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("Proxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

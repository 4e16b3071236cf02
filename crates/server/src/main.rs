//! webshot server entry point.
//!
//! Boots the HTTP API over the cache-fronted screenshot service. With
//! `--healthcheck` it instead checks a running server's `/health` and exits
//! non-zero on failure (for container health checks).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use webshot_core::{AppConfig, Renderer, Service, build_store};

mod auth;
mod error;
mod handler;
mod request_id;
mod routes;

use auth::HmacAuth;
use handler::{AppState, create_router};

#[derive(Debug, Parser)]
#[command(name = "webshot", version, about = "Webpage screenshot service with a render cache")]
struct Cli {
    /// Probe `/health` of the configured address and exit.
    #[arg(long)]
    healthcheck: bool,
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if config.log_pretty {
        builder.init();
    } else {
        builder.json().init();
    }
}

#[cfg(feature = "render")]
async fn build_renderer(config: &AppConfig) -> Result<Arc<dyn Renderer>> {
    use webshot_client::{BrowserOptions, HeadlessRenderer};

    let options = BrowserOptions { args: config.browser_args.clone() };
    let renderer = HeadlessRenderer::from_addr(config.browser_addr.as_deref(), &options)
        .await
        .context("start renderer")?;
    Ok(Arc::new(renderer))
}

#[cfg(not(feature = "render"))]
async fn build_renderer(_config: &AppConfig) -> Result<Arc<dyn Renderer>> {
    tracing::warn!("built without the `render` feature; every image request will fail");
    Ok(Arc::new(webshot_client::DisabledRenderer))
}

async fn healthcheck(config: &AppConfig) -> Result<()> {
    let mut addr = config.listen_addr()?;
    // A wildcard bind address is reachable on loopback.
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        IpAddr::V6(ip) if ip.is_unspecified() => addr.set_ip(IpAddr::V6(Ipv6Addr::LOCALHOST)),
        _ => {}
    }

    let response = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .with_context(|| format!("healthcheck request to {addr}"))?;

    anyhow::ensure!(response.status().is_success(), "healthcheck returned {}", response.status());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("load configuration")?;

    if cli.healthcheck {
        return healthcheck(&config).await;
    }

    init_tracing(&config);

    let storage = build_store(&config.storage).await?;
    let renderer = build_renderer(&config).await?;
    let service = Service::new(renderer)
        .with_storage(storage)
        .with_default_ttl(config.default_ttl())
        .with_render_timeout(config.render_timeout());

    let auth = match &config.sign_key {
        Some(key) => Some(HmacAuth::new(key).map_err(|_| anyhow::anyhow!("invalid sign key"))?),
        None => {
            tracing::warn!("sign_key is not set; requests are not authenticated");
            None
        }
    };

    let addr: SocketAddr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, storage = ?config.storage.backend, "webshot listening");

    axum::serve(listener, create_router(AppState::new(service, auth)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use scraper_standalone::config::ScraperConfig;
use scraper_standalone::server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,scraper_standalone=debug")),
        )
        .init();

    let config = ScraperConfig::from_env();
    let addr = format!("{}:{}", config.bind_host, config.bind_port);
    let state = Arc::new(AppState::new(&config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("scraper listening on {addr}");

    axum::serve(listener, router(state))
        .await
        .context("server exited")?;
    Ok(())
}

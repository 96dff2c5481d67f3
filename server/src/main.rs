use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use taskhunt_catalog::Catalog;
use taskhunt_catalog::CatalogConfig;
use taskhunt_github::GithubClient;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND: ([u8; 4], u16) = ([0, 0, 0, 0], 8080);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CatalogConfig::from_env();
    if config.token.is_none() {
        info!("no GITHUB_TOKEN configured, running against the unauthenticated rate ceiling");
    }
    let bind: SocketAddr = std::env::var("TASKHUNT_BIND")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(DEFAULT_BIND));

    let client = GithubClient::new(config.token.clone()).context("building github client")?;
    let catalog = Catalog::new(Arc::new(client), config);

    // Prime the cache before accepting traffic. A failed first refresh is
    // not fatal: the API answers 503 until the background loop succeeds.
    match catalog.refresh().await {
        Ok(state) => info!(
            version = state.snapshot.version,
            tasks = state.snapshot.task_count(),
            partial = state.snapshot.partial,
            "catalog primed"
        ),
        Err(err) => warn!("initial catalog refresh failed: {err}"),
    }

    taskhunt_server::serve(catalog, bind).await
}

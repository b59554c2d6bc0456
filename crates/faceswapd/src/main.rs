use anyhow::{Context, Result};
use faceswap_upstream::{CozeWorkflow, ImgbbHost};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod proxy;
mod routes;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("faceswapd starting");

    let config = Config::load().context("failed to load configuration")?;
    if !config.image_host_configured() {
        tracing::warn!("IMGBB_API_KEY not set; uploads will be refused");
    }
    if !config.workflow_configured() {
        tracing::warn!("COZE_API_KEY or COZE_WORKFLOW_ID not set; face swaps will be refused");
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("faceswapd/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let host = ImgbbHost::new(client.clone(), &config.imgbb.endpoint, config.imgbb.encoding)
        .with_expiration(config.imgbb.expiration_secs);
    tracing::info!(
        endpoint = host.endpoint(),
        encoding = ?config.imgbb.encoding,
        "image host configured"
    );
    let engine = CozeWorkflow::new(client, &config.coze.endpoint);
    tracing::info!(endpoint = %config.coze.endpoint, "workflow engine configured");

    let state = routes::AppState::new(&config, Arc::new(host), Arc::new(engine));
    let app = routes::router(state, routes::body_limit(config.max_upload_bytes));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "faceswapd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            // Keep running until signaled
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("faceswapd shutting down");
    Ok(())
}

use std::sync::Arc;

use anyhow::{Context, Result};
use clipforge::{
    artifact_store,
    config::Config,
    job_store::JobStore,
    media::{FfmpegToolkit, MediaToolkit},
    pipeline::{self, Pipeline},
    reaper, AppState,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipforge=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    artifact_store::ensure_storage_root(&config.storage_root).await?;

    if let Some(url) = &config.background_url {
        if let Err(err) =
            artifact_store::fetch_background_if_missing(&config.background_path, url).await
        {
            warn!("Background video download failed: {err:#}");
        }
    }
    if !config.background_path.exists() {
        warn!(
            path = %config.background_path.display(),
            "Background video not found, renders will fail until it exists"
        );
    }

    let media: Arc<dyn MediaToolkit> =
        Arc::new(FfmpegToolkit::locate().context("FFmpeg tools are required")?);

    let store = JobStore::new();
    let (pipeline, queue_rx) = Pipeline::from_config(&config, store.clone(), media);
    pipeline::spawn_dispatcher(pipeline.clone(), queue_rx);
    reaper::spawn_cleanup_worker(store, &config);

    let state = AppState {
        config: config.clone(),
        pipeline,
    };
    let app = clipforge::build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(
        retention_secs = config.retention.as_secs(),
        max_concurrent_jobs = config.max_concurrent_jobs,
        "clipforge listening on {}",
        config.bind_addr
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

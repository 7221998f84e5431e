//! `actionscaled serve` — wires the pipeline and runs the HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use actionscale_client::{CacheWindows, GitHubSourceFactory};
use actionscale_core::config::CacheConfig;
use actionscale_core::{AdapterConfig, SystemClock};
use actionscale_host::{FileWorkflowLoader, Host, HostDeps, WorkflowLoader, WorkflowStore, resync, run_resync};
use actionscale_metrics::PrometheusRecorder;

fn cache_windows(cache: &CacheConfig) -> CacheWindows {
    CacheWindows {
        window: cache.window,
        when_empty: cache.window_when_empty,
        fetch_timeout: cache.fetch_timeout,
    }
}

pub async fn run_serve(
    config_path: PathBuf,
    port: Option<u16>,
    skip_warm_up: bool,
) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "actionscaled starting");

    let config = AdapterConfig::from_file(&config_path)?;
    config.validate()?;
    let port = port.unwrap_or(config.server.port);

    // ── Initialize subsystems ──────────────────────────────────

    let state = actionscale_state::connect(&config.cache.backend).await?;
    info!("state backend connected");

    let sources = Arc::new(GitHubSourceFactory::new(config.sources.github_api_url.clone())?);

    let store = Arc::new(WorkflowStore::new());
    let loader: Arc<dyn WorkflowLoader> =
        Arc::new(FileWorkflowLoader::new(&config_path, config.sources.clone()));
    let report = resync(&store, loader.as_ref())?;
    info!(
        loaded = report.loaded,
        failed = report.failed,
        "workflows loaded"
    );
    if store.is_empty() {
        warn!("no workflows configured for the watched namespaces");
    }

    let recorder = Arc::new(PrometheusRecorder::new());
    let host = Host::new(
        HostDeps {
            workflows: store.clone(),
            state,
            sources,
            recorder: recorder.clone(),
            clock: Arc::new(SystemClock),
        },
        cache_windows(&config.cache),
    )
    .with_single_flight(config.cache.single_flight);

    if skip_warm_up {
        info!("warm-up skipped");
    } else {
        let warmed = host.warm_up().await?;
        info!(workflows = warmed, "warm-up complete");
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let resync_handle = tokio::spawn(run_resync(
        store,
        loader,
        config.sources.resync_interval,
        shutdown_rx,
    ));

    // ── Start API server ───────────────────────────────────────

    let router = actionscale_api::build_router(host, recorder);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = resync_handle.await;

    info!("actionscaled stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn windows_follow_cache_config() {
        let cache = CacheConfig {
            window: Duration::from_secs(90),
            window_when_empty: Duration::from_secs(15),
            fetch_timeout: Duration::from_secs(3),
            ..CacheConfig::default()
        };
        let windows = cache_windows(&cache);
        assert_eq!(windows.window, Duration::from_secs(90));
        assert_eq!(windows.when_empty, Duration::from_secs(15));
        assert_eq!(windows.fetch_timeout, Duration::from_secs(3));
    }
}

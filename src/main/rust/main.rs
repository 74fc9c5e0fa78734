use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::oneshot;
use tracing::{error, info};

use overlay_player::domain::ports::{OverlayStore, SettingsStore};
use overlay_player::domain::value_objects::SettingsPatch;
use overlay_player::{
    api_routes, serve_metrics, ApiContext, Config, DocumentStore, HlsProtocolClient, HttpFetcher,
    MediaFetcher, OverlayCompositor, PlayerService, PlayerSettings, PrometheusReporter,
    SessionController, SessionOptions,
};

#[cfg(feature = "gstreamer")]
fn build_surface(config: &Config) -> Result<overlay_player::GStreamerSurface> {
    overlay_player::GStreamerSurface::new(config.surface_geometry())
}

#[cfg(not(feature = "gstreamer"))]
fn build_surface(config: &Config) -> Result<overlay_player::MemorySurface> {
    Ok(overlay_player::MemorySurface::new(config.surface_geometry()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration
    let config = Config::parse();
    config.validate()?;

    // Initialize logging
    let filter = if config.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // Initialize metrics
    PrometheusReporter::init_metrics()?;

    info!("Starting overlay player v{}", env!("CARGO_PKG_VERSION"));
    info!("  API port: {}", config.api_port);
    info!("  Metrics port: {}", config.metrics_port);
    info!("  Media server HLS port: {}", config.media_host_port);

    // Stores
    let defaults = PlayerSettings {
        source_locator: config.source_locator.clone().unwrap_or_default(),
        ..PlayerSettings::default()
    };
    let store = Arc::new(match &config.data_file {
        Some(path) => DocumentStore::open(path, defaults).await?,
        None => DocumentStore::in_memory(defaults),
    });

    let mut settings = store.get().await?;
    if let (true, Some(locator)) = (settings.source_locator.is_empty(), &config.source_locator) {
        settings = store
            .set(SettingsPatch {
                source_locator: Some(locator.clone()),
                ..SettingsPatch::default()
            })
            .await?;
    }

    // Create infrastructure implementations (dependency injection)
    let fetcher: Arc<dyn MediaFetcher> = Arc::new(HttpFetcher::new()?);
    let protocol = Arc::new(HlsProtocolClient::new(fetcher.clone(), config.backoff_policy()?));
    let metrics_reporter = Arc::new(PrometheusReporter::new());

    let surface = build_surface(&config)?;

    // Create application services
    let (controller, events) = SessionController::new(
        surface,
        protocol,
        store.clone(),
        metrics_reporter.clone(),
        SessionOptions::from_settings(&settings)?,
    );
    let compositor = OverlayCompositor::new(config.surface_geometry(), metrics_reporter);
    let (player, player_task) =
        PlayerService::new(controller, compositor, config.resolver(), fetcher).spawn(events);

    player.replace_overlays(store.list().await?).await?;
    let status = player.apply_settings(settings).await?;
    info!(
        state = %status.state,
        manifest_url = ?status.manifest_url,
        "Player initialized"
    );

    // Start metrics server
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        serve_metrics(metrics_port).await;
    });

    // Start API server
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let routes = api_routes(ApiContext::new(store.clone(), store, player.clone()));
    let (addr, server) =
        warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], config.api_port), async {
            shutdown_rx.await.ok();
        });
    info!("API listening on http://{}", addr);
    let api_server = tokio::spawn(server);

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    // Stop accepting requests, then release the playback session
    let _ = shutdown_tx.send(());
    api_server.await?;

    if let Err(e) = player.shutdown().await {
        error!("Player already stopped: {}", e);
    }
    player_task.await?;

    info!("Overlay player shutdown complete");
    Ok(())
}

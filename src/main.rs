use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use wxhub_core::{App, Config};
use wxhub_forecast::ForecastClient;
use wxhub_server::{AppState, BroadcastHub};
use wxhub_services::{IngestionScheduler, SqliteObservationStore};
use wxhub_weather::ObservationFetcher;

#[derive(Debug, Parser)]
#[command(name = "wxhub", version, about = "Scheduled weather ingestion with forecast snapshots and live push")]
struct Args {
    /// Path to a TOML config file (defaults to the per-user config if present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    wxhub_core::init()?;

    let (config, _) = Config::load_validated(args.config.as_deref()).map_err(|e| {
        tracing::error!("Startup aborted: {:#}", e);
        e
    })?;

    let fetcher = Arc::new(
        ObservationFetcher::from_config(&config.provider).context("Failed to build weather client")?,
    );
    let forecast =
        ForecastClient::from_config(&config.forecaster).context("Failed to build forecaster client")?;
    let store = Arc::new(
        SqliteObservationStore::new(&config.store.path).context("Failed to open observation store")?,
    );
    let hub = Arc::new(BroadcastHub::new(Duration::from_secs(
        config.broadcast.send_timeout_secs,
    )));
    let scheduler = IngestionScheduler::new(fetcher.clone(), store);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    let mut app = App::new(config);
    let config = app.config().clone();

    let state = AppState {
        observations: fetcher,
        forecast: forecast.clone(),
        hub: hub.clone(),
        scheduler: scheduler.clone(),
        shutdown: app.cancel_token(),
    };

    let locations = config.ingest.locations.clone();
    let ingest_period = Duration::from_secs(config.ingest.interval_secs);
    app.spawn("ingest", move |cancel| scheduler.run(locations, ingest_period, cancel));

    let broadcast_period = Duration::from_secs(config.broadcast.interval_secs);
    app.spawn("broadcast", move |cancel| hub.run(forecast, broadcast_period, cancel));

    app.spawn("http", move |cancel| async move {
        if let Err(e) = wxhub_server::serve(listener, state, cancel).await {
            tracing::error!("HTTP server failed: {}", e);
        }
    });

    tracing::info!("wxhub started: tasks {:?}", app.task_names());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");

    app.shutdown().await;
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use callback_server::CallbackServer;
use music_index::{ArtLookup, BuildOptions, IndexBuilder, Library, LoftyProbe, MusicBrainzArt, NoArt};
use musicbox_server::{init_logging, routes, run_discovery, AppState, Config, Zones};
use subscriptions::{HttpGenaClient, Registry};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

/// Timeout for SUBSCRIBE, renew and UNSUBSCRIBE requests.
const GENA_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How long open event streams get to close after the registry shuts down.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_logging(config.log_mode).context("Failed to initialize logging")?;
    config.log_summary();

    let library = open_library(&config).await.context("Failed to open library")?;
    let scans = tokio::spawn(run_scans(Arc::clone(&library), config.rescan_interval));

    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let callback = CallbackServer::with_advertised_ip(
        (config.callback_port, config.callback_port),
        config.callback_host,
        notify_tx,
    )
    .await
    .context("Failed to start callback server")?;

    let gena = HttpGenaClient::new(GENA_REQUEST_TIMEOUT).context("Failed to create GENA client")?;
    let registry = Registry::new(Arc::new(gena), config.registry_config(callback.callback_url()));
    let dispatcher = tokio::spawn(Arc::clone(&registry).run_dispatcher(notify_rx));

    let zones = Arc::new(Zones::new());
    let discovery = config
        .discovery
        .then(|| tokio::spawn(run_discovery(Arc::clone(&zones), config.discovery_config())));

    let state = AppState {
        library: Arc::clone(&library),
        registry: Arc::clone(&registry),
        zones,
    };
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let (addr, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(config.api_addr, async move {
            let _ = stop_rx.await;
        })
        .with_context(|| format!("Failed to bind API server on {}", config.api_addr))?;
    info!(%addr, "API server listening");
    let server = tokio::spawn(server);

    wait_for_ctrl_c().await;
    info!("Shutting down...");

    // Stop accepting, then end open event streams so in-flight responses can finish.
    let _ = stop_tx.send(());
    registry.shutdown().await;
    if tokio::time::timeout(DRAIN_TIMEOUT, server).await.is_err() {
        warn!("API server did not drain in time");
    }

    if let Some(discovery) = discovery {
        discovery.abort();
    }
    scans.abort();
    let _ = scans.await;
    callback.shutdown().await;
    dispatcher.abort();

    // The art lookup owns a blocking HTTP client, which must not be dropped
    // on a runtime thread.
    tokio::task::spawn_blocking(move || drop(library))
        .await
        .context("Failed to release library")?;

    info!("Shutdown complete");
    Ok(())
}

/// Builds the library on a blocking thread: the art lookup's HTTP client is
/// blocking, and reading the persisted index is file I/O.
async fn open_library(config: &Config) -> Result<Arc<Library>> {
    let root = config.library.clone();
    let index_file = config.index_file.clone();
    let options: BuildOptions = config.build_options();
    let art_lookup = config.art_lookup;

    tokio::task::spawn_blocking(move || -> Result<Arc<Library>> {
        let art: Arc<dyn ArtLookup> = if art_lookup {
            Arc::new(MusicBrainzArt::new(&root).context("Failed to create art lookup client")?)
        } else {
            Arc::new(NoArt)
        };
        let builder = IndexBuilder::new(&root, Arc::new(LoftyProbe), art, options);
        Ok(Arc::new(Library::open(builder, index_file)))
    })
    .await
    .context("Library task failed")?
}

/// Scans once, then every `interval` when one is set.
async fn run_scans(library: Arc<Library>, interval: Option<Duration>) {
    loop {
        let scan_library = Arc::clone(&library);
        match tokio::task::spawn_blocking(move || scan_library.rescan()).await {
            Ok(Ok(stats)) => info!(
                discovered = stats.discovered,
                reused = stats.reused,
                extracted = stats.extracted,
                failed = stats.failed,
                "library scan complete"
            ),
            Ok(Err(e)) => error!(root = %library.root().display(), error = %e, "library scan failed"),
            Err(e) => error!(error = %e, "library scan task failed"),
        }

        let Some(interval) = interval else {
            return;
        };
        tokio::time::sleep(interval).await;
    }
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

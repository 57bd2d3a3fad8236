mod config;
mod error;
mod events;
mod netlink;
mod report;
mod routes;

use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use config::Config;
use error::MonitorResult;
use events::dispatcher::Dispatcher;
use events::{Category, NetworkStateProvider};
use netlink::{NetlinkProvider, NetlinkSource};
use report::LineSink;
use routes::cache::RouteCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // Initialize logging; reports own stdout, diagnostics go to stderr
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    tracing::info!("Route monitor starting on {}", hostname);

    let provider = NetlinkProvider::new(&config);
    let sources = match subscribe_all(&provider) {
        Ok(sources) => sources,
        Err(e) => {
            tracing::error!("Setup failed: {}", e);
            return Err(e.into());
        }
    };

    let cache = RouteCache::new(config.buckets, config.duplicate_policy);
    tracing::info!(
        "Route cache: {} buckets, duplicate policy {:?}",
        cache.bucket_count(),
        cache.policy()
    );

    let mut dispatcher = Dispatcher::new(sources, cache, LineSink::stdout(config.format));
    tracing::info!("Watching {:?} events", dispatcher.categories());

    let result = dispatcher.run(shutdown_signal()).await;

    let stats = dispatcher.stats();
    tracing::info!(
        "Processed {} payload(s), {} event(s), {} decode failure(s), {} receive failure(s), {} invalidation(s), {} cached route(s)",
        stats.payloads,
        stats.events,
        stats.decode_failures,
        stats.receive_failures,
        stats.invalidations,
        dispatcher.cache().len()
    );
    if !dispatcher.cache().is_empty() {
        tracing::debug!("Releasing route cache");
    }

    if let Err(e) = result {
        tracing::error!("Event loop stopped: {}", e);
        return Err(e.into());
    }
    Ok(())
}

fn subscribe_all(provider: &NetlinkProvider) -> MonitorResult<Vec<NetlinkSource>> {
    Category::ALL
        .iter()
        .map(|&category| provider.subscribe(category))
        .collect()
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

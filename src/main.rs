//! market-engine server binary.
//!
//! Wires configuration, storage (PostgreSQL + optional Redis cache, or
//! in-memory), the correlation limiter, the broadcast hub, and the HTTP/WS
//! surface; then serves until SIGINT/SIGTERM with a bounded drain.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use market_engine::api;
use market_engine::config::Config;
use market_engine::correlation::PositionLimiter;
use market_engine::store::{CachedStore, MemoryStore, PostgresStore, Store};
use market_engine::trade::{PriceFeedHub, TradeService};

/// Grace period for in-flight requests on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let config = Config::from_env()?;

    // --- Storage ---
    let store: Arc<dyn Store> = if let Some(database_url) = &config.database_url {
        let primary: Arc<dyn Store> = Arc::new(PostgresStore::connect(database_url).await?);
        info!("connected to PostgreSQL");

        if let Some(redis_url) = &config.redis_url {
            let cached = CachedStore::connect(
                primary,
                redis_url,
                Duration::from_secs(config.cache_ttl_secs),
            )
            .await?;
            info!(ttl_secs = config.cache_ttl_secs, "Redis cache enabled");
            Arc::new(cached)
        } else {
            primary
        }
    } else {
        warn!("DATABASE_URL not set, using in-memory store (data will not persist)");
        Arc::new(MemoryStore::new())
    };

    // --- Services ---
    let limiter = PositionLimiter::new(
        config.max_per_cell,
        config.max_correlated,
        config.correlation_prefix_len,
    );
    let hub = PriceFeedHub::spawn();
    let service = Arc::new(
        TradeService::new(store, limiter, config.margin_limit).with_hub(hub.clone()),
    );

    // --- HTTP server ---
    let app = api::router(service, hub);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = config.port, "market-engine listening");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let graceful = axum::serve(listener, app)
        .with_graceful_shutdown({
            let mut shutdown_rx = shutdown_rx.clone();
            async move {
                let _ = shutdown_rx.changed().await;
            }
        })
        .into_future();
    let mut graceful = pin!(graceful);

    tokio::select! {
        result = &mut graceful => result?,
        _ = shutdown_rx.changed() => {
            info!("shutting down market-engine");
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut graceful).await {
                Ok(result) => result?,
                Err(_) => warn!("shutdown grace period elapsed with requests in flight"),
            }
        }
    }

    info!("market-engine stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

mod config;
mod db;
mod error;
mod handlers;
mod ingest;
mod maintenance;
mod scheduler;
mod sector;
mod server;
mod snapshot;
mod statement_cache;
mod stats;
mod writelock;

use std::sync::atomic::{AtomicU64, AtomicUsize};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use config::Config;
use db::Stores;
use handlers::HandlerContext;
use sector::SectorHasher;
use statement_cache::StatementCache;
use writelock::WriteLock;

fn load_env() {
    let _ = dotenv::dotenv();
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "galnet_collector=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    info!("galnet-collector starting");

    let cfg = Arc::new(Config::from_env().context("loading configuration")?);
    cfg.ensure_dirs().context("creating data directories")?;

    let stores = Stores::open_all(&cfg).context("opening databases")?;
    info!("databases opened at {}", cfg.data_dir.display());

    let statements = Arc::new(StatementCache::new());
    let sectors = SectorHasher::new(cfg.sector_grid_ly, cfg.sector_hash_bytes);
    let handler_ctx = HandlerContext { stores: stores.clone(), statements, sectors };

    let write_lock = WriteLock::new();

    let mut ingestor = ingest::Ingestor::new(handler_ctx, &cfg, write_lock.clone());
    let (processed_counter, dedup_counter) = ingestor.shared_counters();

    let app_state = server::AppState {
        cfg: cfg.clone(),
        write_lock: write_lock.clone(),
        started_at: Instant::now(),
        processed_count: processed_counter,
        dedup_set_size: dedup_counter,
    };
    let http_addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding HTTP listener on {http_addr}"))?;
    info!("HTTP listener bound on {http_addr}");
    let http_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, server::router(app_state)).await {
            error!("HTTP server exited: {e}");
        }
    });

    if cfg.skip_startup_maintenance {
        info!("skipping startup backup check (SKIP_STARTUP_MAINTENANCE)");
    } else if !maintenance::backup_log_exists(&cfg) {
        info!("no prior backup found, running an immediate backup before entering the ingestion loop");
        write_lock.set();
        let records = maintenance::backup_all(&cfg, &stores).await;
        let failed = records.iter().filter(|r| !r.succeeded).count();
        if failed > 0 {
            warn!("{failed} of {} startup backups failed, continuing anyway", records.len());
        }
        write_lock.clear();
    }

    let mut scheduler_handle = scheduler::start(cfg.clone(), stores.clone(), write_lock.clone())
        .await
        .context("starting maintenance scheduler")?;

    let ingest_handle = tokio::spawn(async move {
        if let Err(e) = ingestor.run().await {
            error!("ingestor terminated: {e}");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        result = ingest_handle => {
            if let Err(e) = result {
                error!("ingestor task panicked: {e}");
            }
        }
        result = http_server => {
            if let Err(e) = result {
                error!("http server task panicked: {e}");
            }
        }
    }

    info!("shutting down scheduler");
    let _ = scheduler_handle.shutdown().await;

    info!("galnet-collector exiting");
    Ok(())
}

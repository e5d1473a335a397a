//! Scheduler (C10): cron-like maintenance and stats jobs running in-process.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::Config;
use crate::db::Stores;
use crate::maintenance;
use crate::snapshot::SnapshotManager;
use crate::stats;
use crate::writelock::WriteLock;

/// Builds and starts the scheduler. Jobs close over `Arc`-wrapped state since
/// `tokio-cron-scheduler` job closures must be `'static`.
pub async fn start(
    cfg: Arc<Config>,
    stores: Stores,
    write_lock: WriteLock,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await.context("creating job scheduler")?;

    scheduler
        .add(maintenance_window_start_job(cfg.clone(), stores.clone(), write_lock.clone())?)
        .await
        .context("scheduling maintenance window start")?;

    scheduler
        .add(maintenance_window_end_job(cfg.clone(), stores.clone())?)
        .await
        .context("scheduling maintenance window end")?;

    scheduler
        .add(combined_stats_job(cfg.clone(), stores.clone())?)
        .await
        .context("scheduling combined stats regeneration")?;

    scheduler
        .add(weekly_vacuum_job(stores.clone(), write_lock.clone())?)
        .await
        .context("scheduling weekly trade vacuum")?;

    scheduler.start().await.context("starting job scheduler")?;
    Ok(scheduler)
}

fn cron_for_weekly(day: u32, hour: u32) -> String {
    // tokio-cron-scheduler uses a 7-field cron: sec min hour day-of-month month day-of-week.
    format!("0 0 {hour} * * {day}")
}

fn maintenance_window_start_job(cfg: Arc<Config>, stores: Stores, write_lock: WriteLock) -> Result<Job> {
    let expr = cron_for_weekly(cfg.maintenance_day, cfg.maintenance_start_hour);
    Job::new_async(expr.as_str(), move |_uuid, _l| {
        let cfg = cfg.clone();
        let stores = stores.clone();
        let write_lock = write_lock.clone();
        Box::pin(async move {
            info!("maintenance window start: vacuum, analyze, backup");
            write_lock.set();
            match maintenance::run_maintenance_window(&cfg, &stores).await {
                Ok(records) => info!("maintenance window complete, {} backup records", records.len()),
                Err(e) => error!("maintenance window failed: {e}"),
            }
            write_lock.clear();
        })
    })
    .context("building maintenance-window-start job")
}

fn maintenance_window_end_job(cfg: Arc<Config>, stores: Stores) -> Result<Job> {
    let expr = cron_for_weekly(cfg.maintenance_day, cfg.maintenance_end_hour);
    Job::new_async(expr.as_str(), move |_uuid, _l| {
        let cfg = cfg.clone();
        let stores = stores.clone();
        Box::pin(async move {
            info!("maintenance window end: full stats regeneration");
            let manager = SnapshotManager::new(&cfg, stores.clone());
            if let Err(e) = manager.refresh().await {
                error!("snapshot refresh before full stats regen failed: {e}");
                return;
            }
            let paths = manager.paths();
            if let Err(e) = stats::generate_full(&cfg.cache_dir, &paths, cfg.skip_regional_reports) {
                error!("full stats regeneration failed: {e}");
            }
        })
    })
    .context("building maintenance-window-end job")
}

fn combined_stats_job(cfg: Arc<Config>, stores: Stores) -> Result<Job> {
    Job::new_async("0 0 */6 * * *", move |_uuid, _l| {
        let cfg = cfg.clone();
        let stores = stores.clone();
        Box::pin(async move {
            let manager = SnapshotManager::new(&cfg, stores.clone());
            if manager.are_fresh() && cache_is_recent(&cfg) {
                info!("skipping combined stats regeneration, snapshots and cache still fresh");
                return;
            }
            if let Err(e) = manager.refresh().await {
                error!("snapshot refresh before combined stats regen failed: {e}");
                return;
            }
            let paths = manager.paths();
            if let Err(e) = stats::generate_combined(&cfg.cache_dir, &paths) {
                error!("combined stats regeneration failed: {e}");
            }
        })
    })
    .context("building combined-stats job")
}

fn weekly_vacuum_job(stores: Stores, write_lock: WriteLock) -> Result<Job> {
    Job::new_async("0 0 3 * * 0", move |_uuid, _l| {
        let stores = stores.clone();
        let write_lock = write_lock.clone();
        Box::pin(async move {
            info!("weekly trade vacuum starting");
            write_lock.set();
            if let Err(e) = maintenance::vacuum_trade_db(&stores).await {
                error!("weekly trade vacuum failed: {e}");
            }
            write_lock.clear();
        })
    })
    .context("building weekly-vacuum job")
}

const STATS_FRESHNESS_THRESHOLD: std::time::Duration = std::time::Duration::from_secs(6 * 3600);

fn cache_is_recent(cfg: &Config) -> bool {
    let marker = cfg.cache_dir.join("database-stats.json");
    std::fs::metadata(&marker)
        .and_then(|m| m.modified())
        .map(|mtime| {
            std::time::SystemTime::now()
                .duration_since(mtime)
                .unwrap_or(std::time::Duration::MAX)
                <= STATS_FRESHNESS_THRESHOLD
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekly_cron_expression_has_six_fields() {
        let expr = cron_for_weekly(4, 7);
        assert_eq!(expr.split(' ').count(), 6);
        assert_eq!(expr, "0 0 7 * * 4");
    }
}

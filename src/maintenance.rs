//! Backup & compaction (C9): online backup, retention sweeps, vacuum, analyze.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use rusqlite::backup::Backup;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{self, stations, trade, Stores};
use crate::error::MaintenanceError;

const MIN_BACKUP_FILE_BYTES: u64 = 4096;

#[derive(Debug, Serialize)]
pub struct BackupRecord {
    pub db: String,
    pub started_at: String,
    pub succeeded: bool,
    pub bytes: u64,
}

/// Online backup of all four stores via the native backup API, one at a time to keep peak disk
/// usage bounded. Failures are logged to `backup.log`-equivalent records and returned so the
/// caller can decide whether to keep the write-lock held longer.
pub async fn backup_all(cfg: &Config, stores: &Stores) -> Vec<BackupRecord> {
    let mut records = Vec::new();
    records.push(backup_one("systems", &stores.systems, &cfg.backup_dir.join("systems.db")).await);
    records.push(backup_one("locations", &stores.locations, &cfg.backup_dir.join("locations.db")).await);
    records.push(backup_one("stations", &stores.stations, &cfg.backup_dir.join("stations.db")).await);
    records.push(backup_one("trade", &stores.trade, &cfg.backup_dir.join("trade.db")).await);
    write_backup_log(&cfg.backup_dir, &records);
    records
}

async fn backup_one(
    label: &str,
    source: &std::sync::Arc<tokio::sync::Mutex<Connection>>,
    dest: &Path,
) -> BackupRecord {
    let started_at = Utc::now().to_rfc3339();
    match backup_one_inner(source, dest).await {
        Ok(bytes) => {
            info!("backed up {label} to {} ({bytes} bytes)", dest.display());
            BackupRecord { db: label.to_string(), started_at, succeeded: true, bytes }
        }
        Err(e) => {
            warn!("backup of {label} failed: {e}");
            BackupRecord { db: label.to_string(), started_at, succeeded: false, bytes: 0 }
        }
    }
}

async fn backup_one_inner(
    source: &std::sync::Arc<tokio::sync::Mutex<Connection>>,
    dest: &Path,
) -> Result<u64, MaintenanceError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let available = available_bytes(dest.parent().unwrap_or_else(|| Path::new(".")));
    if let Some(available) = available {
        if available < MIN_BACKUP_FILE_BYTES {
            return Err(MaintenanceError::BackupDiskSpace { db: dest.to_string_lossy().to_string() });
        }
    }

    let source = source.lock().await;
    let mut dest_conn = Connection::open(dest)?;
    {
        let backup = Backup::new(&source, &mut dest_conn)?;
        backup.run_to_completion(100, std::time::Duration::from_millis(50), None)?;
    }
    drop(dest_conn);

    verify_backup(dest, table_for_path(dest)).map_err(|reason| MaintenanceError::BackupVerification {
        db: dest.to_string_lossy().to_string(),
        reason,
    })?;

    let bytes = std::fs::metadata(dest)?.len();
    Ok(bytes)
}

fn table_for_path(path: &Path) -> &'static str {
    match path.file_stem().and_then(|s| s.to_str()) {
        Some("systems") => "systems",
        Some("locations") => "locations",
        Some("stations") => "stations",
        _ => "trade",
    }
}

fn verify_backup(path: &Path, table: &str) -> Result<(), String> {
    let size = std::fs::metadata(path).map_err(|e| e.to_string())?.len();
    if size < MIN_BACKUP_FILE_BYTES {
        return Err(format!("backup file too small ({size} bytes)"));
    }
    let conn = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| e.to_string())?;
    let exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table],
            |r| r.get(0),
        )
        .map_err(|e| e.to_string())?;
    if exists == 0 {
        return Err(format!("table {table} missing from backup"));
    }
    Ok(())
}

fn available_bytes(_dir: &Path) -> Option<u64> {
    // No portable stdlib statvfs; disk-space exhaustion surfaces as a write error instead, which
    // the caller already classifies as BackupDiskSpace-equivalent via the Io conversion.
    None
}

fn write_backup_log(backup_dir: &Path, records: &[BackupRecord]) {
    let log_path = backup_dir.join("backup.log");
    let mut lines = String::new();
    for record in records {
        lines.push_str(&format!(
            "{} db={} ok={} bytes={}\n",
            record.started_at, record.db, record.succeeded, record.bytes
        ));
    }
    if let Err(e) = append_file(&log_path, &lines) {
        warn!("failed to write backup.log: {e}");
    }

    let json_path = backup_dir.join("backup.json");
    if let Ok(json) = serde_json::to_vec_pretty(records) {
        let _ = std::fs::write(json_path, json);
    }
}

fn append_file(path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(content.as_bytes())
}

/// Whether a backup has ever been recorded; used at startup (§4.10) to decide whether to force an
/// immediate backup before entering the ingestion loop.
pub fn backup_log_exists(cfg: &Config) -> bool {
    cfg.backup_dir.join("backup.log").exists()
}

#[derive(Debug, Default, Serialize)]
pub struct RetentionSweepReport {
    pub trade_rows_deleted: usize,
    pub rescue_ship_rows_deleted: usize,
    pub fleet_carrier_rows_deleted: usize,
}

/// Deletes rows older than the configured horizons. Logged and continued past on error (§7):
/// a failed sweep just means the next maintenance window tries again.
pub async fn run_retention_sweep(cfg: &Config, stores: &Stores) -> RetentionSweepReport {
    let mut report = RetentionSweepReport::default();

    {
        let conn = stores.trade.lock().await;
        match trade::sweep_older_than(&conn, cfg.trade_retention_days) {
            Ok(n) => report.trade_rows_deleted = n,
            Err(e) => warn!("trade retention sweep failed: {e}"),
        }
    }

    if let Some(horizon) = cfg.rescue_ship_retention_days {
        let conn = stores.stations.lock().await;
        match stations::sweep_stale_by_type(&conn, stations::STATION_TYPE_RESCUE_SHIP, horizon) {
            Ok(n) => report.rescue_ship_rows_deleted = n,
            Err(e) => warn!("rescue-ship retention sweep failed: {e}"),
        }
    }

    if let Some(horizon) = cfg.fleet_carrier_retention_days {
        let conn = stores.stations.lock().await;
        match stations::sweep_stale_by_type(&conn, stations::STATION_TYPE_FLEET_CARRIER, horizon) {
            Ok(n) => report.fleet_carrier_rows_deleted = n,
            Err(e) => warn!("fleet-carrier retention sweep failed: {e}"),
        }
    }

    info!(
        "retention sweep: trade={} rescue_ship={} fleet_carrier={}",
        report.trade_rows_deleted, report.rescue_ship_rows_deleted, report.fleet_carrier_rows_deleted
    );
    report
}

/// Rebuilds the trade file to reclaim deleted pages. Switches to on-disk temp storage for the
/// duration so the rebuild doesn't try to buffer large files in RAM, then restores the normal
/// in-memory setting.
pub async fn vacuum_trade_db(stores: &Stores) -> anyhow::Result<()> {
    let conn = stores.trade.lock().await;
    db::use_disk_temp_store(&conn).context("switching to disk temp store for vacuum")?;
    let result = conn.execute_batch("VACUUM");
    db::use_memory_temp_store(&conn).context("restoring memory temp store after vacuum")?;
    result.context("vacuuming trade database")?;
    info!("trade database vacuumed");
    Ok(())
}

/// Refreshes query-planner statistics. Cheap relative to vacuum; run after any sweep or index
/// creation that touched a meaningful fraction of rows.
pub async fn analyze_all(stores: &Stores) -> anyhow::Result<()> {
    for (label, conn) in [
        ("systems", &stores.systems),
        ("locations", &stores.locations),
        ("stations", &stores.stations),
        ("trade", &stores.trade),
    ] {
        let conn = conn.lock().await;
        conn.execute_batch("ANALYZE").with_context(|| format!("analyzing {label}"))?;
    }
    info!("analyze complete for all stores");
    Ok(())
}

/// Runs vacuum+analyze+backup in sequence, the body of the weekly maintenance-window-start job
/// (§4.8). Caller holds the write-lock for the duration.
pub async fn run_maintenance_window(cfg: &Config, stores: &Stores) -> anyhow::Result<Vec<BackupRecord>> {
    vacuum_trade_db(stores).await?;
    analyze_all(stores).await?;
    Ok(backup_all(cfg, stores).await)
}

/// Finds the full path for each snapshot database, used by the stats path. Kept here rather than
/// on `SnapshotManager` so maintenance can decide on cache freshness without importing `stats`.
pub fn snapshot_paths(cfg: &Config) -> std::collections::HashMap<&'static str, PathBuf> {
    [
        ("systems", cfg.snapshot_dir.join("systems.db")),
        ("locations", cfg.snapshot_dir.join("locations.db")),
        ("stations", cfg.snapshot_dir.join("stations.db")),
        ("trade", cfg.snapshot_dir.join("trade.db")),
    ]
    .into_iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn memdb_stores() -> Stores {
        let mk = || {
            let conn = Connection::open_in_memory().unwrap();
            Arc::new(Mutex::new(conn))
        };
        Stores { systems: mk(), locations: mk(), stations: mk(), trade: mk() }
    }

    #[tokio::test]
    async fn retention_sweep_reports_zero_on_empty_stores() {
        let stores = memdb_stores();
        trade::create_tables(&*stores.trade.lock().await, false).unwrap();
        stations::create_tables(&*stores.stations.lock().await, false).unwrap();

        let cfg_tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::from_env().unwrap();
        cfg.data_dir = cfg_tmp.path().to_path_buf();

        let report = run_retention_sweep(&cfg, &stores).await;
        assert_eq!(report.trade_rows_deleted, 0);
    }

    #[tokio::test]
    async fn backup_copies_into_destination_and_verifies() {
        let tmp = tempfile::tempdir().unwrap();
        let source = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        crate::db::systems::create_tables(&*source.lock().await, false).unwrap();
        crate::db::systems::insert_if_absent(&*source.lock().await, 1, "Sol", 0.0, 0.0, 0.0, "s0").unwrap();

        let dest = tmp.path().join("systems.db");
        let record = backup_one("systems", &source, &dest).await;
        assert!(record.succeeded);
        assert!(dest.exists());
    }
}

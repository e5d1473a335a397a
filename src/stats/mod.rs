//! Stats generators (C8): read snapshot files, write JSON reports into the cache directory.

pub mod commodities;
pub mod rare;
pub mod regional;
pub mod ticker;
pub mod totals;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

fn write_json<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> Result<()> {
    let path = dir.join(file_name);
    let json = serde_json::to_vec_pretty(value).context("serializing stats report")?;
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn open_readonly(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("opening snapshot {}", path.display()))
}

/// Regenerates `database-stats.json` and `commodity-ticker.json`; the lighter pair run on the
/// 6-hourly cadence.
pub fn generate_combined(cache_dir: &Path, snapshot_paths: &HashMap<&'static str, PathBuf>) -> Result<()> {
    let totals = totals::generate(snapshot_paths)?;
    write_json(cache_dir, "database-stats.json", &totals)?;

    let ticker = ticker::generate(&snapshot_paths["trade"])?;
    write_json(cache_dir, "commodity-ticker.json", &ticker)?;

    info!("combined stats regenerated");
    Ok(())
}

/// Regenerates per-commodity aggregates and regional reports; runs on the weekly maintenance
/// window since it's the most expensive pass (one query per distinct commodity name, plus the
/// cross-store regional join). `skip_regional_reports` (§6) skips only the regional half, since
/// that join is the more expensive of the two.
pub fn generate_full(
    cache_dir: &Path,
    snapshot_paths: &HashMap<&'static str, PathBuf>,
    skip_regional_reports: bool,
) -> Result<()> {
    let aggregates = commodities::generate_all(&snapshot_paths["trade"])?;
    write_json(cache_dir, "commodities.json", &aggregates)?;

    let commodities_dir = cache_dir.join("commodities");
    std::fs::create_dir_all(&commodities_dir).context("creating per-commodity report directory")?;
    for aggregate in &aggregates {
        let safe_name = aggregate.commodity_name.replace(['/', '\\'], "_");
        let dir = commodities_dir.join(&safe_name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating report directory for {}", aggregate.commodity_name))?;
        write_json(&dir, "aggregate.json", aggregate)?;
    }

    if skip_regional_reports {
        warn!("skipping regional report generation (SKIP_REGIONAL_REPORTS)");
        info!("full stats regenerated ({} commodities, regional reports skipped)", aggregates.len());
        return Ok(());
    }

    let systems_conn = open_readonly(&snapshot_paths["systems"])?;
    let stations_conn = open_readonly(&snapshot_paths["stations"])?;
    let reports = regional::generate_all(
        &systems_conn,
        &stations_conn,
        &snapshot_paths["trade"],
        regional::DEFAULT_REFERENCE_SYSTEMS,
    )?;
    write_json(cache_dir, "regional-reports.json", &reports)?;

    info!("full stats regenerated ({} commodities, {} regional reports)", aggregates.len(), reports.len());
    Ok(())
}

//! Database-totals report (§4.6): one aggregate query per store, run against snapshot files.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::stations::STATION_TYPE_FLEET_CARRIER;

#[derive(Debug, Serialize)]
pub struct DatabaseTotals {
    pub total_systems: i64,
    pub total_points_of_interest: i64,
    pub station_count: i64,
    pub fleet_carrier_count: i64,
    pub stations_updated_last_24h: i64,
    pub trade_order_count: i64,
    pub unique_commodity_count: i64,
    pub unique_market_count: i64,
    pub trade_updated_last_24h: i64,
    pub updates_last_24h_total: i64,
}

fn open_readonly(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("opening snapshot {}", path.display()))
}

pub fn generate(snapshot_paths: &std::collections::HashMap<&'static str, std::path::PathBuf>) -> Result<DatabaseTotals> {
    let systems = open_readonly(&snapshot_paths["systems"])?;
    let locations = open_readonly(&snapshot_paths["locations"])?;
    let stations = open_readonly(&snapshot_paths["stations"])?;
    let trade = open_readonly(&snapshot_paths["trade"])?;

    let total_systems: i64 = systems.query_row("SELECT COUNT(*) FROM systems", [], |r| r.get(0))?;
    let total_points_of_interest: i64 = locations.query_row("SELECT COUNT(*) FROM locations", [], |r| r.get(0))?;

    // `updatedAt` is stored as RFC3339 (`to_rfc3339()`); the cutoff must be computed with the same
    // `T`-separated, offset-less-prefix format via `strftime`, not SQLite's `datetime()`, or every
    // row from the cutoff's calendar day would compare as "recent" regardless of time of day.
    let (station_count, fleet_carrier_count, stations_updated_last_24h): (i64, i64, i64) = stations.query_row(
        "SELECT
            COUNT(*),
            SUM(CASE WHEN stationType = ?1 THEN 1 ELSE 0 END),
            SUM(CASE WHEN updatedAt > strftime('%Y-%m-%dT%H:%M:%S', 'now', '-1 day') THEN 1 ELSE 0 END)
         FROM stations",
        [STATION_TYPE_FLEET_CARRIER],
        |row| Ok((row.get(0)?, row.get::<_, Option<i64>>(1)?.unwrap_or(0), row.get::<_, Option<i64>>(2)?.unwrap_or(0))),
    )?;

    let (trade_order_count, unique_commodity_count, unique_market_count, trade_updated_last_24h): (i64, i64, i64, i64) =
        trade.query_row(
            "SELECT
                COUNT(*),
                COUNT(DISTINCT commodityName),
                COUNT(DISTINCT marketId),
                SUM(CASE WHEN updatedAt > strftime('%Y-%m-%dT%H:%M:%S', 'now', '-1 day') THEN 1 ELSE 0 END)
             FROM trade",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get::<_, Option<i64>>(3)?.unwrap_or(0))),
        )?;

    Ok(DatabaseTotals {
        total_systems,
        total_points_of_interest,
        station_count,
        fleet_carrier_count,
        stations_updated_last_24h,
        trade_order_count,
        unique_commodity_count,
        unique_market_count,
        trade_updated_last_24h,
        updates_last_24h_total: stations_updated_last_24h + trade_updated_last_24h,
    })
}

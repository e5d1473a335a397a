//! Regional reports (§4.6, §9 design note a): best exporters/importers per commodity within a
//! radius of a reference system, bounding-box pre-filter then exact distance.
//!
//! Stations and trade live in separate SQLite files, so the cross-store join is done by
//! `ATTACH DATABASE`-ing the trade snapshot onto the stations connection for the duration of the
//! query, the same trick the backup/maintenance path would use for any other cross-store read.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use tracing::warn;

const DEFAULT_RADIUS_LY: f64 = 500.0;
const DEFAULT_MIN_VOLUME: i64 = 1000;
const BEST_N: usize = 10;

pub const DEFAULT_REFERENCE_SYSTEMS: &[&str] = &["Sol", "Colonia"];

#[derive(Debug, Serialize)]
pub struct RegionalReport {
    pub reference_system: String,
    pub radius_ly: f64,
    pub commodities: Vec<RegionalCommodity>,
}

#[derive(Debug, Serialize)]
pub struct RegionalCommodity {
    pub commodity_name: String,
    pub best_exporters: Vec<MarketQuote>,
    pub best_importers: Vec<MarketQuote>,
    /// §9(a): `bestImporters[0].sellPrice - bestExporters[0].buyPrice`, when both sides have at
    /// least one candidate. `None` if either side is empty.
    pub max_price_delta: Option<i64>,
}

#[derive(Debug, Serialize, Clone)]
pub struct MarketQuote {
    pub market_id: i64,
    pub station_name: Option<String>,
    pub system_name: Option<String>,
    pub price: i64,
}

struct Point {
    x: f64,
    y: f64,
    z: f64,
}

fn reference_point(systems_conn: &Connection, name: &str) -> Result<Option<Point>> {
    Ok(systems_conn
        .query_row(
            "SELECT systemX, systemY, systemZ FROM systems WHERE systemName = ?1 COLLATE NOCASE",
            [name],
            |r| Ok(Point { x: r.get(0)?, y: r.get(1)?, z: r.get(2)? }),
        )
        .ok())
}

fn distance(a: &Point, b: &Point) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2) + (a.z - b.z).powi(2)).sqrt()
}

/// Attaches `trade_db_path` onto `stations_conn` under the alias `regional_trade` so a single
/// connection can join across both stores. Detaches on drop via the returned guard.
struct AttachedTrade<'a> {
    conn: &'a Connection,
}

impl<'a> AttachedTrade<'a> {
    fn new(conn: &'a Connection, trade_db_path: &Path) -> Result<Self> {
        let path_str = trade_db_path.to_string_lossy().replace('\'', "''");
        conn.execute_batch(&format!("ATTACH DATABASE '{path_str}' AS regional_trade"))
            .context("attaching trade snapshot for regional report")?;
        Ok(Self { conn })
    }
}

impl Drop for AttachedTrade<'_> {
    fn drop(&mut self) {
        let _ = self.conn.execute_batch("DETACH DATABASE regional_trade");
    }
}

/// Generates a report per reference system, skipping (with a warning, not an error) any
/// reference system that isn't present in the systems store yet. The whole pass is itself
/// skippable via `SKIP_REGIONAL_REPORTS` (§6) since the cross-store join is the most expensive
/// part of a full stats regeneration.
pub fn generate_all(
    systems_conn: &Connection,
    stations_conn: &Connection,
    trade_db_path: &Path,
    reference_systems: &[&str],
) -> Result<Vec<RegionalReport>> {
    let attached = AttachedTrade::new(stations_conn, trade_db_path)?;

    let mut reports = Vec::new();
    for name in reference_systems {
        match generate_one(systems_conn, stations_conn, name, DEFAULT_RADIUS_LY, DEFAULT_MIN_VOLUME)? {
            Some(report) => reports.push(report),
            None => warn!("skipping regional report for {name}: reference system not in store"),
        }
    }
    drop(attached);
    Ok(reports)
}

fn generate_one(
    systems_conn: &Connection,
    stations_conn: &Connection,
    reference_system: &str,
    radius_ly: f64,
    min_volume: i64,
) -> Result<Option<RegionalReport>> {
    let Some(origin) = reference_point(systems_conn, reference_system)? else {
        return Ok(None);
    };

    // Bounding box pre-filter guarantees no false negatives; exact distance narrows afterward.
    let mut stmt = systems_conn.prepare(
        "SELECT systemName, systemX, systemY, systemZ FROM systems
         WHERE systemX BETWEEN ?1 AND ?2 AND systemY BETWEEN ?3 AND ?4 AND systemZ BETWEEN ?5 AND ?6",
    )?;
    let candidates: Vec<(String, Point)> = stmt
        .query_map(
            rusqlite::params![
                origin.x - radius_ly, origin.x + radius_ly,
                origin.y - radius_ly, origin.y + radius_ly,
                origin.z - radius_ly, origin.z + radius_ly,
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    Point { x: row.get(1)?, y: row.get(2)?, z: row.get(3)? },
                ))
            },
        )?
        .collect::<rusqlite::Result<_>>()?;
    drop(stmt);

    let in_range: Vec<&str> = candidates
        .iter()
        .filter(|(_, p)| distance(&origin, p) <= radius_ly)
        .map(|(name, _)| name.as_str())
        .collect();

    if in_range.is_empty() {
        return Ok(Some(RegionalReport { reference_system: reference_system.to_string(), radius_ly, commodities: vec![] }));
    }

    let placeholders = in_range.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT DISTINCT t.commodityName
         FROM regional_trade.trade t
         JOIN stations s ON s.marketId = t.marketId
         WHERE s.systemName IN ({placeholders})
           AND (t.stock >= ?{} OR t.demand >= ?{})",
        in_range.len() + 1,
        in_range.len() + 2,
    );
    let mut stmt = stations_conn.prepare(&sql)?;
    let mut params: Vec<&dyn rusqlite::ToSql> = in_range.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
    params.push(&min_volume);
    params.push(&min_volume);
    let commodity_names: Vec<String> = stmt.query_map(params.as_slice(), |row| row.get(0))?.collect::<rusqlite::Result<_>>()?;
    drop(stmt);

    let mut commodities = Vec::new();
    for commodity in commodity_names {
        let best_exporters = best_markets(stations_conn, &commodity, &in_range, min_volume, true)?;
        let best_importers = best_markets(stations_conn, &commodity, &in_range, min_volume, false)?;
        let max_price_delta = match (best_exporters.first(), best_importers.first()) {
            (Some(exporter), Some(importer)) => Some(importer.price - exporter.price),
            _ => None,
        };
        commodities.push(RegionalCommodity { commodity_name: commodity, best_exporters, best_importers, max_price_delta });
    }

    Ok(Some(RegionalReport { reference_system: reference_system.to_string(), radius_ly, commodities }))
}

/// Exporters rank by lowest buyPrice (cheapest place to buy stock and sell elsewhere); importers
/// rank by highest sellPrice (best place to sell). §9(a): when candidates tie on price, the
/// station the ORDER BY lands on first wins. The top exporter/importer pair is what
/// `max_price_delta` is derived from in the caller, not recomputed here.
fn best_markets(
    stations_conn: &Connection,
    commodity: &str,
    systems_in_range: &[&str],
    min_volume: i64,
    exporters: bool,
) -> Result<Vec<MarketQuote>> {
    let placeholders = systems_in_range.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let (price_col, volume_col, order) = if exporters {
        ("buyPrice", "stock", "ASC")
    } else {
        ("sellPrice", "demand", "DESC")
    };
    let sql = format!(
        "SELECT t.marketId, s.stationName, s.systemName, t.{price_col}
         FROM regional_trade.trade t
         JOIN stations s ON s.marketId = t.marketId
         WHERE t.commodityName = ? AND s.systemName IN ({placeholders}) AND t.{volume_col} >= ?
         ORDER BY t.{price_col} {order}
         LIMIT {BEST_N}",
    );
    let mut stmt = stations_conn.prepare(&sql).context("preparing regional best-markets query")?;

    let mut params: Vec<&dyn rusqlite::ToSql> = vec![&commodity];
    params.extend(systems_in_range.iter().map(|s| s as &dyn rusqlite::ToSql));
    params.push(&min_volume);

    let rows: Vec<MarketQuote> = stmt
        .query_map(params.as_slice(), |row| {
            Ok(MarketQuote {
                market_id: row.get(0)?,
                station_name: row.get(1)?,
                system_name: row.get(2)?,
                price: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_missing_reference_system_without_erroring() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::systems::create_tables(&conn, false).unwrap();
        let result = reference_point(&conn, "Nonexistent").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn distance_is_euclidean() {
        let a = Point { x: 0.0, y: 0.0, z: 0.0 };
        let b = Point { x: 3.0, y: 4.0, z: 0.0 };
        assert_eq!(distance(&a, &b), 5.0);
    }

    #[test]
    fn attach_and_detach_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let trade_path = tmp.path().join("trade.db");
        let trade_conn = Connection::open(&trade_path).unwrap();
        crate::db::trade::create_tables(&trade_conn, false).unwrap();
        drop(trade_conn);

        let stations_conn = Connection::open_in_memory().unwrap();
        crate::db::stations::create_tables(&stations_conn, false).unwrap();

        {
            let _attached = AttachedTrade::new(&stations_conn, &trade_path).unwrap();
            let count: i64 = stations_conn
                .query_row("SELECT COUNT(*) FROM regional_trade.trade", [], |r| r.get(0))
                .unwrap();
            assert_eq!(count, 0);
        }

        // After the guard drops, the alias should no longer resolve.
        let result = stations_conn.query_row("SELECT COUNT(*) FROM regional_trade.trade", [], |r: &rusqlite::Row| r.get::<_, i64>(0));
        assert!(result.is_err());
    }
}

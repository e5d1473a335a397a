//! Systems store schema and accessors.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

/// The only system allowed to sit at `(0,0,0)` (§3 invariant 1).
pub const ORIGIN_SYSTEM_NAME: &str = "Sol";

const TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS systems (
    systemAddress INTEGER PRIMARY KEY,
    systemName    TEXT NOT NULL COLLATE NOCASE,
    systemX       REAL NOT NULL,
    systemY       REAL NOT NULL,
    systemZ       REAL NOT NULL,
    systemSector  TEXT NOT NULL,
    updatedAt     TEXT NOT NULL
) WITHOUT ROWID;
";

const INDEX_SQL: &str = "
CREATE INDEX IF NOT EXISTS idx_systems_name ON systems(systemName);
CREATE INDEX IF NOT EXISTS idx_systems_sector ON systems(systemSector);
";

/// `skip_expensive_indexes` (§6) skips every index here: the primary key already covers
/// `systemAddress` lookups, these two speed up name/sector scans but cost write throughput.
pub fn create_tables(conn: &Connection, skip_expensive_indexes: bool) -> Result<()> {
    conn.execute_batch(TABLE_SQL)?;
    if !skip_expensive_indexes {
        conn.execute_batch(INDEX_SQL)?;
    }
    Ok(())
}

pub fn ensure_migrations(conn: &Connection) -> Result<()> {
    // additive migration slot: future columns get ensure_column() calls here, never ALTER/DROP.
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemRow {
    pub system_address: i64,
    pub system_name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub sector: String,
    pub updated_at: String,
}

pub fn coords_are_valid(name: &str, x: f64, y: f64, z: f64) -> bool {
    !(x == 0.0 && y == 0.0 && z == 0.0) || name.eq_ignore_ascii_case(ORIGIN_SYSTEM_NAME)
}

pub fn exists(conn: &Connection, system_address: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM systems WHERE systemAddress = ?1",
            params![system_address],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Insert-if-absent keyed by `systemAddress`; never overwrites existing coordinates once a row
/// exists (§3 invariant: route-echo events without coordinates must not clobber).
pub fn insert_if_absent(
    conn: &Connection,
    system_address: i64,
    name: &str,
    x: f64,
    y: f64,
    z: f64,
    sector: &str,
) -> Result<()> {
    if !coords_are_valid(name, x, y, z) {
        return Ok(());
    }
    if exists(conn, system_address)? {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO systems (systemAddress, systemName, systemX, systemY, systemZ, systemSector, updatedAt)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(systemAddress) DO NOTHING",
        params![system_address, name, x, y, z, sector, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn lookup_by_name(conn: &Connection, name: &str) -> Result<Option<SystemRow>> {
    conn.query_row(
        "SELECT systemAddress, systemName, systemX, systemY, systemZ, systemSector, updatedAt
         FROM systems WHERE systemName = ?1 COLLATE NOCASE",
        params![name],
        |row| {
            Ok(SystemRow {
                system_address: row.get(0)?,
                system_name: row.get(1)?,
                x: row.get(2)?,
                y: row.get(3)?,
                z: row.get(4)?,
                sector: row.get(5)?,
                updated_at: row.get(6)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

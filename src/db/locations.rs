//! Locations store schema and accessors: surface points of interest without a market id.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};

/// Rows whose name begins with this (case-insensitive) are discarded on write (§3).
pub const EXCLUDED_NAME_PREFIX: &str = "construction site";

const TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS locations (
    locationId    TEXT PRIMARY KEY,
    locationName  TEXT NOT NULL COLLATE NOCASE,
    systemAddress INTEGER NOT NULL,
    systemName    TEXT NOT NULL,
    systemX       REAL NOT NULL,
    systemY       REAL NOT NULL,
    systemZ       REAL NOT NULL,
    bodyId        INTEGER,
    bodyName      TEXT,
    latitude      REAL,
    longitude     REAL,
    updatedAt     TEXT NOT NULL
) WITHOUT ROWID;
";

const INDEX_SQL: &str = "
CREATE INDEX IF NOT EXISTS idx_locations_system ON locations(systemAddress);
CREATE INDEX IF NOT EXISTS idx_locations_name ON locations(locationName);
";

/// `skip_expensive_indexes` (§6) skips both secondary indexes, keeping only the `locationId`
/// primary key.
pub fn create_tables(conn: &Connection, skip_expensive_indexes: bool) -> Result<()> {
    conn.execute_batch(TABLE_SQL)?;
    if !skip_expensive_indexes {
        conn.execute_batch(INDEX_SQL)?;
    }
    Ok(())
}

pub fn ensure_migrations(_conn: &Connection) -> Result<()> {
    Ok(())
}

pub fn is_excluded(name: &str) -> bool {
    name.trim().to_ascii_lowercase().starts_with(EXCLUDED_NAME_PREFIX)
}

/// Content hash over `systemAddress|name|bodyId|lat|lon` (§3 invariant 4). Truncated to 16
/// bytes / 32 hex chars — ample for a primary key derived from point-of-interest coordinates.
pub fn location_id(system_address: i64, name: &str, body_id: Option<i64>, lat: Option<f64>, lon: Option<f64>) -> String {
    let payload = format!(
        "{}|{}|{}|{}|{}",
        system_address,
        name,
        body_id.map(|v| v.to_string()).unwrap_or_default(),
        lat.map(|v| v.to_string()).unwrap_or_default(),
        lon.map(|v| v.to_string()).unwrap_or_default(),
    );
    let digest = Sha256::digest(payload.as_bytes());
    hex::encode(&digest[..16])
}

#[allow(clippy::too_many_arguments)]
pub fn upsert(
    conn: &Connection,
    name: &str,
    system_address: i64,
    system_name: &str,
    system_x: f64,
    system_y: f64,
    system_z: f64,
    body_id: Option<i64>,
    body_name: Option<&str>,
    lat: Option<f64>,
    lon: Option<f64>,
) -> Result<()> {
    if is_excluded(name) {
        return Ok(());
    }
    let id = location_id(system_address, name, body_id, lat, lon);
    conn.execute(
        "INSERT INTO locations
            (locationId, locationName, systemAddress, systemName, systemX, systemY, systemZ,
             bodyId, bodyName, latitude, longitude, updatedAt)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(locationId) DO UPDATE SET
            locationName = excluded.locationName,
            systemName = excluded.systemName,
            systemX = excluded.systemX,
            systemY = excluded.systemY,
            systemZ = excluded.systemZ,
            bodyId = excluded.bodyId,
            bodyName = excluded.bodyName,
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            updatedAt = excluded.updatedAt",
        params![
            id,
            name,
            system_address,
            system_name,
            system_x,
            system_y,
            system_z,
            body_id,
            body_name,
            lat,
            lon,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_id_is_deterministic() {
        let a = location_id(1, "Outpost Alpha", Some(2), Some(1.0), Some(2.0));
        let b = location_id(1, "Outpost Alpha", Some(2), Some(1.0), Some(2.0));
        assert_eq!(a, b);
    }

    #[test]
    fn excluded_prefix_is_case_insensitive() {
        assert!(is_excluded("Construction Site: Orbital Dock"));
        assert!(is_excluded("construction site alpha"));
        assert!(!is_excluded("Jameson Memorial"));
    }

    #[test]
    fn upsert_skips_excluded_names() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn, false).unwrap();
        upsert(&conn, "Construction Site: X", 1, "Sol", 0.0, 0.0, 0.0, None, None, None, None).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM locations", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn upsert_is_idempotent_by_location_id() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn, false).unwrap();
        upsert(&conn, "Outpost", 1, "Sol", 1.0, 2.0, 3.0, Some(4), Some("Body"), Some(5.0), Some(6.0)).unwrap();
        upsert(&conn, "Outpost", 1, "Sol", 1.0, 2.0, 3.0, Some(4), Some("Body"), Some(5.0), Some(6.0)).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM locations", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }
}

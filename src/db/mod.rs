//! Storage engines (C2): shared pragma policy and table bootstrap for the four embedded stores.

pub mod locations;
pub mod stations;
pub mod systems;
pub mod trade;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::config::Config;

/// Page cache size, expressed as SQLite wants it: a negative number is kibibytes, a positive
/// number is pages. 64 MiB keeps hot pages resident without needing a huge RSS budget.
const CACHE_SIZE_KIB: i64 = -64_000;
const MMAP_SIZE_BYTES: i64 = 268_435_456; // 256 MiB
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Opens a connection with the durability/performance pragmas every store shares, per §4.10.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("opening database {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS as u64))
        .context("setting busy_timeout")?;
    conn.pragma_update(None, "cache_size", CACHE_SIZE_KIB)
        .context("setting cache_size")?;
    conn.pragma_update(None, "temp_store", "MEMORY")
        .context("setting temp_store=MEMORY")?;
    conn.pragma_update(None, "mmap_size", MMAP_SIZE_BYTES)
        .context("setting mmap_size")?;

    Ok(conn)
}

/// Switches a connection to on-disk temp storage for the duration of a vacuum, so large files
/// don't try to buffer the rebuild in RAM on small hosts. Caller is responsible for restoring
/// `MEMORY` afterwards (see `maintenance::vacuum_trade_db`).
pub fn use_disk_temp_store(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "temp_store", "FILE")
        .context("setting temp_store=FILE for vacuum")
}

pub fn use_memory_temp_store(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "temp_store", "MEMORY")
        .context("restoring temp_store=MEMORY")
}

/// Basic integrity check, run at startup and during backup verification (§7).
pub fn quick_integrity_check(conn: &Connection) -> Result<bool> {
    let result: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    Ok(result == "ok")
}

/// Adds `column` to `table` if it isn't already present. The only migration shape this system
/// supports (design note §9(c)): additive, never renaming or dropping.
pub fn ensure_column(conn: &Connection, table: &str, column: &str, decl_type: &str) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let present = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|r| r.ok())
        .any(|name| name.eq_ignore_ascii_case(column));
    drop(stmt);

    if !present {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl_type}"))
            .with_context(|| format!("adding column {table}.{column}"))?;
    }
    Ok(())
}

/// Each store wrapped behind an async mutex, matching the one-writer-at-a-time rule in §5 — the
/// ingestor and maintenance tasks never hold more than one of these at once except when the
/// stats path attaches one store's file to another's connection (C8).
#[derive(Clone)]
pub struct Stores {
    pub systems: Arc<Mutex<Connection>>,
    pub locations: Arc<Mutex<Connection>>,
    pub stations: Arc<Mutex<Connection>>,
    pub trade: Arc<Mutex<Connection>>,
}

impl Stores {
    pub fn open_all(cfg: &Config) -> Result<Self> {
        let systems = open(&cfg.systems_db_path())?;
        systems::create_tables(&systems, cfg.skip_expensive_indexes)?;
        systems::ensure_migrations(&systems)?;
        if !quick_integrity_check(&systems)? {
            anyhow::bail!("integrity check failed for {}", cfg.systems_db_path().display());
        }

        let locations = open(&cfg.locations_db_path())?;
        locations::create_tables(&locations, cfg.skip_expensive_indexes)?;
        locations::ensure_migrations(&locations)?;
        if !quick_integrity_check(&locations)? {
            anyhow::bail!("integrity check failed for {}", cfg.locations_db_path().display());
        }

        let stations = open(&cfg.stations_db_path())?;
        stations::create_tables(&stations, cfg.skip_expensive_indexes)?;
        stations::ensure_migrations(&stations)?;
        if !quick_integrity_check(&stations)? {
            anyhow::bail!("integrity check failed for {}", cfg.stations_db_path().display());
        }

        let trade = open(&cfg.trade_db_path())?;
        trade::create_tables(&trade, cfg.skip_expensive_indexes)?;
        trade::ensure_migrations(&trade)?;
        if !quick_integrity_check(&trade)? {
            anyhow::bail!("integrity check failed for {}", cfg.trade_db_path().display());
        }

        Ok(Self {
            systems: Arc::new(Mutex::new(systems)),
            locations: Arc::new(Mutex::new(locations)),
            stations: Arc::new(Mutex::new(stations)),
            trade: Arc::new(Mutex::new(trade)),
        })
    }
}

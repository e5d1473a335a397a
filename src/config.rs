//! Config & paths (C1).
//!
//! Resolves directories, feed URL, maintenance window and feature flags from the process
//! environment, optionally overlaid with a sibling TOML config file. Environment variables win
//! over the file; the file wins over the defaults below.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_FEED_URL: &str = "tcp://eddn.edcd.io:9500";
const DEFAULT_HTTP_PORT: u16 = 8090;
const DEFAULT_SECTOR_GRID_LY: f64 = 100.0;
const DEFAULT_SECTOR_HASH_BYTES: usize = 8;
const DEFAULT_TRADE_RETENTION_DAYS: i64 = 90;
const DEFAULT_FLEET_CARRIER_RETENTION_DAYS: i64 = 90;
const DEFAULT_MAINTENANCE_DAY: u32 = 4; // 0 = Sunday .. 6 = Saturday
const DEFAULT_MAINTENANCE_START_HOUR: u32 = 7;
const DEFAULT_MAINTENANCE_END_HOUR: u32 = 9;
const DEFAULT_CACHE_CONTROL: &str =
    "public, max-age=900, stale-while-revalidate=3600, stale-if-error=3600";

/// Overlay read from an optional TOML file; every field is optional so the file can set as
/// little or as much as the deployer wants.
#[derive(Debug, Default, Deserialize)]
struct FileOverlay {
    feed_url: Option<String>,
    http_port: Option<u16>,
    data_dir: Option<String>,
    backup_dir: Option<String>,
    downloads_dir: Option<String>,
    maintenance_day: Option<u32>,
    maintenance_start_hour: Option<u32>,
    maintenance_end_hour: Option<u32>,
    trade_retention_days: Option<i64>,
    rescue_ship_retention_days: Option<i64>,
    fleet_carrier_retention_days: Option<i64>,
    sector_grid_ly: Option<f64>,
    sector_hash_bytes: Option<usize>,
    skip_startup_maintenance: Option<bool>,
    skip_regional_reports: Option<bool>,
    skip_expensive_indexes: Option<bool>,
    cache_control: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub feed_url: String,
    pub http_port: u16,

    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub snapshot_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub downloads_dir: PathBuf,

    pub maintenance_day: u32,
    pub maintenance_start_hour: u32,
    pub maintenance_end_hour: u32,

    pub trade_retention_days: i64,
    pub rescue_ship_retention_days: Option<i64>,
    pub fleet_carrier_retention_days: Option<i64>,

    pub sector_grid_ly: f64,
    pub sector_hash_bytes: usize,

    pub skip_startup_maintenance: bool,
    pub skip_regional_reports: bool,
    pub skip_expensive_indexes: bool,

    pub cache_control: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv::dotenv();

        let overlay = Self::load_file_overlay();

        let data_dir = PathBuf::from(
            env::var("DATA_DIR")
                .ok()
                .or_else(|| overlay.data_dir.clone())
                .unwrap_or_else(|| "./data".to_string()),
        );
        let cache_dir = data_dir.join("cache");
        let snapshot_dir = data_dir.join(".snapshots");

        let backup_dir = PathBuf::from(
            env::var("BACKUP_DIR")
                .ok()
                .or_else(|| overlay.backup_dir.clone())
                .unwrap_or_else(|| "./backup".to_string()),
        );
        let downloads_dir = PathBuf::from(
            env::var("DOWNLOADS_DIR")
                .ok()
                .or_else(|| overlay.downloads_dir.clone())
                .unwrap_or_else(|| "./downloads".to_string()),
        );

        let http_port = env::var("HTTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(overlay.http_port)
            .unwrap_or(DEFAULT_HTTP_PORT);

        let feed_url = env::var("FEED_URL")
            .ok()
            .or_else(|| overlay.feed_url.clone())
            .unwrap_or_else(|| DEFAULT_FEED_URL.to_string());

        Ok(Self {
            feed_url,
            http_port,
            data_dir,
            cache_dir,
            snapshot_dir,
            backup_dir,
            downloads_dir,
            maintenance_day: env::var("MAINTENANCE_DAY")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(overlay.maintenance_day)
                .unwrap_or(DEFAULT_MAINTENANCE_DAY),
            maintenance_start_hour: env::var("MAINTENANCE_START_HOUR")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(overlay.maintenance_start_hour)
                .unwrap_or(DEFAULT_MAINTENANCE_START_HOUR),
            maintenance_end_hour: env::var("MAINTENANCE_END_HOUR")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(overlay.maintenance_end_hour)
                .unwrap_or(DEFAULT_MAINTENANCE_END_HOUR),
            trade_retention_days: env::var("TRADE_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(overlay.trade_retention_days)
                .unwrap_or(DEFAULT_TRADE_RETENTION_DAYS),
            rescue_ship_retention_days: env::var("RESCUE_SHIP_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(overlay.rescue_ship_retention_days),
            fleet_carrier_retention_days: env::var("FLEET_CARRIER_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(overlay.fleet_carrier_retention_days)
                .or(Some(DEFAULT_FLEET_CARRIER_RETENTION_DAYS)),
            sector_grid_ly: env::var("SECTOR_GRID_LY")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(overlay.sector_grid_ly)
                .unwrap_or(DEFAULT_SECTOR_GRID_LY),
            sector_hash_bytes: env::var("SECTOR_HASH_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(overlay.sector_hash_bytes)
                .unwrap_or(DEFAULT_SECTOR_HASH_BYTES),
            skip_startup_maintenance: env_flag("SKIP_STARTUP_MAINTENANCE")
                .or(overlay.skip_startup_maintenance)
                .unwrap_or(false),
            skip_regional_reports: env_flag("SKIP_REGIONAL_REPORTS")
                .or(overlay.skip_regional_reports)
                .unwrap_or(false),
            skip_expensive_indexes: env_flag("SKIP_EXPENSIVE_INDEXES")
                .or(overlay.skip_expensive_indexes)
                .unwrap_or(false),
            cache_control: env::var("CACHE_CONTROL")
                .ok()
                .or(overlay.cache_control)
                .unwrap_or_else(|| DEFAULT_CACHE_CONTROL.to_string()),
        })
    }

    /// Creates every directory this process writes to, if absent.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.data_dir,
            &self.cache_dir,
            &self.snapshot_dir,
            &self.backup_dir,
            &self.downloads_dir,
        ] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn systems_db_path(&self) -> PathBuf {
        self.data_dir.join("systems.db")
    }
    pub fn locations_db_path(&self) -> PathBuf {
        self.data_dir.join("locations.db")
    }
    pub fn stations_db_path(&self) -> PathBuf {
        self.data_dir.join("stations.db")
    }
    pub fn trade_db_path(&self) -> PathBuf {
        self.data_dir.join("trade.db")
    }

    fn load_file_overlay() -> FileOverlay {
        let candidates = [
            PathBuf::from("/etc/galnet-collector.config"),
            env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(Path::to_path_buf))
                .unwrap_or_default()
                .join("galnet-collector.config"),
        ];
        for path in candidates {
            if let Ok(text) = std::fs::read_to_string(&path) {
                match toml::from_str(&text) {
                    Ok(overlay) => return overlay,
                    Err(e) => {
                        tracing::warn!("ignoring malformed config file {}: {e}", path.display());
                    }
                }
            }
        }
        FileOverlay::default()
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        // SAFETY: tests run single-threaded within this module's #[cfg(test)] harness; no other
        // test mutates these particular vars.
        env::remove_var("DATA_DIR");
        env::remove_var("HTTP_PORT");
        env::remove_var("FEED_URL");
        let cfg = Config::from_env().expect("config should resolve from defaults");
        assert_eq!(cfg.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(cfg.feed_url, DEFAULT_FEED_URL);
        assert_eq!(cfg.sector_grid_ly, DEFAULT_SECTOR_GRID_LY);
        assert_eq!(cfg.trade_retention_days, DEFAULT_TRADE_RETENTION_DAYS);
    }

    #[test]
    fn env_overrides_default() {
        env::set_var("HTTP_PORT", "9999");
        let cfg = Config::from_env().expect("config should resolve");
        assert_eq!(cfg.http_port, 9999);
        env::remove_var("HTTP_PORT");
    }
}

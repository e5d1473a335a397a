//! Snapshot manager (C7): point-in-time read-only copies of the four live DB files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::config::Config;
use crate::db::Stores;

const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(2 * 3600);

pub struct SnapshotManager {
    dir: PathBuf,
    freshness_window: Duration,
    stores: Stores,
}

impl SnapshotManager {
    pub fn new(cfg: &Config, stores: Stores) -> Self {
        Self {
            dir: cfg.snapshot_dir.clone(),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            stores,
        }
    }

    pub fn paths(&self) -> HashMap<&'static str, PathBuf> {
        [
            ("systems", self.dir.join("systems.db")),
            ("locations", self.dir.join("locations.db")),
            ("stations", self.dir.join("stations.db")),
            ("trade", self.dir.join("trade.db")),
        ]
        .into_iter()
        .collect()
    }

    /// True iff every expected snapshot exists and its mtime is within the freshness window.
    pub fn are_fresh(&self) -> bool {
        let now = std::time::SystemTime::now();
        self.paths().values().all(|path| {
            std::fs::metadata(path)
                .and_then(|m| m.modified())
                .map(|mtime| now.duration_since(mtime).unwrap_or(Duration::MAX) <= self.freshness_window)
                .unwrap_or(false)
        })
    }

    /// Deletes old snapshots (and their journal side-files) then creates fresh ones via
    /// `VACUUM INTO`. Idempotent; safe to call while ingestion continues because the primitive
    /// only takes a brief read lock per source DB.
    pub async fn refresh(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).context("creating snapshot directory")?;

        self.delete_existing()?;

        self.vacuum_into(&self.stores.systems, &self.dir.join("systems.db")).await?;
        self.vacuum_into(&self.stores.locations, &self.dir.join("locations.db")).await?;
        self.vacuum_into(&self.stores.stations, &self.dir.join("stations.db")).await?;
        self.vacuum_into(&self.stores.trade, &self.dir.join("trade.db")).await?;

        info!("snapshot refresh complete");
        Ok(())
    }

    fn delete_existing(&self) -> Result<()> {
        for path in self.paths().values() {
            for suffix in ["", "-wal", "-shm", "-journal"] {
                let side = append_suffix(path, suffix);
                if side.exists() {
                    std::fs::remove_file(&side)
                        .with_context(|| format!("removing stale snapshot file {}", side.display()))?;
                }
            }
        }
        Ok(())
    }

    async fn vacuum_into(&self, conn: &std::sync::Arc<tokio::sync::Mutex<rusqlite::Connection>>, dest: &Path) -> Result<()> {
        let conn = conn.lock().await;
        let dest_str = dest.to_string_lossy().replace('\'', "''");
        conn.execute_batch(&format!("VACUUM INTO '{dest_str}'"))
            .with_context(|| format!("vacuum into {}", dest.display()))?;
        Ok(())
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    if suffix.is_empty() {
        return path.to_path_buf();
    }
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Timestamp string suitable for logging refresh events; kept separate from `areFresh` so tests
/// can assert on the freshness window without depending on wall-clock `now`.
pub fn now_label() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn stores_in(dir: &Path) -> Stores {
        let mk = |name: &str| {
            let conn = Connection::open(dir.join(name)).unwrap();
            conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();
            Arc::new(Mutex::new(conn))
        };
        Stores {
            systems: mk("systems_src.db"),
            locations: mk("locations_src.db"),
            stations: mk("stations_src.db"),
            trade: mk("trade_src.db"),
        }
    }

    #[tokio::test]
    async fn refresh_creates_all_four_snapshot_files() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg_snapshot_dir = tmp.path().join(".snapshots");
        let stores = stores_in(tmp.path());

        let manager = SnapshotManager {
            dir: cfg_snapshot_dir.clone(),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            stores,
        };
        manager.refresh().await.unwrap();

        for path in manager.paths().values() {
            assert!(path.exists(), "expected snapshot at {}", path.display());
        }
        assert!(manager.are_fresh());
    }
}

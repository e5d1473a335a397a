//! Full Spectrum Scanner discovery-scan event handler (§4.3).
//!
//! Insert-if-absent keyed by `systemAddress`; coordinates are validated by the origin-system
//! exception and never overwritten once a row exists.

use serde::Deserialize;

use crate::error::IngestError;

use super::HandlerContext;

#[derive(Debug, Deserialize)]
struct DiscoveryScanMessage {
    #[serde(rename = "SystemAddress")]
    system_address: i64,
    #[serde(rename = "StarSystem")]
    star_system: String,
    #[serde(rename = "StarPos")]
    star_pos: [f64; 3],
}

pub async fn handle(ctx: &HandlerContext, message: &serde_json::Value) -> Result<(), IngestError> {
    let msg: DiscoveryScanMessage = serde_json::from_value(message.clone())?;
    let [x, y, z] = msg.star_pos;
    let sector = ctx.sectors.sector_of(x, y, z);

    let conn = ctx.stores.systems.lock().await;
    crate::db::systems::insert_if_absent(&conn, msg.system_address, &msg.star_system, x, y, z, &sector)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Stores;
    use crate::sector::SectorHasher;
    use crate::statement_cache::StatementCache;
    use rusqlite::Connection;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    async fn ctx() -> HandlerContext {
        let systems = Connection::open_in_memory().unwrap();
        crate::db::systems::create_tables(&systems, false).unwrap();
        let locations = Connection::open_in_memory().unwrap();
        crate::db::locations::create_tables(&locations, false).unwrap();
        let stations = Connection::open_in_memory().unwrap();
        crate::db::stations::create_tables(&stations, false).unwrap();
        let trade = Connection::open_in_memory().unwrap();
        crate::db::trade::create_tables(&trade, false).unwrap();

        HandlerContext {
            stores: Stores {
                systems: Arc::new(Mutex::new(systems)),
                locations: Arc::new(Mutex::new(locations)),
                stations: Arc::new(Mutex::new(stations)),
                trade: Arc::new(Mutex::new(trade)),
            },
            statements: Arc::new(StatementCache::new()),
            sectors: SectorHasher::new(100.0, 8),
        }
    }

    #[tokio::test]
    async fn inserts_system_with_valid_coords() {
        let ctx = ctx().await;
        let message = serde_json::json!({"SystemAddress": 42, "StarSystem": "Alpha", "StarPos": [1.0, 2.0, 3.0]});
        handle(&ctx, &message).await.unwrap();
        let conn = ctx.stores.systems.lock().await;
        assert!(crate::db::systems::exists(&conn, 42).unwrap());
    }

    #[tokio::test]
    async fn rejects_zero_coords_for_non_origin() {
        let ctx = ctx().await;
        let message = serde_json::json!({"SystemAddress": 42, "StarSystem": "X", "StarPos": [0.0, 0.0, 0.0]});
        handle(&ctx, &message).await.unwrap();
        let conn = ctx.stores.systems.lock().await;
        assert!(!crate::db::systems::exists(&conn, 42).unwrap());
    }
}

//! Nav-route event handler (§4.3): same rule as discovery-scan, applied per hop.

use serde::Deserialize;

use crate::error::IngestError;

use super::HandlerContext;

#[derive(Debug, Deserialize)]
struct NavRouteMessage {
    #[serde(rename = "Route")]
    route: Vec<RouteHop>,
}

#[derive(Debug, Deserialize)]
struct RouteHop {
    #[serde(rename = "StarSystem")]
    star_system: String,
    #[serde(rename = "SystemAddress")]
    system_address: i64,
    #[serde(rename = "StarPos")]
    star_pos: [f64; 3],
}

pub async fn handle(ctx: &HandlerContext, message: &serde_json::Value) -> Result<(), IngestError> {
    let msg: NavRouteMessage = serde_json::from_value(message.clone())?;
    let conn = ctx.stores.systems.lock().await;
    for hop in &msg.route {
        let [x, y, z] = hop.star_pos;
        let sector = ctx.sectors.sector_of(x, y, z);
        crate::db::systems::insert_if_absent(&conn, hop.system_address, &hop.star_system, x, y, z, &sector)?;
    }
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
    async fn s2_zero_coord_hop_dropped_but_origin_kept() {
        let ctx = ctx().await;
        let message = serde_json::json!({
            "Route": [
                {"StarSystem": "X", "SystemAddress": 42, "StarPos": [0.0, 0.0, 0.0]},
                {"StarSystem": "Sol", "SystemAddress": 10477373803i64, "StarPos": [0.0, 0.0, 0.0]}
            ]
        });
        handle(&ctx, &message).await.unwrap();
        let conn = ctx.stores.systems.lock().await;
        assert!(!crate::db::systems::exists(&conn, 42).unwrap());
        assert!(crate::db::systems::exists(&conn, 10477373803).unwrap());
    }
}

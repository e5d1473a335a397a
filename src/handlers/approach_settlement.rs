//! Approach-settlement event handler (§4.3).
//!
//! With a `marketId`, the settlement is a station placement update. Without one, it's a surface
//! point of interest: hashed into `locationId` and written to the locations store. Either way
//! the containing system is ensured to exist (insert-if-absent).

use serde::Deserialize;

use crate::db::stations::StationPatch;
use crate::error::IngestError;

use super::HandlerContext;

#[derive(Debug, Deserialize)]
struct ApproachSettlementMessage {
    #[serde(rename = "StarSystem")]
    star_system: String,
    #[serde(rename = "SystemAddress")]
    system_address: i64,
    #[serde(rename = "StarPos")]
    star_pos: Option<[f64; 3]>,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "BodyID")]
    body_id: Option<i64>,
    #[serde(rename = "BodyName")]
    body_name: Option<String>,
    #[serde(rename = "Latitude")]
    latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    longitude: Option<f64>,
    #[serde(rename = "MarketID")]
    market_id: Option<i64>,
}

pub async fn handle(ctx: &HandlerContext, message: &serde_json::Value) -> Result<(), IngestError> {
    let msg: ApproachSettlementMessage = serde_json::from_value(message.clone())?;

    if let Some([x, y, z]) = msg.star_pos {
        let sector = ctx.sectors.sector_of(x, y, z);
        let conn = ctx.stores.systems.lock().await;
        crate::db::systems::insert_if_absent(&conn, msg.system_address, &msg.star_system, x, y, z, &sector)?;
    }

    if let Some(market_id) = msg.market_id {
        let conn = ctx.stores.stations.lock().await;
        crate::db::stations::ensure_exists(&conn, market_id)?;
        crate::db::stations::upsert(
            &conn,
            &StationPatch {
                market_id,
                station_name: Some(msg.name),
                body_id: msg.body_id,
                body_name: msg.body_name,
                latitude: msg.latitude,
                longitude: msg.longitude,
                system_address: Some(msg.system_address),
                system_name: Some(msg.star_system),
                ..Default::default()
            },
        )?;
    } else {
        let conn = ctx.stores.locations.lock().await;
        let (sx, sy, sz) = msg.star_pos.map(|p| (p[0], p[1], p[2])).unwrap_or((0.0, 0.0, 0.0));
        crate::db::locations::upsert(
            &conn,
            &msg.name,
            msg.system_address,
            &msg.star_system,
            sx,
            sy,
            sz,
            msg.body_id,
            msg.body_name.as_deref(),
            msg.latitude,
            msg.longitude,
        )?;
    }

    Ok(())
}

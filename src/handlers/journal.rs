//! Journal event handler (§4.3), sub-dispatched by inner event kind.
//!
//! `Location` and `CarrierJump` feed the systems store (and, for carrier jumps, the stations
//! store); `Docked` feeds both stations and, when present, the fleet-carrier docking-access and
//! prohibited-commodity fields — written even when no other station field is present.

use serde::Deserialize;

use crate::db::stations::{ServiceFlags, StationPatch};
use crate::error::IngestError;

use super::HandlerContext;

pub async fn handle(ctx: &HandlerContext, message: &serde_json::Value) -> Result<(), IngestError> {
    match message.get("event").and_then(|v| v.as_str()).unwrap_or("") {
        "Location" => handle_location(ctx, message).await,
        "Docked" => handle_docked(ctx, message).await,
        "CarrierJump" => handle_carrier_jump(ctx, message).await,
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize)]
struct LocationEvent {
    #[serde(rename = "StarSystem")]
    star_system: String,
    #[serde(rename = "SystemAddress")]
    system_address: i64,
    #[serde(rename = "StarPos")]
    star_pos: Option<[f64; 3]>,
}

async fn handle_location(ctx: &HandlerContext, message: &serde_json::Value) -> Result<(), IngestError> {
    let ev: LocationEvent = serde_json::from_value(message.clone())?;
    if let Some([x, y, z]) = ev.star_pos {
        let sector = ctx.sectors.sector_of(x, y, z);
        let conn = ctx.stores.systems.lock().await;
        crate::db::systems::insert_if_absent(&conn, ev.system_address, &ev.star_system, x, y, z, &sector)?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct DockedEvent {
    #[serde(rename = "StationName")]
    station_name: Option<String>,
    #[serde(rename = "MarketID")]
    market_id: i64,
    #[serde(rename = "StationType")]
    station_type: Option<String>,
    #[serde(rename = "StarSystem")]
    star_system: Option<String>,
    #[serde(rename = "SystemAddress")]
    system_address: Option<i64>,
    #[serde(rename = "DistFromStarLS")]
    distance_to_arrival: Option<f64>,
    #[serde(rename = "StationAllegiance")]
    allegiance: Option<String>,
    #[serde(rename = "StationGovernment")]
    government: Option<String>,
    #[serde(rename = "StationEconomy")]
    primary_economy: Option<String>,
    #[serde(rename = "StationServices")]
    services: Option<Vec<String>>,
    #[serde(rename = "LandingPads")]
    landing_pads: Option<serde_json::Value>,
    #[serde(rename = "CarrierDockingAccess")]
    carrier_docking_access: Option<String>,
    #[serde(rename = "ProhibitedCommodities")]
    prohibited: Option<Vec<String>>,
}

async fn handle_docked(ctx: &HandlerContext, message: &serde_json::Value) -> Result<(), IngestError> {
    let ev: DockedEvent = serde_json::from_value(message.clone())?;

    let max_pad = ev.landing_pads.as_ref().and_then(|v| {
        v.get("Large").and_then(|l| l.as_i64()).filter(|&n| n > 0).map(|_| "Large".to_string())
            .or_else(|| v.get("Medium").and_then(|m| m.as_i64()).filter(|&n| n > 0).map(|_| "Medium".to_string()))
            .or_else(|| v.get("Small").and_then(|s| s.as_i64()).filter(|&n| n > 0).map(|_| "Small".to_string()))
    });

    let conn = ctx.stores.stations.lock().await;
    crate::db::stations::ensure_exists(&conn, ev.market_id)?;
    crate::db::stations::upsert(
        &conn,
        &StationPatch {
            market_id: ev.market_id,
            station_name: ev.station_name,
            station_type: ev.station_type,
            distance_to_arrival: ev.distance_to_arrival,
            allegiance: ev.allegiance,
            government: ev.government,
            primary_economy: ev.primary_economy,
            system_address: ev.system_address,
            system_name: ev.star_system,
            max_landing_pad_size: max_pad,
            carrier_docking_access: ev.carrier_docking_access,
            prohibited_json: ev.prohibited.as_ref().map(serde_json::to_string).transpose().map_err(IngestError::Malformed)?,
            services: ev.services.as_deref().map(service_flags_from_names),
            ..Default::default()
        },
    )?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CarrierJumpEvent {
    #[serde(rename = "StationName")]
    station_name: Option<String>,
    #[serde(rename = "MarketID")]
    market_id: i64,
    #[serde(rename = "StarSystem")]
    star_system: String,
    #[serde(rename = "SystemAddress")]
    system_address: i64,
    #[serde(rename = "StarPos")]
    star_pos: Option<[f64; 3]>,
}

async fn handle_carrier_jump(ctx: &HandlerContext, message: &serde_json::Value) -> Result<(), IngestError> {
    let ev: CarrierJumpEvent = serde_json::from_value(message.clone())?;

    if let Some([x, y, z]) = ev.star_pos {
        let sector = ctx.sectors.sector_of(x, y, z);
        let conn = ctx.stores.systems.lock().await;
        crate::db::systems::insert_if_absent(&conn, ev.system_address, &ev.star_system, x, y, z, &sector)?;
    }

    let conn = ctx.stores.stations.lock().await;
    crate::db::stations::ensure_exists(&conn, ev.market_id)?;
    crate::db::stations::upsert(
        &conn,
        &StationPatch {
            market_id: ev.market_id,
            station_name: ev.station_name,
            station_type: Some(crate::db::stations::STATION_TYPE_FLEET_CARRIER.to_string()),
            system_address: Some(ev.system_address),
            system_name: Some(ev.star_system),
            ..Default::default()
        },
    )?;
    Ok(())
}

fn service_flags_from_names(names: &[String]) -> ServiceFlags {
    let has = |needle: &str| Some(names.iter().any(|n| n.eq_ignore_ascii_case(needle)));
    ServiceFlags {
        shipyard: has("Shipyard"),
        outfitting: has("Outfitting"),
        black_market: has("BlackMarket"),
        repair: has("Repair"),
        refuel: has("Refuel"),
        restock: has("Restock"),
        contacts: has("Contacts"),
        interstellar_factors: has("InterstellarFactorsContact"),
        material_trader: has("MaterialTrader"),
        missions: has("Missions"),
        search_and_rescue: has("SearchAndRescue"),
        technology_broker: has("TechnologyBroker"),
        tuning: has("Tuning"),
        universal_cartographics: has("UniversalCartographics"),
        engineer: has("Engineer"),
        frontline_solutions: has("FrontlineSolutions"),
        apex_interstellar: has("ApexInterstellar"),
        vista_genomics: has("VistaGenomics"),
        pioneer_supplies: has("PioneerSupplies"),
        bartender: has("Bartender"),
        crew_lounge: has("CrewLounge"),
    }
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
    async fn docked_writes_prohibited_and_carrier_access_even_without_other_fields() {
        let ctx = ctx().await;
        let message = serde_json::json!({
            "event": "Docked",
            "MarketID": 55,
            "CarrierDockingAccess": "all",
            "ProhibitedCommodities": ["Tea"]
        });
        handle(&ctx, &message).await.unwrap();
        let conn = ctx.stores.stations.lock().await;
        let access: String = conn.query_row("SELECT carrierDockingAccess FROM stations WHERE marketId=55", [], |r| r.get(0)).unwrap();
        assert_eq!(access, "all");
    }

    #[tokio::test]
    async fn carrier_jump_marks_station_type() {
        let ctx = ctx().await;
        let message = serde_json::json!({
            "event": "CarrierJump",
            "StationName": "XYZ-123",
            "MarketID": 99,
            "StarSystem": "Sol",
            "SystemAddress": 10477373803i64,
            "StarPos": [0.0, 0.0, 0.0]
        });
        handle(&ctx, &message).await.unwrap();
        let conn = ctx.stores.stations.lock().await;
        let t: String = conn.query_row("SELECT stationType FROM stations WHERE marketId=99", [], |r| r.get(0)).unwrap();
        assert_eq!(t, "FleetCarrier");
    }
}

//! Stations store schema and accessors.
//!
//! Rows survive partial updates: an approach-settlement event that only carries placement must
//! not wipe economies or service flags written by an earlier commodity event. Every optional
//! field is written with `COALESCE(excluded.col, col)` so a `None` from the caller means "leave
//! whatever is already there" rather than "clear it".

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};

pub const STATION_TYPE_FLEET_CARRIER: &str = "FleetCarrier";
pub const STATION_TYPE_RESCUE_SHIP: &str = "RescueShip";

const TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS stations (
    marketId              INTEGER PRIMARY KEY,
    stationName           TEXT COLLATE NOCASE,
    distanceToArrival     REAL,
    stationType           TEXT,
    allegiance            TEXT,
    government            TEXT,
    controllingFaction    TEXT,
    primaryEconomy        TEXT,
    secondaryEconomy      TEXT,
    shipyard              INTEGER,
    outfitting            INTEGER,
    blackMarket           INTEGER,
    repair                INTEGER,
    refuel                INTEGER,
    restock               INTEGER,
    contacts              INTEGER,
    interstellarFactors   INTEGER,
    materialTrader        INTEGER,
    missions              INTEGER,
    searchAndRescue       INTEGER,
    technologyBroker      INTEGER,
    tuning                INTEGER,
    universalCartographics INTEGER,
    engineer              INTEGER,
    frontlineSolutions    INTEGER,
    apexInterstellar      INTEGER,
    vistaGenomics         INTEGER,
    pioneerSupplies       INTEGER,
    bartender             INTEGER,
    crewLounge            INTEGER,
    bodyId                INTEGER,
    bodyName              TEXT,
    latitude              REAL,
    longitude             REAL,
    systemAddress         INTEGER,
    systemName            TEXT,
    systemX               REAL,
    systemY               REAL,
    systemZ               REAL,
    maxLandingPadSize     TEXT,
    prohibited            TEXT,
    carrierDockingAccess  TEXT,
    updatedAt             TEXT NOT NULL
) WITHOUT ROWID;
";

const INDEX_SQL: &str = "
CREATE INDEX IF NOT EXISTS idx_stations_system ON stations(systemAddress);
CREATE INDEX IF NOT EXISTS idx_stations_type ON stations(stationType);
CREATE INDEX IF NOT EXISTS idx_stations_updated ON stations(updatedAt);
";

/// `skip_expensive_indexes` (§6) skips all three secondary indexes, keeping only the `marketId`
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

/// A partial view of a station observation. Every field besides `market_id` is optional: only
/// the fields the triggering event actually carried are `Some`, and the rest leave the existing
/// row untouched.
#[derive(Debug, Default, Clone)]
pub struct StationPatch {
    pub market_id: i64,
    pub station_name: Option<String>,
    pub distance_to_arrival: Option<f64>,
    pub station_type: Option<String>,
    pub allegiance: Option<String>,
    pub government: Option<String>,
    pub controlling_faction: Option<String>,
    pub primary_economy: Option<String>,
    pub secondary_economy: Option<String>,
    pub services: Option<ServiceFlags>,
    pub body_id: Option<i64>,
    pub body_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub system_address: Option<i64>,
    pub system_name: Option<String>,
    pub system_x: Option<f64>,
    pub system_y: Option<f64>,
    pub system_z: Option<f64>,
    pub max_landing_pad_size: Option<String>,
    pub prohibited_json: Option<String>,
    pub carrier_docking_access: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceFlags {
    pub shipyard: Option<bool>,
    pub outfitting: Option<bool>,
    pub black_market: Option<bool>,
    pub repair: Option<bool>,
    pub refuel: Option<bool>,
    pub restock: Option<bool>,
    pub contacts: Option<bool>,
    pub interstellar_factors: Option<bool>,
    pub material_trader: Option<bool>,
    pub missions: Option<bool>,
    pub search_and_rescue: Option<bool>,
    pub technology_broker: Option<bool>,
    pub tuning: Option<bool>,
    pub universal_cartographics: Option<bool>,
    pub engineer: Option<bool>,
    pub frontline_solutions: Option<bool>,
    pub apex_interstellar: Option<bool>,
    pub vista_genomics: Option<bool>,
    pub pioneer_supplies: Option<bool>,
    pub bartender: Option<bool>,
    pub crew_lounge: Option<bool>,
}

fn as_int(flag: Option<bool>) -> Option<i64> {
    flag.map(|b| b as i64)
}

/// Ensures the row exists, inserting a bare shell keyed by `market_id` if absent. Safe to call
/// before a placement-only update so a later commodity event has a row to attach prices to.
pub fn ensure_exists(conn: &Connection, market_id: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO stations (marketId, updatedAt) VALUES (?1, ?2) ON CONFLICT(marketId) DO NOTHING",
        params![market_id, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn upsert(conn: &Connection, patch: &StationPatch) -> Result<()> {
    let services = patch.services.unwrap_or_default();
    conn.execute(
        "INSERT INTO stations (
            marketId, stationName, distanceToArrival, stationType, allegiance, government,
            controllingFaction, primaryEconomy, secondaryEconomy,
            shipyard, outfitting, blackMarket, repair, refuel, restock, contacts,
            interstellarFactors, materialTrader, missions, searchAndRescue, technologyBroker,
            tuning, universalCartographics, engineer, frontlineSolutions, apexInterstellar,
            vistaGenomics, pioneerSupplies, bartender, crewLounge,
            bodyId, bodyName, latitude, longitude,
            systemAddress, systemName, systemX, systemY, systemZ,
            maxLandingPadSize, prohibited, carrierDockingAccess, updatedAt
         ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
            ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21,
            ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30,
            ?31, ?32, ?33, ?34,
            ?35, ?36, ?37, ?38, ?39,
            ?40, ?41, ?42, ?43
         )
         ON CONFLICT(marketId) DO UPDATE SET
            stationName = COALESCE(excluded.stationName, stationName),
            distanceToArrival = COALESCE(excluded.distanceToArrival, distanceToArrival),
            stationType = COALESCE(excluded.stationType, stationType),
            allegiance = COALESCE(excluded.allegiance, allegiance),
            government = COALESCE(excluded.government, government),
            controllingFaction = COALESCE(excluded.controllingFaction, controllingFaction),
            primaryEconomy = COALESCE(excluded.primaryEconomy, primaryEconomy),
            secondaryEconomy = COALESCE(excluded.secondaryEconomy, secondaryEconomy),
            shipyard = COALESCE(excluded.shipyard, shipyard),
            outfitting = COALESCE(excluded.outfitting, outfitting),
            blackMarket = COALESCE(excluded.blackMarket, blackMarket),
            repair = COALESCE(excluded.repair, repair),
            refuel = COALESCE(excluded.refuel, refuel),
            restock = COALESCE(excluded.restock, restock),
            contacts = COALESCE(excluded.contacts, contacts),
            interstellarFactors = COALESCE(excluded.interstellarFactors, interstellarFactors),
            materialTrader = COALESCE(excluded.materialTrader, materialTrader),
            missions = COALESCE(excluded.missions, missions),
            searchAndRescue = COALESCE(excluded.searchAndRescue, searchAndRescue),
            technologyBroker = COALESCE(excluded.technologyBroker, technologyBroker),
            tuning = COALESCE(excluded.tuning, tuning),
            universalCartographics = COALESCE(excluded.universalCartographics, universalCartographics),
            engineer = COALESCE(excluded.engineer, engineer),
            frontlineSolutions = COALESCE(excluded.frontlineSolutions, frontlineSolutions),
            apexInterstellar = COALESCE(excluded.apexInterstellar, apexInterstellar),
            vistaGenomics = COALESCE(excluded.vistaGenomics, vistaGenomics),
            pioneerSupplies = COALESCE(excluded.pioneerSupplies, pioneerSupplies),
            bartender = COALESCE(excluded.bartender, bartender),
            crewLounge = COALESCE(excluded.crewLounge, crewLounge),
            bodyId = COALESCE(excluded.bodyId, bodyId),
            bodyName = COALESCE(excluded.bodyName, bodyName),
            latitude = COALESCE(excluded.latitude, latitude),
            longitude = COALESCE(excluded.longitude, longitude),
            systemAddress = COALESCE(excluded.systemAddress, systemAddress),
            systemName = COALESCE(excluded.systemName, systemName),
            systemX = COALESCE(excluded.systemX, systemX),
            systemY = COALESCE(excluded.systemY, systemY),
            systemZ = COALESCE(excluded.systemZ, systemZ),
            maxLandingPadSize = COALESCE(excluded.maxLandingPadSize, maxLandingPadSize),
            prohibited = COALESCE(excluded.prohibited, prohibited),
            carrierDockingAccess = COALESCE(excluded.carrierDockingAccess, carrierDockingAccess),
            updatedAt = excluded.updatedAt",
        params![
            patch.market_id,
            patch.station_name,
            patch.distance_to_arrival,
            patch.station_type,
            patch.allegiance,
            patch.government,
            patch.controlling_faction,
            patch.primary_economy,
            patch.secondary_economy,
            as_int(services.shipyard),
            as_int(services.outfitting),
            as_int(services.black_market),
            as_int(services.repair),
            as_int(services.refuel),
            as_int(services.restock),
            as_int(services.contacts),
            as_int(services.interstellar_factors),
            as_int(services.material_trader),
            as_int(services.missions),
            as_int(services.search_and_rescue),
            as_int(services.technology_broker),
            as_int(services.tuning),
            as_int(services.universal_cartographics),
            as_int(services.engineer),
            as_int(services.frontline_solutions),
            as_int(services.apex_interstellar),
            as_int(services.vista_genomics),
            as_int(services.pioneer_supplies),
            as_int(services.bartender),
            as_int(services.crew_lounge),
            patch.body_id,
            patch.body_name,
            patch.latitude,
            patch.longitude,
            patch.system_address,
            patch.system_name,
            patch.system_x,
            patch.system_y,
            patch.system_z,
            patch.max_landing_pad_size,
            patch.prohibited_json,
            patch.carrier_docking_access,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn station_name(conn: &Connection, market_id: i64) -> Result<Option<String>> {
    use rusqlite::OptionalExtension;
    conn.query_row(
        "SELECT stationName FROM stations WHERE marketId = ?1",
        params![market_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

/// Deletes stations of `station_type` not updated within `horizon_days`. Used by the optional
/// per-type retention sweeps (C9) — fleet carriers and rescue ships churn fast enough that
/// stale rows would otherwise accumulate indefinitely, unlike regular stations which never sweep.
pub fn sweep_stale_by_type(conn: &Connection, station_type: &str, horizon_days: i64) -> Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(horizon_days)).to_rfc3339();
    let affected = conn.execute(
        "DELETE FROM stations WHERE stationType = ?1 AND updatedAt < ?2",
        params![station_type, cutoff],
    )?;
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memdb() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn, false).unwrap();
        conn
    }

    #[test]
    fn skip_expensive_indexes_omits_secondary_indexes() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn, true).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name LIKE 'idx_stations_%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn placement_only_update_preserves_earlier_economy() {
        let conn = memdb();
        upsert(
            &conn,
            &StationPatch {
                market_id: 1000,
                station_name: Some("Abe".into()),
                primary_economy: Some("Extraction".into()),
                ..Default::default()
            },
        )
        .unwrap();

        upsert(
            &conn,
            &StationPatch {
                market_id: 1000,
                body_id: Some(3),
                latitude: Some(10.0),
                longitude: Some(20.0),
                ..Default::default()
            },
        )
        .unwrap();

        let economy: String = conn
            .query_row("SELECT primaryEconomy FROM stations WHERE marketId = 1000", [], |r| r.get(0))
            .unwrap();
        assert_eq!(economy, "Extraction");
        let lat: f64 = conn
            .query_row("SELECT latitude FROM stations WHERE marketId = 1000", [], |r| r.get(0))
            .unwrap();
        assert_eq!(lat, 10.0);
    }

    #[test]
    fn market_id_is_unique_by_construction() {
        let conn = memdb();
        upsert(&conn, &StationPatch { market_id: 5, ..Default::default() }).unwrap();
        upsert(&conn, &StationPatch { market_id: 5, station_name: Some("Dup".into()), ..Default::default() }).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM stations", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn sweep_only_touches_matching_type_and_age() {
        let conn = memdb();
        upsert(&conn, &StationPatch { market_id: 1, station_type: Some(STATION_TYPE_RESCUE_SHIP.into()), ..Default::default() }).unwrap();
        upsert(&conn, &StationPatch { market_id: 2, station_type: Some("Coriolis".into()), ..Default::default() }).unwrap();
        conn.execute(
            "UPDATE stations SET updatedAt = '2000-01-01T00:00:00Z' WHERE marketId = 1",
            [],
        )
        .unwrap();

        let affected = sweep_stale_by_type(&conn, STATION_TYPE_RESCUE_SHIP, 7).unwrap();
        assert_eq!(affected, 1);
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM stations", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
        let remaining_type: String = conn.query_row("SELECT stationType FROM stations", [], |r| r.get(0)).unwrap();
        assert_eq!(remaining_type, "Coriolis");
    }
}

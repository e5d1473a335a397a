//! Commodity event handler (§4.3).
//!
//! Ensures the station exists, patches whatever station fields the payload actually carries
//! (including economies, derived from the weighted `economies` list by descending proportion),
//! then upserts every commodity quote into the trade store. Commodities absent from the
//! payload are left untouched — this handler never deletes a trade row.

use rusqlite::params_from_iter;
use serde::Deserialize;

use crate::db::stations::StationPatch;
use crate::error::IngestError;
use crate::statement_cache::Record;

use super::HandlerContext;

#[derive(Debug, Deserialize)]
struct CommodityMessage {
    #[serde(rename = "marketId")]
    market_id: i64,
    #[serde(rename = "stationName")]
    station_name: Option<String>,
    #[serde(rename = "systemName")]
    system_name: Option<String>,
    #[serde(rename = "stationType")]
    station_type: Option<String>,
    #[serde(rename = "carrierDockingAccess")]
    carrier_docking_access: Option<String>,
    prohibited: Option<Vec<String>>,
    economies: Option<Vec<EconomyShare>>,
    commodities: Vec<CommodityEntry>,
}

#[derive(Debug, Deserialize)]
struct EconomyShare {
    name: String,
    proportion: f64,
}

/// Economies ranked by descending proportion: the payload carries a weighted list, stations only
/// keep a primary/secondary pair.
fn primary_and_secondary_economy(economies: &[EconomyShare]) -> (Option<String>, Option<String>) {
    let mut ranked: Vec<&EconomyShare> = economies.iter().collect();
    ranked.sort_by(|a, b| b.proportion.partial_cmp(&a.proportion).unwrap_or(std::cmp::Ordering::Equal));
    (ranked.first().map(|e| e.name.clone()), ranked.get(1).map(|e| e.name.clone()))
}

#[derive(Debug, Deserialize)]
struct CommodityEntry {
    name: String,
    #[serde(rename = "buyPrice")]
    buy_price: i64,
    #[serde(rename = "sellPrice")]
    sell_price: i64,
    #[serde(rename = "meanPrice")]
    mean_price: i64,
    stock: i64,
    demand: i64,
    #[serde(rename = "stockBracket")]
    stock_bracket: Option<i64>,
    #[serde(rename = "demandBracket")]
    demand_bracket: Option<i64>,
}

pub async fn handle(ctx: &HandlerContext, message: &serde_json::Value) -> Result<(), IngestError> {
    let msg: CommodityMessage = serde_json::from_value(message.clone())?;

    {
        let (primary_economy, secondary_economy) = msg
            .economies
            .as_deref()
            .map(primary_and_secondary_economy)
            .unwrap_or((None, None));

        let conn = ctx.stores.stations.lock().await;
        crate::db::stations::ensure_exists(&conn, msg.market_id)?;
        crate::db::stations::upsert(
            &conn,
            &StationPatch {
                market_id: msg.market_id,
                station_name: msg.station_name.clone(),
                station_type: msg.station_type.clone(),
                system_name: msg.system_name.clone(),
                primary_economy,
                secondary_economy,
                carrier_docking_access: msg.carrier_docking_access.clone(),
                prohibited_json: msg
                    .prohibited
                    .as_ref()
                    .map(|p| serde_json::to_string(p))
                    .transpose()
                    .map_err(IngestError::Malformed)?,
                ..Default::default()
            },
        )?;
    }

    if msg.commodities.is_empty() {
        return Ok(());
    }

    let conn = ctx.stores.trade.lock().await;
    let now = chrono::Utc::now();
    for entry in &msg.commodities {
        let record: Record = vec![
            ("commodityName", entry.name.clone().into()),
            ("marketId", msg.market_id.into()),
            ("buyPrice", entry.buy_price.into()),
            ("sellPrice", entry.sell_price.into()),
            ("meanPrice", entry.mean_price.into()),
            ("stock", entry.stock.into()),
            ("demand", entry.demand.into()),
            ("stockBracket", entry.stock_bracket.into()),
            ("demandBracket", entry.demand_bracket.into()),
            ("updatedAt", now.to_rfc3339().into()),
            ("updatedAtDay", now.format("%Y-%m-%d").to_string().into()),
        ];
        let columns: Vec<&str> = record.iter().map(|(c, _)| *c).collect();
        let values: Vec<&rusqlite::types::Value> = record.iter().map(|(_, v)| v).collect();
        let sql = ctx
            .statements
            .upsert_sql("trade.db", "trade", &["commodityName", "marketId"], &columns);
        conn.prepare_cached(&sql)?.execute(params_from_iter(values))?;
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
    async fn s1_commodity_happy_path() {
        let ctx = ctx().await;
        let message: serde_json::Value = serde_json::json!({
            "marketId": 1000,
            "systemName": "Sol",
            "stationName": "Abe",
            "timestamp": "2026-01-01T00:00:00Z",
            "commodities": [
                {"name": "Gold", "buyPrice": 9100, "sellPrice": 10334, "stock": 500, "demand": 0, "meanPrice": 9500}
            ]
        });

        handle(&ctx, &message).await.unwrap();

        let trade = ctx.stores.trade.lock().await;
        let count: i64 = trade
            .query_row("SELECT COUNT(*) FROM trade WHERE commodityName='Gold' AND marketId=1000", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let stations = ctx.stores.stations.lock().await;
        let name: String = stations
            .query_row("SELECT stationName FROM stations WHERE marketId=1000", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "Abe");
    }

    #[tokio::test]
    async fn missing_commodities_do_not_delete_existing_rows() {
        let ctx = ctx().await;
        let first = serde_json::json!({
            "marketId": 1, "commodities": [
                {"name": "Gold", "buyPrice": 100, "sellPrice": 200, "stock": 10, "demand": 0, "meanPrice": 150}
            ]
        });
        handle(&ctx, &first).await.unwrap();

        let second = serde_json::json!({"marketId": 1, "commodities": []});
        handle(&ctx, &second).await.unwrap();

        let trade = ctx.stores.trade.lock().await;
        let count: i64 = trade.query_row("SELECT COUNT(*) FROM trade WHERE marketId=1", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn economies_are_ranked_by_proportion_into_primary_and_secondary() {
        let ctx = ctx().await;
        let message = serde_json::json!({
            "marketId": 2000,
            "economies": [
                {"name": "Extraction", "proportion": 0.3},
                {"name": "Refinery", "proportion": 0.7}
            ],
            "commodities": []
        });
        handle(&ctx, &message).await.unwrap();

        let stations = ctx.stores.stations.lock().await;
        let (primary, secondary): (String, String) = stations
            .query_row("SELECT primaryEconomy, secondaryEconomy FROM stations WHERE marketId=2000", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(primary, "Refinery");
        assert_eq!(secondary, "Extraction");
    }
}

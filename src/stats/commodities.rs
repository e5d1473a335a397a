//! Per-commodity aggregates (§4.6): min/avg/max prices with the valid-price window, with a
//! static override for rare commodities.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use super::rare;

const MIN_VALID_PRICE: i64 = 1;
const MAX_VALID_PRICE: i64 = 999_999;

#[derive(Debug, Serialize, Clone)]
pub struct CommodityAggregate {
    pub commodity_name: String,
    pub min_buy_price: Option<i64>,
    pub avg_buy_price: Option<f64>,
    pub max_buy_price: Option<i64>,
    pub min_sell_price: Option<i64>,
    pub avg_sell_price: Option<f64>,
    pub max_sell_price: Option<i64>,
    pub total_stock: i64,
    pub total_demand: i64,
    pub is_rare: bool,
    /// Curated name from the rare-commodity override table (§9); `None` for ordinary commodities.
    pub display_name: Option<String>,
}

fn open_readonly(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("opening snapshot {}", path.display()))
}

pub fn generate_all(trade_snapshot: &Path) -> Result<Vec<CommodityAggregate>> {
    let conn = open_readonly(trade_snapshot)?;
    let mut stmt = conn.prepare("SELECT DISTINCT commodityName FROM trade")?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    drop(stmt);

    names.into_iter().map(|name| generate_one(&conn, &name)).collect()
}

fn generate_one(conn: &Connection, commodity_name: &str) -> Result<CommodityAggregate> {
    if rare::is_rare(commodity_name) {
        return generate_rare(conn, commodity_name);
    }

    let (min_buy, avg_buy, max_buy): (Option<i64>, Option<f64>, Option<i64>) = conn.query_row(
        "SELECT MIN(buyPrice), AVG(buyPrice), MAX(buyPrice) FROM trade
         WHERE commodityName = ?1 AND stock >= 1 AND buyPrice > ?2 AND buyPrice < ?3",
        rusqlite::params![commodity_name, MIN_VALID_PRICE - 1, MAX_VALID_PRICE],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let (min_sell, avg_sell, max_sell): (Option<i64>, Option<f64>, Option<i64>) = conn.query_row(
        "SELECT MIN(sellPrice), AVG(sellPrice), MAX(sellPrice) FROM trade
         WHERE commodityName = ?1 AND demand >= 1 AND sellPrice > ?2 AND sellPrice < ?3",
        rusqlite::params![commodity_name, MIN_VALID_PRICE - 1, MAX_VALID_PRICE],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let (total_stock, total_demand): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(stock), 0), COALESCE(SUM(demand), 0) FROM trade WHERE commodityName = ?1",
        [commodity_name],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(CommodityAggregate {
        commodity_name: commodity_name.to_string(),
        min_buy_price: min_buy,
        avg_buy_price: avg_buy,
        max_buy_price: max_buy,
        min_sell_price: min_sell,
        avg_sell_price: avg_sell,
        max_sell_price: max_sell,
        total_stock,
        total_demand,
        is_rare: false,
        display_name: None,
    })
}

fn generate_rare(conn: &Connection, commodity_name: &str) -> Result<CommodityAggregate> {
    let buy: Option<i64> = conn
        .query_row(
            "SELECT buyPrice FROM trade WHERE commodityName = ?1 AND stock >= 1 ORDER BY updatedAt DESC LIMIT 1",
            [commodity_name],
            |row| row.get(0),
        )
        .ok();

    let info = rare::lookup(commodity_name);

    Ok(CommodityAggregate {
        commodity_name: commodity_name.to_string(),
        min_buy_price: buy,
        avg_buy_price: buy.map(|b| b as f64),
        max_buy_price: buy,
        min_sell_price: buy.map(|b| b + rare::RARE_GOODS_PREMIUM),
        avg_sell_price: buy.map(|b| (b + rare::RARE_GOODS_PREMIUM) as f64),
        max_sell_price: buy.map(|b| b + rare::RARE_GOODS_PREMIUM),
        total_stock: info.map_or(0, |i| i.max_stock),
        total_demand: 0,
        is_rare: true,
        display_name: info.map(|i| i.display_name.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::trade::{self, CommodityQuote};

    fn seed(conn: &Connection) {
        trade::create_tables(conn, false).unwrap();
        trade::upsert(conn, &CommodityQuote {
            commodity_name: "Gold".into(), market_id: 1, buy_price: 9100, sell_price: 10334,
            mean_price: 9500, stock: 500, demand: 0, stock_bracket: None, demand_bracket: None,
        }).unwrap();
        trade::upsert(conn, &CommodityQuote {
            commodity_name: "Gold".into(), market_id: 2, buy_price: 0, sell_price: 10000,
            mean_price: 9000, stock: 10, demand: 0, stock_bracket: None, demand_bracket: None,
        }).unwrap();
    }

    #[test]
    fn zero_buy_price_excluded_from_aggregate() {
        let conn = Connection::open_in_memory().unwrap();
        seed(&conn);
        let agg = generate_one(&conn, "Gold").unwrap();
        assert_eq!(agg.min_buy_price, Some(9100));
        assert_eq!(agg.max_buy_price, Some(9100));
    }

    #[test]
    fn rare_commodity_gets_premium_sell_price() {
        let conn = Connection::open_in_memory().unwrap();
        trade::create_tables(&conn, false).unwrap();
        trade::upsert(&conn, &CommodityQuote {
            commodity_name: "Azure Milk".into(), market_id: 1, buy_price: 4000, sell_price: 4000,
            mean_price: 4000, stock: 100, demand: 0, stock_bracket: None, demand_bracket: None,
        }).unwrap();
        let agg = generate_one(&conn, "Azure Milk").unwrap();
        assert!(agg.is_rare);
        assert_eq!(agg.min_sell_price, Some(4000 + rare::RARE_GOODS_PREMIUM));
        assert_eq!(agg.display_name.as_deref(), Some("Azure Milk"));
        assert_eq!(agg.total_stock, 357);
    }
}

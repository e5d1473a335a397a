//! Commodity ticker (§4.6): "hot trades", "high value", "most active" leaderboards.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

const MIN_VALID_PRICE: i64 = 1;
const MAX_VALID_PRICE: i64 = 999_999;

#[derive(Debug, Serialize)]
pub struct CommodityTicker {
    pub hot_trades: Vec<HotTrade>,
    pub high_value: Vec<HighValueEntry>,
    pub most_active: Vec<MostActiveEntry>,
}

#[derive(Debug, Serialize)]
pub struct HotTrade {
    pub commodity_name: String,
    pub buy_market_id: i64,
    pub sell_market_id: i64,
    pub buy_price: i64,
    pub sell_price: i64,
    pub profit: i64,
}

#[derive(Debug, Serialize)]
pub struct HighValueEntry {
    pub commodity_name: String,
    pub max_sell_price: i64,
    pub market_count: i64,
    pub total_demand: i64,
}

#[derive(Debug, Serialize)]
pub struct MostActiveEntry {
    pub commodity_name: String,
    pub active_market_count: i64,
    pub total_stock: i64,
    pub total_demand: i64,
    pub avg_buy_price: f64,
    pub avg_sell_price: f64,
}

fn open_readonly(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("opening snapshot {}", path.display()))
}

pub fn generate(trade_snapshot: &Path) -> Result<CommodityTicker> {
    let conn = open_readonly(trade_snapshot)?;
    Ok(CommodityTicker {
        hot_trades: hot_trades(&conn)?,
        high_value: high_value(&conn)?,
        most_active: most_active(&conn)?,
    })
}

/// Top 20 by (sellPrice - buyPrice) across two different markets carrying the same commodity,
/// each side with enough stock/demand to actually trade.
fn hot_trades(conn: &Connection) -> Result<Vec<HotTrade>> {
    let mut stmt = conn.prepare(
        "SELECT b.commodityName, b.marketId, s.marketId, b.buyPrice, s.sellPrice,
                (s.sellPrice - b.buyPrice) AS profit
         FROM trade b
         JOIN trade s
           ON s.commodityName = b.commodityName
          AND s.marketId != b.marketId
         WHERE b.stock >= 100 AND b.buyPrice > ?1 AND b.buyPrice < ?2
           AND s.demand >= 100 AND s.sellPrice > ?1 AND s.sellPrice < ?2
           AND s.sellPrice > b.buyPrice
         ORDER BY profit DESC
         LIMIT 20",
    )?;
    let rows = stmt
        .query_map([MIN_VALID_PRICE - 1, MAX_VALID_PRICE], |row| {
            Ok(HotTrade {
                commodity_name: row.get(0)?,
                buy_market_id: row.get(1)?,
                sell_market_id: row.get(2)?,
                buy_price: row.get(3)?,
                sell_price: row.get(4)?,
                profit: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(rows)
}

/// Top 10 commodities by maximum sell price observed anywhere, with the number of distinct
/// markets carrying it and summed demand across those markets.
fn high_value(conn: &Connection) -> Result<Vec<HighValueEntry>> {
    let mut stmt = conn.prepare(
        "SELECT commodityName, MAX(sellPrice), COUNT(DISTINCT marketId), SUM(demand)
         FROM trade
         WHERE demand >= 1 AND sellPrice > ?1 AND sellPrice < ?2
         GROUP BY commodityName
         ORDER BY MAX(sellPrice) DESC
         LIMIT 10",
    )?;
    let rows = stmt
        .query_map([MIN_VALID_PRICE - 1, MAX_VALID_PRICE], |row| {
            Ok(HighValueEntry {
                commodity_name: row.get(0)?,
                max_sell_price: row.get(1)?,
                market_count: row.get(2)?,
                total_demand: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(rows)
}

/// Top 10 commodities by number of distinct markets that reported it in the last 24h, requiring
/// at least 5 active markets to qualify at all, with summed stock/demand and average prices among
/// those rows.
///
/// The cutoff is computed with `strftime` rather than `datetime('now', '-1 day')`: `updatedAt` is
/// stored as RFC3339 (`T` separator, numeric offset) while `datetime()` returns SQLite's own
/// space-separated, offset-less format. Comparing the two lexicographically would call every row
/// from the cutoff's calendar day "recent" regardless of time of day, since `T` (0x54) always
/// sorts after a space (0x20).
fn most_active(conn: &Connection) -> Result<Vec<MostActiveEntry>> {
    let mut stmt = conn.prepare(
        "SELECT commodityName, COUNT(DISTINCT marketId) AS active_markets,
                SUM(stock), SUM(demand), AVG(buyPrice), AVG(sellPrice)
         FROM trade
         WHERE updatedAt > strftime('%Y-%m-%dT%H:%M:%S', 'now', '-1 day')
         GROUP BY commodityName
         HAVING active_markets >= 5
         ORDER BY active_markets DESC
         LIMIT 10",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(MostActiveEntry {
                commodity_name: row.get(0)?,
                active_market_count: row.get(1)?,
                total_stock: row.get(2)?,
                total_demand: row.get(3)?,
                avg_buy_price: row.get(4)?,
                avg_sell_price: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::trade::{self, CommodityQuote};

    fn quote(name: &str, market_id: i64, buy: i64, sell: i64, stock: i64, demand: i64) -> CommodityQuote {
        CommodityQuote {
            commodity_name: name.into(),
            market_id,
            buy_price: buy,
            sell_price: sell,
            mean_price: (buy + sell) / 2,
            stock,
            demand,
            stock_bracket: None,
            demand_bracket: None,
        }
    }

    #[test]
    fn hot_trades_pairs_across_different_markets() {
        let conn = Connection::open_in_memory().unwrap();
        trade::create_tables(&conn, false).unwrap();
        trade::upsert(&conn, &quote("Gold", 1, 9000, 9000, 500, 0)).unwrap();
        trade::upsert(&conn, &quote("Gold", 2, 9000, 11000, 0, 500)).unwrap();

        let trades = hot_trades(&conn).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].profit, 2000);
    }

    #[test]
    fn hot_trades_excludes_same_market_pairing() {
        let conn = Connection::open_in_memory().unwrap();
        trade::create_tables(&conn, false).unwrap();
        trade::upsert(&conn, &quote("Gold", 1, 9000, 11000, 500, 500)).unwrap();

        assert!(hot_trades(&conn).unwrap().is_empty());
    }

    #[test]
    fn high_value_aggregates_across_markets_for_the_same_commodity() {
        let conn = Connection::open_in_memory().unwrap();
        trade::create_tables(&conn, false).unwrap();
        trade::upsert(&conn, &quote("Palladium", 1, 9000, 12000, 100, 50)).unwrap();
        trade::upsert(&conn, &quote("Palladium", 2, 9100, 13500, 100, 75)).unwrap();

        let entries = high_value(&conn).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].commodity_name, "Palladium");
        assert_eq!(entries[0].max_sell_price, 13500);
        assert_eq!(entries[0].market_count, 2);
        assert_eq!(entries[0].total_demand, 125);
    }

    #[test]
    fn most_active_requires_five_distinct_markets() {
        let conn = Connection::open_in_memory().unwrap();
        trade::create_tables(&conn, false).unwrap();
        for market_id in 1..=4 {
            trade::upsert(&conn, &quote("Gold", market_id, 9000, 9500, 100, 50)).unwrap();
        }
        assert!(most_active(&conn).unwrap().is_empty());

        trade::upsert(&conn, &quote("Gold", 5, 9000, 9500, 100, 50)).unwrap();
        let entries = most_active(&conn).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].active_market_count, 5);
        assert_eq!(entries[0].total_stock, 500);
        assert_eq!(entries[0].total_demand, 250);
    }

    #[test]
    fn most_active_cutoff_matches_rfc3339_storage_format() {
        // Regression: `updatedAt` is stored via `to_rfc3339()` ("...T12:00:00+00:00"); the cutoff
        // must be computed in the same format, not SQLite's `datetime()` ("...  12:00:00"), or
        // every row from the cutoff's calendar day would compare as "recent" regardless of time.
        let conn = Connection::open_in_memory().unwrap();
        trade::create_tables(&conn, false).unwrap();
        for market_id in 1..=5 {
            trade::upsert(&conn, &quote("Gold", market_id, 9000, 9500, 100, 50)).unwrap();
        }
        let stale_cutoff: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM trade WHERE updatedAt > strftime('%Y-%m-%dT%H:%M:%S', 'now', '+1 day')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(stale_cutoff, 0, "rows just written should not be 'after' a cutoff a day in the future");
    }
}

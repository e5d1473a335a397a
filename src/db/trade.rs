//! Trade store schema and accessors: one row per (commodityName, marketId), latest write wins.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};

const TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS trade (
    commodityName TEXT NOT NULL,
    marketId      INTEGER NOT NULL,
    buyPrice      INTEGER NOT NULL,
    sellPrice     INTEGER NOT NULL,
    meanPrice     INTEGER NOT NULL,
    stock         INTEGER NOT NULL,
    demand        INTEGER NOT NULL,
    stockBracket  INTEGER,
    demandBracket INTEGER,
    updatedAt     TEXT NOT NULL,
    updatedAtDay  TEXT NOT NULL,
    PRIMARY KEY (commodityName, marketId)
) WITHOUT ROWID;
";

const INDEX_SQL: &str = "
CREATE INDEX IF NOT EXISTS idx_trade_commodity ON trade(commodityName);
CREATE INDEX IF NOT EXISTS idx_trade_market ON trade(marketId);
CREATE INDEX IF NOT EXISTS idx_trade_updated ON trade(updatedAt);
";

/// `skip_expensive_indexes` (§6) skips all three secondary indexes, keeping only the composite
/// `(commodityName, marketId)` primary key. The trade table is the highest-write-volume store, so
/// this is the flag's main target.
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

#[derive(Debug, Clone)]
pub struct CommodityQuote {
    pub commodity_name: String,
    pub market_id: i64,
    pub buy_price: i64,
    pub sell_price: i64,
    pub mean_price: i64,
    pub stock: i64,
    pub demand: i64,
    pub stock_bracket: Option<i64>,
    pub demand_bracket: Option<i64>,
}

pub fn upsert(conn: &Connection, quote: &CommodityQuote) -> Result<()> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO trade
            (commodityName, marketId, buyPrice, sellPrice, meanPrice, stock, demand,
             stockBracket, demandBracket, updatedAt, updatedAtDay)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(commodityName, marketId) DO UPDATE SET
            buyPrice = excluded.buyPrice,
            sellPrice = excluded.sellPrice,
            meanPrice = excluded.meanPrice,
            stock = excluded.stock,
            demand = excluded.demand,
            stockBracket = excluded.stockBracket,
            demandBracket = excluded.demandBracket,
            updatedAt = excluded.updatedAt,
            updatedAtDay = excluded.updatedAtDay",
        params![
            quote.commodity_name,
            quote.market_id,
            quote.buy_price,
            quote.sell_price,
            quote.mean_price,
            quote.stock,
            quote.demand,
            quote.stock_bracket,
            quote.demand_bracket,
            now.to_rfc3339(),
            now.format("%Y-%m-%d").to_string(),
        ],
    )?;
    Ok(())
}

/// Deletes rows with `updatedAt` older than `horizon_days`. Used by the retention sweep (C9).
pub fn sweep_older_than(conn: &Connection, horizon_days: i64) -> Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(horizon_days)).to_rfc3339();
    let affected = conn.execute("DELETE FROM trade WHERE updatedAt < ?1", params![cutoff])?;
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

    fn quote(name: &str, market: i64, buy: i64, sell: i64) -> CommodityQuote {
        CommodityQuote {
            commodity_name: name.to_string(),
            market_id: market,
            buy_price: buy,
            sell_price: sell,
            mean_price: (buy + sell) / 2,
            stock: 500,
            demand: 0,
            stock_bracket: None,
            demand_bracket: None,
        }
    }

    #[test]
    fn upsert_is_keyed_by_commodity_and_market() {
        let conn = memdb();
        upsert(&conn, &quote("Gold", 1000, 9100, 10334)).unwrap();
        upsert(&conn, &quote("Gold", 1000, 9200, 10400)).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM trade", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
        let buy: i64 = conn
            .query_row("SELECT buyPrice FROM trade WHERE commodityName='Gold' AND marketId=1000", [], |r| r.get(0))
            .unwrap();
        assert_eq!(buy, 9200);
    }

    #[test]
    fn different_markets_get_distinct_rows() {
        let conn = memdb();
        upsert(&conn, &quote("Gold", 1, 100, 200)).unwrap();
        upsert(&conn, &quote("Gold", 2, 110, 210)).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM trade", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 2);
    }
}

//! Prepared-statement cache (C4).
//!
//! `rusqlite::Connection::prepare_cached` already memoizes by exact SQL text inside the
//! connection, so the actual statement object reuse comes for free once a connection is
//! obtained. What this module owns is keeping the *SQL text itself* from being rebuilt per
//! event: one handler emits one column-set shape, so the generated text is built once per
//! (db, table, column-set) and memoized here, then handed to `prepare_cached` by the caller.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// An ordered column -> value mapping. Order matters: it determines both the generated SQL and
/// the bind-parameter order.
pub type Record = Vec<(&'static str, rusqlite::types::Value)>;

#[derive(Default)]
pub struct StatementCache {
    upsert: Mutex<HashMap<String, Arc<str>>>,
    update: Mutex<HashMap<String, Arc<str>>>,
}

impl StatementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `INSERT ... ON CONFLICT(pk) DO UPDATE SET col = excluded.col` for every non-key column.
    /// `db_label` disambiguates the same table name across different database files (none of
    /// the four stores share a table name today, but the cache key includes it defensively).
    pub fn upsert_sql(&self, db_label: &str, table: &str, pk_cols: &[&str], columns: &[&str]) -> Arc<str> {
        let key = shape_key(db_label, table, pk_cols, columns);
        if let Some(sql) = self.upsert.lock().get(&key) {
            return sql.clone();
        }

        let col_list = columns.join(", ");
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let conflict_cols = pk_cols.join(", ");
        let assignments: Vec<String> = columns
            .iter()
            .filter(|c| !pk_cols.contains(c))
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();

        let sql = format!(
            "INSERT INTO {table} ({col_list}) VALUES ({}) ON CONFLICT({conflict_cols}) DO UPDATE SET {}",
            placeholders.join(", "),
            assignments.join(", "),
        );
        let sql: Arc<str> = Arc::from(sql.into_boxed_str());
        self.upsert.lock().insert(key, sql.clone());
        sql
    }

    /// `INSERT ... ON CONFLICT(pk) DO UPDATE SET` restricted to the given subset of columns,
    /// used by partial-update handlers (e.g. an approach event that only carries placement).
    pub fn update_sql(&self, db_label: &str, table: &str, pk_cols: &[&str], columns: &[&str]) -> Arc<str> {
        // identical shape to upsert_sql but kept as a distinct cache + entry point so callers
        // that only ever touch a subset of columns get their own memoized shape.
        let key = shape_key(db_label, table, pk_cols, columns);
        if let Some(sql) = self.update.lock().get(&key) {
            return sql.clone();
        }
        let sql = self.upsert_sql(db_label, table, pk_cols, columns);
        self.update.lock().insert(key, sql.clone());
        sql
    }
}

fn shape_key(db_label: &str, table: &str, pk_cols: &[&str], columns: &[&str]) -> String {
    format!("{db_label}|{table}|{}|{}", pk_cols.join(","), columns.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_shape_returns_same_pointer() {
        let cache = StatementCache::new();
        let a = cache.upsert_sql("systems.db", "systems", &["systemAddress"], &["systemAddress", "systemName"]);
        let b = cache.upsert_sql("systems.db", "systems", &["systemAddress"], &["systemAddress", "systemName"]);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_column_set_is_a_different_shape() {
        let cache = StatementCache::new();
        let a = cache.upsert_sql("systems.db", "systems", &["systemAddress"], &["systemAddress", "systemName"]);
        let b = cache.upsert_sql(
            "systems.db",
            "systems",
            &["systemAddress"],
            &["systemAddress", "systemName", "updatedAt"],
        );
        assert_ne!(a.as_ref(), b.as_ref());
    }

    #[test]
    fn generated_sql_is_well_formed() {
        let cache = StatementCache::new();
        let sql = cache.upsert_sql("trade.db", "trade", &["commodityName", "marketId"], &["commodityName", "marketId", "buyPrice"]);
        assert!(sql.contains("INSERT INTO trade"));
        assert!(sql.contains("ON CONFLICT(commodityName, marketId)"));
        assert!(sql.contains("buyPrice = excluded.buyPrice"));
    }
}

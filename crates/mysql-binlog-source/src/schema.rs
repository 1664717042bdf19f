//! MySQL schema collection for row decoding
//!
//! Binlog rows are positional. Column names, types, signedness and enum/set
//! members come from `INFORMATION_SCHEMA`, fetched once per table-schema
//! version and cached by the decoder.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_types::mysql_column_to_universal_type;
use std::collections::HashMap;
use std::sync::Arc;
use sync_core::{ColumnDefinition, LogPosition, TableDefinition};

use crate::SourceError;

/// Looks up the current column layout of a table.
#[async_trait]
pub trait ColumnFetcher: Send + Sync {
    /// Returns `None` if the table does not exist.
    async fn fetch_table(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Option<TableDefinition>, SourceError>;
}

/// `ColumnFetcher` backed by `INFORMATION_SCHEMA` queries.
#[derive(Clone)]
pub struct InformationSchemaFetcher {
    pool: mysql_async::Pool,
}

impl InformationSchemaFetcher {
    pub fn new(pool: mysql_async::Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ColumnFetcher for InformationSchemaFetcher {
    async fn fetch_table(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Option<TableDefinition>, SourceError> {
        let here = LogPosition::new("", 0);
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| SourceError::from_mysql(e, &here))?;

        let columns_query = "
            SELECT COLUMN_NAME, DATA_TYPE, COLUMN_TYPE, NUMERIC_PRECISION, NUMERIC_SCALE
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION";
        let column_rows: Vec<mysql_async::Row> = conn
            .exec(columns_query, (database, table))
            .await
            .map_err(|e| SourceError::from_mysql(e, &here))?;

        if column_rows.is_empty() {
            return Ok(None);
        }

        let pk_query = "
            SELECT COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE CONSTRAINT_NAME = 'PRIMARY'
                AND TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION";
        let primary_key: Vec<String> = conn
            .exec(pk_query, (database, table))
            .await
            .map_err(|e| SourceError::from_mysql(e, &here))?;

        let mut columns = Vec::with_capacity(column_rows.len());
        for row in column_rows {
            let missing = |what: &str| {
                SourceError::Protocol(format!("INFORMATION_SCHEMA row for {table} without {what}"))
            };
            let column_name: String = row.get(0).ok_or_else(|| missing("column name"))?;
            let data_type: String = row.get(1).ok_or_else(|| missing("data type"))?;
            let column_type: String = row.get(2).ok_or_else(|| missing("column type"))?;
            let precision: Option<u32> = row.get::<Option<u32>, _>(3).unwrap_or(None);
            let scale: Option<u32> = row.get::<Option<u32>, _>(4).unwrap_or(None);

            let universal_type =
                mysql_column_to_universal_type(&data_type, &column_type, precision, scale);
            columns.push(ColumnDefinition::new(column_name, universal_type));
        }

        Ok(Some(TableDefinition::new(
            database,
            table,
            columns,
            primary_key,
        )))
    }
}

/// A cached table layout and the binlog table id it was fetched for.
#[derive(Debug, Clone)]
pub(crate) struct CachedTable {
    pub table_id: u64,
    pub definition: Arc<TableDefinition>,
}

/// Per-table schema cache, keyed by table name.
#[derive(Debug, Default)]
pub(crate) struct SchemaCache {
    tables: HashMap<String, CachedTable>,
}

impl SchemaCache {
    /// Cached layout for a table, valid for `table_id` and `width` columns.
    pub fn get_valid(
        &self,
        table: &str,
        table_id: u64,
        width: usize,
    ) -> Option<Arc<TableDefinition>> {
        self.tables
            .get(table)
            .filter(|c| c.table_id == table_id && c.definition.column_count() == width)
            .map(|c| Arc::clone(&c.definition))
    }

    pub fn insert(&mut self, table_id: u64, definition: Arc<TableDefinition>) {
        self.tables.insert(
            definition.name.clone(),
            CachedTable {
                table_id,
                definition,
            },
        );
    }

    pub fn invalidate(&mut self, table: &str) -> bool {
        self.tables.remove(table).is_some()
    }

    /// Drop the cached entry if it was fetched for a different table id.
    pub fn invalidate_if_stale(&mut self, table: &str, table_id: u64) -> bool {
        if self
            .tables
            .get(table)
            .is_some_and(|c| c.table_id != table_id)
        {
            self.tables.remove(table);
            return true;
        }
        false
    }
}

/// Tables named by a DDL statement, if the statement changes table layout.
///
/// Recognizes `ALTER`, `RENAME`, `DROP`, `CREATE` and `TRUNCATE`; returns
/// every identifier-like token so callers can match them against the tracked
/// table names. Database-qualified names yield both parts.
pub(crate) fn ddl_tokens(query: &str) -> Option<Vec<String>> {
    let stripped = strip_leading_comments(query);
    let keyword: String = stripped
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();

    if !matches!(
        keyword.as_str(),
        "ALTER" | "RENAME" | "DROP" | "CREATE" | "TRUNCATE"
    ) {
        return None;
    }

    Some(
        stripped
            .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn strip_leading_comments(query: &str) -> &str {
    let mut rest = query.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("/*") {
            match after.find("*/") {
                Some(end) => rest = after[end + 2..].trim_start(),
                None => return "",
            }
        } else if rest.starts_with("--") || rest.starts_with('#') {
            match rest.find('\n') {
                Some(end) => rest = rest[end + 1..].trim_start(),
                None => return "",
            }
        } else {
            return rest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::UniversalType;

    fn def(name: &str, width: usize) -> TableDefinition {
        let columns = (0..width)
            .map(|i| ColumnDefinition::new(format!("c{i}"), UniversalType::Text))
            .collect();
        TableDefinition::new("tracker", name, columns, vec!["c0".to_string()])
    }

    #[test]
    fn test_cache_validity_by_table_id_and_width() {
        let mut cache = SchemaCache::default();
        cache.insert(7, Arc::new(def("torrents", 3)));

        assert!(cache.get_valid("torrents", 7, 3).is_some());
        assert!(cache.get_valid("torrents", 8, 3).is_none());
        assert!(cache.get_valid("torrents", 7, 4).is_none());

        assert!(!cache.invalidate_if_stale("torrents", 7));
        assert!(cache.invalidate_if_stale("torrents", 9));
        assert!(cache.get_valid("torrents", 7, 3).is_none());
    }

    #[test]
    fn test_ddl_detection() {
        let tokens = ddl_tokens("ALTER TABLE `torrents` ADD COLUMN x INT").unwrap();
        assert!(tokens.contains(&"torrents".to_string()));

        let tokens = ddl_tokens("/* pt-osc */ rename table tracker.torrents to tracker._old").unwrap();
        assert!(tokens.contains(&"tracker".to_string()));
        assert!(tokens.contains(&"torrents".to_string()));

        assert!(ddl_tokens("BEGIN").is_none());
        assert!(ddl_tokens("INSERT INTO torrents VALUES (1)").is_none());
        assert!(ddl_tokens("TRUNCATE torrents_statistics").is_some());
    }
}

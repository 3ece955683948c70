//! In-memory ordered store

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use tokio::sync::RwLock;

use loadpace_core::{AnalyzeDb, Db, OperationError, Record};

type Table = BTreeMap<String, Record>;

/// Statistics gathered by [`AnalyzeDb::analyze`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TableStats {
    /// Records in the table
    pub records: usize,
    /// Mean number of fields per record
    pub avg_fields: f64,
    /// Mean bytes of field values per record
    pub avg_bytes: f64,
}

/// Ordered key-value store held in memory
///
/// Tables are created on first insert. Keys are kept sorted so scans walk
/// them in order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    stats: RwLock<HashMap<String, TableStats>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in `table`
    pub async fn len(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, BTreeMap::len)
    }

    /// Statistics from the most recent analysis of `table`
    pub async fn table_stats(&self, table: &str) -> Option<TableStats> {
        self.stats.read().await.get(table).copied()
    }
}

fn project(record: &Record, fields: Option<&[String]>) -> Record {
    match fields {
        None => record.clone(),
        Some(fields) => fields
            .iter()
            .filter_map(|f| record.get(f).map(|v| (f.clone(), v.clone())))
            .collect(),
    }
}

fn not_found(table: &str, key: &str) -> OperationError {
    OperationError::NotFound {
        table: table.to_string(),
        key: key.to_string(),
    }
}

#[async_trait]
impl Db for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read(
        &self,
        table: &str,
        key: &str,
        fields: Option<&[String]>,
    ) -> Result<Record, OperationError> {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .and_then(|t| t.get(key))
            .map(|record| project(record, fields))
            .ok_or_else(|| not_found(table, key))
    }

    async fn scan(
        &self,
        table: &str,
        start_key: &str,
        count: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Record>, OperationError> {
        let tables = self.tables.read().await;
        let Some(t) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(t
            .range::<str, _>((Bound::Included(start_key), Bound::Unbounded))
            .take(count)
            .map(|(_, record)| project(record, fields))
            .collect())
    }

    async fn update(&self, table: &str, key: &str, values: Record) -> Result<(), OperationError> {
        let mut tables = self.tables.write().await;
        let record = tables
            .get_mut(table)
            .and_then(|t| t.get_mut(key))
            .ok_or_else(|| not_found(table, key))?;
        record.extend(values);
        Ok(())
    }

    async fn insert(&self, table: &str, key: &str, values: Record) -> Result<(), OperationError> {
        let mut tables = self.tables.write().await;
        let t = tables.entry(table.to_string()).or_default();
        if t.contains_key(key) {
            return Err(OperationError::AlreadyExists {
                table: table.to_string(),
                key: key.to_string(),
            });
        }
        t.insert(key.to_string(), values);
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<(), OperationError> {
        let mut tables = self.tables.write().await;
        tables
            .get_mut(table)
            .and_then(|t| t.remove(key))
            .map(|_| ())
            .ok_or_else(|| not_found(table, key))
    }

    fn as_analyze(&self) -> Option<&dyn AnalyzeDb> {
        Some(self)
    }
}

#[async_trait]
impl AnalyzeDb for MemoryStore {
    async fn analyze(&self, table: &str) -> Result<(), OperationError> {
        let stats = {
            let tables = self.tables.read().await;
            let Some(t) = tables.get(table) else {
                return Err(OperationError::store(format!("no such table: {table}")));
            };

            let records = t.len();
            let (fields, bytes) = t.values().fold((0usize, 0usize), |(f, b), record| {
                (f + record.len(), b + record.values().map(Vec::len).sum::<usize>())
            });
            let per_record = |n: usize| {
                if records > 0 {
                    n as f64 / records as f64
                } else {
                    0.0
                }
            };
            TableStats {
                records,
                avg_fields: per_record(fields),
                avg_bytes: per_record(bytes),
            }
        };

        tracing::info!(
            table = %table,
            records = stats.records,
            avg_fields = stats.avg_fields,
            avg_bytes = stats.avg_bytes,
            "Table analyzed"
        );
        self.stats.write().await.insert(table.to_string(), stats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, &str)]) -> Record {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect()
    }

    #[tokio::test]
    async fn test_insert_and_read() {
        let store = MemoryStore::new();
        store
            .insert("t", "user1", record(&[("f0", "a"), ("f1", "b")]))
            .await
            .unwrap();

        let all = store.read("t", "user1", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let fields = vec!["f1".to_string()];
        let some = store.read("t", "user1", Some(&fields)).await.unwrap();
        assert_eq!(some.len(), 1);
        assert_eq!(some["f1"], b"b".to_vec());
    }

    #[tokio::test]
    async fn test_missing_records() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.read("t", "nope", None).await,
            Err(OperationError::NotFound { .. })
        ));
        assert!(matches!(
            store.update("t", "nope", Record::new()).await,
            Err(OperationError::NotFound { .. })
        ));
        assert!(store.delete("t", "nope").await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_insert() {
        let store = MemoryStore::new();
        store.insert("t", "k", Record::new()).await.unwrap();
        assert!(matches!(
            store.insert("t", "k", Record::new()).await,
            Err(OperationError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryStore::new();
        store
            .insert("t", "k", record(&[("f0", "a"), ("f1", "b")]))
            .await
            .unwrap();
        store.update("t", "k", record(&[("f1", "z")])).await.unwrap();

        let r = store.read("t", "k", None).await.unwrap();
        assert_eq!(r["f0"], b"a".to_vec());
        assert_eq!(r["f1"], b"z".to_vec());
    }

    #[tokio::test]
    async fn test_scan_in_key_order() {
        let store = MemoryStore::new();
        for key in ["user3", "user1", "user2", "user5"] {
            store
                .insert("t", key, record(&[("id", key)]))
                .await
                .unwrap();
        }

        let rows = store.scan("t", "user2", 2, None).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], b"user2".to_vec());
        assert_eq!(rows[1]["id"], b"user3".to_vec());

        assert!(store.scan("other", "a", 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        store.insert("t", "k", Record::new()).await.unwrap();
        store.delete("t", "k").await.unwrap();
        assert_eq!(store.len("t").await, 0);
    }

    #[tokio::test]
    async fn test_analyze() {
        let store = MemoryStore::new();
        store
            .insert("t", "a", record(&[("f0", "xx"), ("f1", "yy")]))
            .await
            .unwrap();
        store
            .insert("t", "b", record(&[("f0", "xxxx")]))
            .await
            .unwrap();

        let analyze = store.as_analyze().unwrap();
        analyze.analyze("t").await.unwrap();

        let stats = store.table_stats("t").await.unwrap();
        assert_eq!(stats.records, 2);
        assert!((stats.avg_fields - 1.5).abs() < f64::EPSILON);
        assert!((stats.avg_bytes - 4.0).abs() < f64::EPSILON);

        assert!(analyze.analyze("missing").await.is_err());
    }
}

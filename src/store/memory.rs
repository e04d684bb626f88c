//! 内存记录存储：每张逻辑表一个 Vec，ID 单调递增

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Record, RecordQuery, RecordStore, SortOrder, StoreError, Table};

pub struct MemoryRecordStore {
    tables: RwLock<HashMap<Table, Vec<Record>>>,
    next_id: AtomicI64,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// 某张表的记录数
    pub async fn count(&self, table: Table) -> usize {
        self.tables.read().await.get(&table).map_or(0, Vec::len)
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, table: Table, mut record: Record) -> Result<Record, StoreError> {
        record.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.tables
            .write()
            .await
            .entry(table)
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn query(&self, table: Table, query: RecordQuery) -> Result<Vec<Record>, StoreError> {
        let tables = self.tables.read().await;
        let rows = match tables.get(&table) {
            Some(rows) => rows,
            None => return Ok(Vec::new()),
        };

        let matching = rows.iter().filter(|r| query.filter.matches(r));
        let limit = query.limit.unwrap_or(usize::MAX);
        let result = match query.order {
            SortOrder::Oldest => matching.take(limit).cloned().collect(),
            SortOrder::Newest => matching.rev().take(limit).cloned().collect(),
        };
        Ok(result)
    }
}

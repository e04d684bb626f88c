//! SQLite 记录存储（sqlx）
//!
//! 所有逻辑表共用一张 records 表，按 tbl 列区分；记录体以 JSON 存储。

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::{Record, RecordBody, RecordQuery, RecordStore, SortOrder, StoreError, Table};

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("{}: {}", parent.display(), e)))?;
            }
        }
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let store = Self { pool };
        store.init_tables().await?;

        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tbl TEXT NOT NULL,
                session_id TEXT,
                actor_id TEXT,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_tbl_session ON records(tbl, session_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, table: Table, mut record: Record) -> Result<Record, StoreError> {
        let body = serde_json::to_string(&record.body)?;
        let actor_id = record.actor().map(|a| a.as_str().to_string());

        let result = sqlx::query(
            "INSERT INTO records (tbl, session_id, actor_id, body, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(table.as_str())
        .bind(&record.session_id)
        .bind(&actor_id)
        .bind(&body)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        record.id = Some(result.last_insert_rowid());
        Ok(record)
    }

    async fn query(&self, table: Table, query: RecordQuery) -> Result<Vec<Record>, StoreError> {
        let order = match query.order {
            SortOrder::Oldest => "ASC",
            SortOrder::Newest => "DESC",
        };
        // SQLite 中 LIMIT -1 表示不限制
        let limit = query
            .limit
            .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let sql = format!(
            "SELECT id, session_id, body, created_at FROM records
             WHERE tbl = ?1
               AND (?2 IS NULL OR session_id = ?2)
               AND (?3 IS NULL OR actor_id = ?3)
             ORDER BY id {order}
             LIMIT ?4"
        );

        let rows = sqlx::query(&sql)
            .bind(table.as_str())
            .bind(&query.filter.session_id)
            .bind(query.filter.actor.as_ref().map(|a| a.as_str().to_string()))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let body: String = row.get("body");
            let created_at: String = row.get("created_at");
            let body: RecordBody = serde_json::from_str(&body)?;
            records.push(Record {
                id: Some(row.get("id")),
                session_id: row.get("session_id"),
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                body,
            });
        }
        Ok(records)
    }
}

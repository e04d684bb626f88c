//! 记录存储抽象层
//!
//! 按逻辑表名插入 / 查询记录；提供内存与 SQLite（`async-sqlite` feature）两种实现。

mod memory;
mod record;
#[cfg(feature = "async-sqlite")]
mod sqlite;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StoreSection;
use crate::core::ActorId;

pub use memory::MemoryRecordStore;
pub use record::{ActorRecord, MetricRecord, Record, RecordBody, RecordId};
#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteRecordStore;

/// 引擎写入的逻辑表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Actors,
    Communications,
    Tasks,
    Decisions,
    Metrics,
    CoordinationEvents,
    CoordinationSessions,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Actors => "actors",
            Self::Communications => "communications",
            Self::Tasks => "tasks",
            Self::Decisions => "decisions",
            Self::Metrics => "metrics",
            Self::CoordinationEvents => "coordination_events",
            Self::CoordinationSessions => "coordination_sessions",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "async-sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// 查询过滤条件（字段之间为 AND）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub session_id: Option<String>,
    pub actor: Option<ActorId>,
}

impl RecordFilter {
    pub fn matches(&self, record: &Record) -> bool {
        let session_ok = self
            .session_id
            .as_ref()
            .map_or(true, |s| record.session_id.as_deref() == Some(s.as_str()));
        let actor_ok = self
            .actor
            .as_ref()
            .map_or(true, |a| record.actor() == Some(a));
        session_ok && actor_ok
    }
}

/// 按插入顺序（记录 ID）排序
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Oldest,
    Newest,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    pub filter: RecordFilter,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            filter: RecordFilter {
                session_id: Some(session_id.into()),
                actor: None,
            },
            ..Default::default()
        }
    }

    pub fn by_actor(mut self, actor: ActorId) -> Self {
        self.filter.actor = Some(actor);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.order = SortOrder::Newest;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// 记录存储接口
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 插入记录，返回带生成 ID 的记录
    async fn insert(&self, table: Table, record: Record) -> Result<Record, StoreError>;

    async fn query(&self, table: Table, query: RecordQuery) -> Result<Vec<Record>, StoreError>;
}

/// 创建记录存储
///
/// backend = "sqlite" 且启用了 async-sqlite feature 时使用 SQLite；否则使用内存存储
pub async fn create_record_store(cfg: &StoreSection) -> Arc<dyn RecordStore> {
    #[cfg(feature = "async-sqlite")]
    if cfg.backend == "sqlite" {
        match SqliteRecordStore::new(&cfg.sqlite_path).await {
            Ok(store) => {
                tracing::info!("Using sqlite record store: {:?}", cfg.sqlite_path);
                return Arc::new(store);
            }
            Err(e) => {
                tracing::warn!("Failed to open sqlite store, falling back to memory: {}", e);
            }
        }
    }

    #[cfg(not(feature = "async-sqlite"))]
    if cfg.backend == "sqlite" {
        tracing::warn!("Sqlite record store requested but async-sqlite feature not enabled, using memory store");
    }

    tracing::info!("Using in-memory record store");
    Arc::new(MemoryRecordStore::new())
}

//! 引擎构建器：统一存储、时钟、参与者目录与引擎参数的装配

use std::sync::Arc;

use crate::config::AppConfig;
use crate::store::{create_record_store, MemoryRecordStore, RecordStore};

use super::actor::ActorDirectory;
use super::clock::{Clock, SystemClock};
use super::engine::{CoordinationEngine, EngineSettings};

/// 协同引擎构建器
pub struct EngineBuilder {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    directory: ActorDirectory,
    settings: EngineSettings,
}

impl EngineBuilder {
    /// 使用给定存储创建构建器；其余组件取默认值
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            directory: ActorDirectory::new(),
            settings: EngineSettings::default(),
        }
    }

    /// 内存存储 + 默认配置（测试与演示用）
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRecordStore::new()))
    }

    /// 从配置创建：按 [store] 选择后端，按 [actors] / [engine] 设置目录与参数
    pub async fn from_config(config: &AppConfig) -> Self {
        let store = create_record_store(&config.store).await;
        Self::new(store)
            .with_directory(ActorDirectory::from_config(&config.actors))
            .with_settings(EngineSettings::from(&config.engine))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_directory(mut self, directory: ActorDirectory) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> CoordinationEngine {
        CoordinationEngine::new(self.store, self.directory, self.clock, self.settings)
    }
}

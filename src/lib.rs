//! Realm - 分层多智能体协同引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 参与者目录、会话模型、效率评分、会话注册表、协同引擎
//! - **observability**: tracing 日志初始化
//! - **scenario**: 内置协同剧本与执行器
//! - **store**: 记录存储抽象（内存 / SQLite）

pub mod config;
pub mod core;
pub mod observability;
pub mod scenario;
pub mod store;

pub use crate::core::{CoordinationEngine, CoordinationError, EngineBuilder};
pub use scenario::{Scenario, ScenarioRunner};

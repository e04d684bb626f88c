//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `REALM__*` 覆盖（双下划线表示嵌套，如 `REALM__STORE__BACKEND=sqlite`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub scenarios: ScenariosSection,
    #[serde(default)]
    pub actors: ActorsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [engine] 段：默认值、超时与事件通道容量
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// 未指定时的任务优先级（1-5）
    #[serde(default = "default_task_priority")]
    pub default_task_priority: u8,
    /// 未指定时的决策置信度（0-100）
    #[serde(default = "default_confidence")]
    pub default_confidence: u8,
    /// 活跃会话超过该时长（秒）由 expire_stale 标记为失败
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// history 默认返回条数
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_task_priority() -> u8 {
    3
}

fn default_confidence() -> u8 {
    85
}

fn default_session_timeout_secs() -> u64 {
    1800
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_history_limit() -> usize {
    20
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            default_task_priority: default_task_priority(),
            default_confidence: default_confidence(),
            session_timeout_secs: default_session_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            history_limit: default_history_limit(),
        }
    }
}

/// [store] 段：memory / sqlite
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("workspace/realm.db")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

/// [scenarios] 段：延迟缩放与演示程序要运行的剧本
#[derive(Debug, Clone, Deserialize)]
pub struct ScenariosSection {
    /// 剧本延迟乘数；0 表示不等待
    #[serde(default = "default_delay_scale")]
    pub delay_scale: f64,
    #[serde(default = "default_run")]
    pub run: Vec<String>,
}

fn default_delay_scale() -> f64 {
    1.0
}

fn default_run() -> Vec<String> {
    vec![
        "customer_service".into(),
        "business_intelligence".into(),
        "incident_response".into(),
        "resource_optimization".into(),
    ]
}

impl Default for ScenariosSection {
    fn default() -> Self {
        Self {
            delay_scale: default_delay_scale(),
            run: default_run(),
        }
    }
}

/// [actors] 段：覆盖三个角色的参与者 ID
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ActorsSection {
    pub coordinator_id: Option<String>,
    pub service_agent_id: Option<String>,
    pub infra_agent_id: Option<String>,
}

/// 从 config 目录加载配置，环境变量 REALM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 REALM__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("REALM")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

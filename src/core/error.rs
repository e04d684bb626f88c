//! 协同引擎错误类型
//!
//! NotFound / Validation 对调用方是终止性的；持久化警告不作为错误值出现（仅记录日志），
//! 只有归档写入失败才以 PersistenceFatal 向上传播。

use thiserror::Error;

use crate::store::StoreError;

/// 引擎、注册表与剧本执行器共用的错误
#[derive(Error, Debug)]
pub enum CoordinationError {
    /// 会话不存在或已离开活跃表
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Task not found: {task_id} in session {session_id}")]
    TaskNotFound { session_id: String, task_id: String },

    #[error("Decision not found: {decision_id} in session {session_id}")]
    DecisionNotFound {
        session_id: String,
        decision_id: String,
    },

    /// 输入校验失败，在任何状态变更之前拒绝
    #[error("Validation error: {0}")]
    Validation(String),

    /// 归档写入失败：会话保持活跃，可重试 complete
    #[error("Persistence failed during archival of {session_id}: {source}")]
    PersistenceFatal {
        session_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Scenario run cancelled: {0}")]
    Cancelled(String),
}

impl CoordinationError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// NotFound 类错误（会话 / 任务 / 决策）
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_) | Self::TaskNotFound { .. } | Self::DecisionNotFound { .. }
        )
    }
}

pub type Result<T, E = CoordinationError> = std::result::Result<T, E>;

//! 协同事件：每个变更操作都产生一条，写入 coordination_events 表并广播给展示层

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::actor::ActorRole;
use super::session::{DecisionType, MessageType, SessionId, TaskStatus};

/// 事件明细（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventDetails {
    SessionInitialized {
        scenario_id: String,
        participants: Vec<ActorRole>,
    },
    MessageSent {
        message_id: String,
        from: ActorRole,
        to: ActorRole,
        message_type: MessageType,
        priority: u8,
    },
    TaskCreated {
        task_id: String,
        assigned_by: ActorRole,
        assigned_to: ActorRole,
        title: String,
        priority: u8,
    },
    TaskAdvanced {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    DecisionRecorded {
        decision_id: String,
        agent: ActorRole,
        decision_type: DecisionType,
        confidence: u8,
    },
    DecisionExecuted {
        decision_id: String,
    },
    MetricLogged {
        agent: ActorRole,
        metric_type: String,
        value: f64,
        unit: Option<String>,
    },
    SessionCompleted {
        outcome: String,
        efficiency_score: u8,
        duration_ms: i64,
    },
    SessionFailed {
        reason: String,
    },
}

impl EventDetails {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionInitialized { .. } => "session_initialized",
            Self::MessageSent { .. } => "message_sent",
            Self::TaskCreated { .. } => "task_created",
            Self::TaskAdvanced { .. } => "task_advanced",
            Self::DecisionRecorded { .. } => "decision_recorded",
            Self::DecisionExecuted { .. } => "decision_executed",
            Self::MetricLogged { .. } => "metric_logged",
            Self::SessionCompleted { .. } => "session_completed",
            Self::SessionFailed { .. } => "session_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationEvent {
    pub session_id: SessionId,
    pub details: EventDetails,
    pub timestamp: DateTime<Utc>,
}

impl CoordinationEvent {
    pub fn event_type(&self) -> &'static str {
        self.details.event_type()
    }
}

/// 只读事件流；落后太多时跳过丢失的事件继续读
pub struct EventFeed {
    receiver: broadcast::Receiver<CoordinationEvent>,
}

impl EventFeed {
    pub(crate) fn new(receiver: broadcast::Receiver<CoordinationEvent>) -> Self {
        Self { receiver }
    }

    /// 等待下一条事件；引擎释放后返回 None
    pub async fn recv(&mut self) -> Option<CoordinationEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event feed lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// 非阻塞读取
    pub fn try_recv(&mut self) -> Option<CoordinationEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event feed lagged, skipping events");
                }
                Err(_) => return None,
            }
        }
    }
}

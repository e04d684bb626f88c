//! 会话与事件实体：Session / Message / Task / Decision / FinalMetrics
//!
//! 会话只沿 Initializing → Active → {Completed, Failed} 前进；终态后不再接受追加。
//! 消息优先级由消息类型推导，不单独存储。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::actor::{ActorId, ActorRole};
use super::error::CoordinationError;
use crate::store::RecordId;

/// 会话 ID
pub type SessionId = String;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// 已创建，尚无任何追加
    Initializing,
    /// 至少有一条消息 / 任务 / 决策
    Active,
    /// 已完成并评分
    Completed,
    /// 已失败（出错、取消或超时）
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// 消息类型（封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Command,
    Delegation,
    Escalation,
    Emergency,
    Request,
    Info,
}

impl MessageType {
    pub const ALL: [MessageType; 6] = [
        MessageType::Command,
        MessageType::Delegation,
        MessageType::Escalation,
        MessageType::Emergency,
        MessageType::Request,
        MessageType::Info,
    ];

    /// 固定优先级表：emergency 5、escalation 4、command / delegation 3、request 2、info 1
    pub fn priority(&self) -> u8 {
        match self {
            Self::Emergency => 5,
            Self::Escalation => 4,
            Self::Command | Self::Delegation => 3,
            Self::Request => 2,
            Self::Info => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Delegation => "delegation",
            Self::Escalation => "escalation",
            Self::Emergency => "emergency",
            Self::Request => "request",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoordinationError::validation(format!("unknown message type: {s}")))
    }
}

/// 消息状态：只记录已发送，不建模投递与确认
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
}

/// 参与者之间的一条消息，追加后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: SessionId,
    pub from: ActorRole,
    pub to: ActorRole,
    pub from_actor: ActorId,
    pub to_actor: ActorId,
    pub content: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

impl Message {
    pub fn priority(&self) -> u8 {
        self.message_type.priority()
    }
}

/// 任务状态，只能向前推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn can_advance_to(&self, next: TaskStatus) -> bool {
        next > *self
    }
}

/// 任务附加信息：显式的可选字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub category: Option<String>,
    /// 预计耗时（分钟）
    pub estimated_minutes: Option<u32>,
    /// 期望完成期限（秒，相对创建时间）
    pub deadline_secs: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// 创建任务的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInput {
    pub title: String,
    pub description: String,
    /// 1-5，未设置时使用引擎默认值（3）
    pub priority: Option<u8>,
    #[serde(default)]
    pub metadata: TaskMetadata,
}

impl TaskInput {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            priority: None,
            metadata: TaskMetadata::default(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.metadata.category = Some(category.into());
        self
    }

    pub fn with_estimate(mut self, minutes: u32) -> Self {
        self.metadata.estimated_minutes = Some(minutes);
        self
    }

    /// 校验并解析优先级
    pub(crate) fn validate(&self, default_priority: u8) -> Result<u8, CoordinationError> {
        if self.title.trim().is_empty() {
            return Err(CoordinationError::validation("task title must not be empty"));
        }
        let priority = self.priority.unwrap_or(default_priority);
        if !(1..=5).contains(&priority) {
            return Err(CoordinationError::validation(format!(
                "task priority must be within 1..=5, got {priority}"
            )));
        }
        Ok(priority)
    }
}

/// 委派的工作单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// 持久化后由记录存储分配
    pub record_id: Option<RecordId>,
    pub session_id: SessionId,
    pub assigned_by: ActorRole,
    pub assigned_to: ActorRole,
    pub assigned_by_actor: ActorId,
    pub assigned_to_actor: ActorId,
    pub title: String,
    pub description: String,
    pub priority: u8,
    pub status: TaskStatus,
    pub metadata: TaskMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 决策类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Strategic,
    Tactical,
    ResourceAllocation,
    PolicyMandate,
    EmergencyResponse,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strategic => "strategic",
            Self::Tactical => "tactical",
            Self::ResourceAllocation => "resource_allocation",
            Self::PolicyMandate => "policy_mandate",
            Self::EmergencyResponse => "emergency_response",
        }
    }
}

impl FromStr for DecisionType {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Strategic,
            Self::Tactical,
            Self::ResourceAllocation,
            Self::PolicyMandate,
            Self::EmergencyResponse,
        ]
        .into_iter()
        .find(|t| t.as_str() == s)
        .ok_or_else(|| CoordinationError::validation(format!("unknown decision type: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Made,
    Executed,
}

/// 记录决策的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionInput {
    pub decision_type: DecisionType,
    pub description: String,
    pub reasoning: String,
    /// 0-100，越界时截断；未设置时使用引擎默认值（85）
    pub confidence: Option<f64>,
}

impl DecisionInput {
    pub fn new(
        decision_type: DecisionType,
        description: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            decision_type,
            description: description.into(),
            reasoning: reasoning.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// 校验描述并得到截断后的置信度
    pub(crate) fn validate(&self, default_confidence: u8) -> Result<u8, CoordinationError> {
        if self.description.trim().is_empty() {
            return Err(CoordinationError::validation(
                "decision description must not be empty",
            ));
        }
        match self.confidence {
            None => Ok(default_confidence.min(100)),
            Some(c) if c.is_nan() => Err(CoordinationError::validation("confidence is NaN")),
            Some(c) => Ok(clamp_percent(c)),
        }
    }
}

/// 某个参与者做出的决策
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub record_id: Option<RecordId>,
    pub session_id: SessionId,
    pub agent: ActorRole,
    pub agent_actor: ActorId,
    pub decision_type: DecisionType,
    pub description: String,
    pub reasoning: String,
    pub confidence: u8,
    pub status: DecisionStatus,
    pub made_at: DateTime<Utc>,
}

/// 会话计数器，评分时使用
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub messages_sent: u32,
    pub tasks_completed: u32,
    pub decisions_made: u32,
    pub metrics_logged: u32,
}

/// 一次剧本运行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub scenario_id: String,
    pub participants: Vec<ActorRole>,
    pub status: SessionStatus,
    pub messages: Vec<Message>,
    pub tasks: Vec<Task>,
    pub decisions: Vec<Decision>,
    pub metrics: SessionMetrics,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<String>,
    pub efficiency_score: Option<u8>,
    pub failure_reason: Option<String>,
}

impl Session {
    pub fn new(scenario_id: String, participants: Vec<ActorRole>, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("coord_{}", uuid::Uuid::new_v4()),
            scenario_id,
            participants,
            status: SessionStatus::Initializing,
            messages: Vec::new(),
            tasks: Vec::new(),
            decisions: Vec::new(),
            metrics: SessionMetrics::default(),
            created_at: now,
            completed_at: None,
            outcome: None,
            efficiency_score: None,
            failure_reason: None,
        }
    }

    pub fn is_participant(&self, role: ActorRole) -> bool {
        self.participants.contains(&role)
    }

    /// 第一次追加时 Initializing → Active
    pub(crate) fn activate(&mut self) {
        if self.status == SessionStatus::Initializing {
            self.status = SessionStatus::Active;
        }
    }

    /// 从开始到结束（或到 now）的毫秒数
    pub fn duration_ms(&self, now: DateTime<Utc>) -> i64 {
        let end = self.completed_at.unwrap_or(now);
        (end - self.created_at).num_milliseconds().max(0)
    }
}

/// complete 的返回值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalMetrics {
    pub session_id: SessionId,
    pub scenario_id: String,
    pub outcome: String,
    pub duration_ms: i64,
    pub messages_sent: u32,
    pub tasks_completed: u32,
    pub decisions_made: u32,
    pub metrics_logged: u32,
    pub efficiency_score: u8,
    pub completed_at: DateTime<Utc>,
}

/// 归档写入 coordination_sessions 表的会话摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub scenario_id: String,
    pub participants: Vec<ActorRole>,
    pub status: SessionStatus,
    pub metrics: SessionMetrics,
    pub outcome: Option<String>,
    pub efficiency_score: Option<u8>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            session_id: s.id.clone(),
            scenario_id: s.scenario_id.clone(),
            participants: s.participants.clone(),
            status: s.status,
            metrics: s.metrics,
            outcome: s.outcome.clone(),
            efficiency_score: s.efficiency_score,
            failure_reason: s.failure_reason.clone(),
            created_at: s.created_at,
            completed_at: s.completed_at,
        }
    }
}

/// 截断到 [0, 100] 并取整
pub(crate) fn clamp_percent(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

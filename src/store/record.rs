//! 记录结构：每类实体一个带标签的变体，而不是开放字典

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{
    ActorId, ActorRole, CoordinationEvent, Decision, Message, SessionSummary, Task,
};

/// 记录存储分配的 ID
pub type RecordId = i64;

/// actors 表的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorRecord {
    pub actor_id: ActorId,
    pub role: ActorRole,
    pub name: String,
    pub tier: u8,
}

/// metrics 表的一行（只写入，不进会话）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub agent: ActorRole,
    pub agent_actor: ActorId,
    pub metric_type: String,
    pub value: f64,
    pub unit: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RecordBody {
    Actor(ActorRecord),
    Communication(Message),
    Task(Task),
    Decision(Decision),
    Metric(MetricRecord),
    Event(CoordinationEvent),
    Session(SessionSummary),
}

impl RecordBody {
    /// 与记录相关的参与者（用于按参与者过滤）
    pub fn actor(&self) -> Option<&ActorId> {
        match self {
            Self::Actor(a) => Some(&a.actor_id),
            Self::Communication(m) => Some(&m.from_actor),
            Self::Task(t) => Some(&t.assigned_to_actor),
            Self::Decision(d) => Some(&d.agent_actor),
            Self::Metric(m) => Some(&m.agent_actor),
            Self::Event(_) | Self::Session(_) => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn into_record(self, session_id: Option<String>) -> Record {
        Record::new(self, session_id, Utc::now())
    }
}

/// 通用记录：插入前 id 为 None，插入后由存储填充
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Option<RecordId>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub body: RecordBody,
}

impl Record {
    pub fn new(body: RecordBody, session_id: Option<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            session_id,
            created_at,
            body,
        }
    }

    pub fn actor(&self) -> Option<&ActorId> {
        self.body.actor()
    }
}

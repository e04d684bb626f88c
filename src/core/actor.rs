//! 角色目录：三个固定层级角色 → 稳定的参与者 ID
//!
//! 层级自上而下：最高协调者（coordinator）、服务层（service-agent）、基础设施层（infra-agent）。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::CoordinationError;
use crate::config::ActorsSection;
use super::clock::Clock;
use crate::store::{ActorRecord, Record, RecordBody, RecordStore, Table};

/// 固定的三个层级角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActorRole {
    Coordinator,
    ServiceAgent,
    InfraAgent,
}

impl ActorRole {
    pub const ALL: [ActorRole; 3] = [
        ActorRole::Coordinator,
        ActorRole::ServiceAgent,
        ActorRole::InfraAgent,
    ];

    /// 逻辑角色名（与持久化、配置中的写法一致）
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::ServiceAgent => "service-agent",
            Self::InfraAgent => "infra-agent",
        }
    }

    /// 层级：0 为最高
    pub fn tier(&self) -> u8 {
        match self {
            Self::Coordinator => 0,
            Self::ServiceAgent => 1,
            Self::InfraAgent => 2,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Coordinator => "Supreme Coordinator",
            Self::ServiceAgent => "Service Agent",
            Self::InfraAgent => "Infrastructure Agent",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coordinator" | "king" => Ok(Self::Coordinator),
            "service-agent" | "service_agent" | "serf" => Ok(Self::ServiceAgent),
            "infra-agent" | "infra_agent" | "peasant" => Ok(Self::InfraAgent),
            other => Err(CoordinationError::validation(format!(
                "unknown actor role: {other}"
            ))),
        }
    }
}

/// 参与者稳定 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 角色目录
#[derive(Debug, Clone)]
pub struct ActorDirectory {
    ids: HashMap<ActorRole, ActorId>,
}

impl ActorDirectory {
    /// 使用默认 ID（`agent_<role>`）
    pub fn new() -> Self {
        Self::from_config(&ActorsSection::default())
    }

    /// 按 [actors] 段覆盖 ID，未设置的角色使用默认值
    pub fn from_config(cfg: &ActorsSection) -> Self {
        let mut ids = HashMap::new();
        for role in ActorRole::ALL {
            let configured = match role {
                ActorRole::Coordinator => cfg.coordinator_id.as_ref(),
                ActorRole::ServiceAgent => cfg.service_agent_id.as_ref(),
                ActorRole::InfraAgent => cfg.infra_agent_id.as_ref(),
            };
            let id = configured
                .filter(|s| !s.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| format!("agent_{}", role.as_str().replace('-', "_")));
            ids.insert(role, ActorId::new(id));
        }
        Self { ids }
    }

    pub fn id_of(&self, role: ActorRole) -> ActorId {
        self.ids
            .get(&role)
            .cloned()
            .unwrap_or_else(|| ActorId::new(role.as_str()))
    }

    /// 逻辑角色名 → 参与者 ID
    pub fn resolve(&self, name: &str) -> Result<ActorId, CoordinationError> {
        let role: ActorRole = name.parse()?;
        Ok(self.id_of(role))
    }

    /// 将三个角色写入 actors 表；失败只记录警告
    pub async fn register(&self, store: &dyn RecordStore, clock: &dyn Clock) -> usize {
        let mut registered = 0;
        for role in ActorRole::ALL {
            let body = RecordBody::Actor(ActorRecord {
                actor_id: self.id_of(role),
                role,
                name: role.display_name().to_string(),
                tier: role.tier(),
            });
            match store.insert(Table::Actors, Record::new(body, None, clock.now())).await {
                Ok(_) => registered += 1,
                Err(e) => tracing::warn!(role = %role, error = %e, "Failed to register actor"),
            }
        }
        registered
    }
}

impl Default for ActorDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::store::{MemoryRecordStore, RecordQuery};

    #[test]
    fn test_resolve_role_names_and_aliases() {
        let dir = ActorDirectory::new();
        assert_eq!(dir.resolve("coordinator").unwrap().as_str(), "agent_coordinator");
        assert_eq!(dir.resolve("service-agent").unwrap().as_str(), "agent_service_agent");
        assert_eq!(dir.resolve("peasant").unwrap().as_str(), "agent_infra_agent");
        assert!(dir.resolve("jester").is_err());
    }

    #[test]
    fn test_configured_ids_are_stable() {
        let cfg = ActorsSection {
            coordinator_id: Some("king-001".into()),
            service_agent_id: None,
            infra_agent_id: Some("   ".into()),
        };
        let dir = ActorDirectory::from_config(&cfg);
        let id = dir.resolve("king").unwrap();
        assert_eq!(id.as_str(), "king-001");
        assert_eq!(dir.id_of(ActorRole::InfraAgent).as_str(), "agent_infra_agent");
    }

    #[tokio::test]
    async fn test_register_writes_actor_records() {
        let store = MemoryRecordStore::new();
        let dir = ActorDirectory::new();
        let clock = ManualClock::default();
        clock.advance(std::time::Duration::from_secs(3600));
        assert_eq!(dir.register(&store, &clock).await, 3);
        let rows = store.query(Table::Actors, RecordQuery::default()).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.created_at == clock.now()));
    }
}

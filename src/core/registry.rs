//! 会话注册表
//!
//! 活跃会话表与历史列表放在同一把 RwLock 下，create / archive 串行化；
//! 每个会话另有一把 Mutex，不同会话的追加可以并发，同一会话的追加被串行化。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use super::actor::ActorRole;
use super::error::{CoordinationError, Result};
use super::session::{Session, SessionId};

/// 单个活跃会话的句柄
pub type SessionHandle = Arc<Mutex<Session>>;

#[derive(Default)]
struct RegistryState {
    active: HashMap<SessionId, SessionHandle>,
    /// 只追加
    history: Vec<Session>,
}

/// 会话注册表
#[derive(Default)]
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建会话（状态 Initializing，计数器清零），返回快照
    pub async fn create(
        &self,
        scenario_id: &str,
        participants: Vec<ActorRole>,
        now: DateTime<Utc>,
    ) -> Session {
        let session = Session::new(scenario_id.to_string(), participants, now);
        let snapshot = session.clone();
        self.state
            .write()
            .await
            .active
            .insert(session.id.clone(), Arc::new(Mutex::new(session)));
        snapshot
    }

    /// 获取活跃会话句柄
    pub async fn handle(&self, session_id: &str) -> Result<SessionHandle> {
        self.state
            .read()
            .await
            .active
            .get(session_id)
            .cloned()
            .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_string()))
    }

    /// 会话快照：先查活跃表，再查历史
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        let handle = {
            let state = self.state.read().await;
            match state.active.get(session_id) {
                Some(handle) => Arc::clone(handle),
                None => {
                    return state
                        .history
                        .iter()
                        .rev()
                        .find(|s| s.id == session_id)
                        .cloned()
                        .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_string()));
                }
            }
        };
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// 所有活跃会话快照（按创建时间升序）
    pub async fn list_active(&self) -> Vec<Session> {
        let handles: Vec<SessionHandle> = self.state.read().await.active.values().cloned().collect();
        let mut sessions = Vec::with_capacity(handles.len());
        for handle in handles {
            sessions.push(handle.lock().await.clone());
        }
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// 最近归档的会话，最新的在前
    pub async fn history(&self, limit: usize) -> Vec<Session> {
        self.state
            .read()
            .await
            .history
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// 从活跃表移除并追加到历史，每个会话只能成功一次
    ///
    /// `snapshot` 是调用方在会话锁内定格的终态快照。
    pub async fn archive(&self, session_id: &str, snapshot: Session) -> Result<()> {
        let mut state = self.state.write().await;
        if state.active.remove(session_id).is_none() {
            return Err(CoordinationError::SessionNotFound(session_id.to_string()));
        }
        state.history.push(snapshot);
        Ok(())
    }

    /// 创建时间早于 cutoff 的活跃会话 ID
    pub async fn stale_since(&self, cutoff: DateTime<Utc>) -> Vec<SessionId> {
        let mut stale = Vec::new();
        for session in self.list_active().await {
            if session.created_at < cutoff {
                stale.push(session.id);
            }
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::SessionStatus;

    fn roles() -> Vec<ActorRole> {
        ActorRole::ALL.to_vec()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = SessionRegistry::new();
        let session = registry.create("customer_service", roles(), Utc::now()).await;
        assert_eq!(session.status, SessionStatus::Initializing);
        assert_eq!(session.metrics.messages_sent, 0);

        let fetched = registry.get(&session.id).await.unwrap();
        assert_eq!(fetched.id, session.id);
        assert_eq!(registry.list_active().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.get("nope").await,
            Err(CoordinationError::SessionNotFound(_))
        ));
        assert!(registry.handle("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_archive_exactly_once() {
        let registry = SessionRegistry::new();
        let session = registry.create("incident_response", roles(), Utc::now()).await;

        registry.archive(&session.id, session.clone()).await.unwrap();
        assert!(registry.archive(&session.id, session.clone()).await.is_err());

        assert!(registry.list_active().await.is_empty());
        assert_eq!(registry.history(usize::MAX).await.len(), 1);
        // 历史中仍可查询
        assert_eq!(registry.get(&session.id).await.unwrap().id, session.id);
    }

    #[tokio::test]
    async fn test_history_newest_first_with_limit() {
        let registry = SessionRegistry::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let s = registry.create("business_intelligence", roles(), Utc::now()).await;
            registry.archive(&s.id, s.clone()).await.unwrap();
            ids.push(s.id);
        }
        let history = registry.history(2).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, ids[2]);
        assert_eq!(history[1].id, ids[1]);
    }

    #[tokio::test]
    async fn test_stale_since() {
        let registry = SessionRegistry::new();
        let old = registry
            .create("resource_optimization", roles(), Utc::now() - chrono::Duration::hours(2))
            .await;
        registry.create("customer_service", roles(), Utc::now()).await;

        let stale = registry.stale_since(Utc::now() - chrono::Duration::hours(1)).await;
        assert_eq!(stale, vec![old.id]);
    }
}

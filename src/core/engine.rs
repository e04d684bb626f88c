//! 协同引擎：打开会话、追加消息 / 任务 / 决策 / 指标、评分并归档
//!
//! 每个变更操作都会写一条协同事件；非关键路径上的持久化失败只记录 warn，内存状态为准；
//! 只有 complete 的归档写入失败是致命的（PersistenceFatal），此时会话保持原样留在活跃表中。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::actor::{ActorDirectory, ActorRole};
use super::clock::Clock;
use super::error::{CoordinationError, Result};
use super::events::{CoordinationEvent, EventDetails, EventFeed};
use super::registry::SessionRegistry;
use super::scorer;
use super::session::{
    Decision, DecisionInput, DecisionStatus, FinalMetrics, Message, MessageStatus, MessageType,
    Session, SessionId, SessionStatus, SessionSummary, Task, TaskInput, TaskStatus,
};
use crate::config::EngineSection;
use crate::store::{
    MetricRecord, Record, RecordBody, RecordQuery, RecordStore, StoreError, Table,
};

/// 引擎运行参数（来自 [engine] 段）
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_task_priority: u8,
    pub default_confidence: u8,
    pub session_timeout: Duration,
    pub event_channel_capacity: usize,
    pub history_limit: usize,
}

impl From<&EngineSection> for EngineSettings {
    fn from(s: &EngineSection) -> Self {
        Self {
            default_task_priority: s.default_task_priority,
            default_confidence: s.default_confidence,
            session_timeout: Duration::from_secs(s.session_timeout_secs),
            event_channel_capacity: s.event_channel_capacity.max(1),
            history_limit: s.history_limit,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&EngineSection::default())
    }
}

pub struct CoordinationEngine {
    registry: SessionRegistry,
    store: Arc<dyn RecordStore>,
    directory: ActorDirectory,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<CoordinationEvent>,
    settings: EngineSettings,
}

impl CoordinationEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        directory: ActorDirectory,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.event_channel_capacity.max(1));
        Self {
            registry: SessionRegistry::new(),
            store,
            directory,
            clock,
            events,
            settings,
        }
    }

    pub fn directory(&self) -> &ActorDirectory {
        &self.directory
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.store)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// 订阅只读事件流
    pub fn subscribe(&self) -> EventFeed {
        EventFeed::new(self.events.subscribe())
    }

    /// 打开新会话
    pub async fn initialize(
        &self,
        scenario_id: &str,
        participants: Vec<ActorRole>,
    ) -> Result<Session> {
        if scenario_id.trim().is_empty() {
            return Err(CoordinationError::validation("scenario id must not be empty"));
        }
        if participants.is_empty() {
            return Err(CoordinationError::validation("a session needs at least one participant"));
        }
        for (i, role) in participants.iter().enumerate() {
            if participants[..i].contains(role) {
                return Err(CoordinationError::validation(format!(
                    "duplicate participant: {role}"
                )));
            }
        }

        let session = self
            .registry
            .create(scenario_id, participants.clone(), self.clock.now())
            .await;
        info!(session_id = %session.id, scenario = scenario_id, "Coordination session initialized");

        self.emit(
            &session.id,
            EventDetails::SessionInitialized {
                scenario_id: scenario_id.to_string(),
                participants,
            },
        )
        .await;
        Ok(session)
    }

    /// 发送消息：优先级由类型推导，messages_sent + 1
    pub async fn send_message(
        &self,
        session_id: &str,
        from: ActorRole,
        to: ActorRole,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Result<Message> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(CoordinationError::validation("message content must not be empty"));
        }

        let mut session = self.open_session(session_id).await?;
        ensure_participant(&session, from)?;
        ensure_participant(&session, to)?;

        let message = Message {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            session_id: session.id.clone(),
            from,
            to,
            from_actor: self.directory.id_of(from),
            to_actor: self.directory.id_of(to),
            content,
            message_type,
            timestamp: self.clock.now(),
            status: MessageStatus::Sent,
        };
        session.messages.push(message.clone());
        session.metrics.messages_sent += 1;
        session.activate();
        debug!(
            session_id,
            from = %from,
            to = %to,
            kind = %message_type,
            priority = message.priority(),
            "Message sent"
        );

        self.persist(
            Table::Communications,
            session_id,
            RecordBody::Communication(message.clone()),
        )
        .await;
        self.emit(
            session_id,
            EventDetails::MessageSent {
                message_id: message.id.clone(),
                from,
                to,
                message_type,
                priority: message.priority(),
            },
        )
        .await;
        Ok(message)
    }

    /// 委派任务：默认优先级 3，新任务处于 Assigned；tasks_completed + 1
    pub async fn create_task(
        &self,
        session_id: &str,
        assigned_by: ActorRole,
        assigned_to: ActorRole,
        input: TaskInput,
    ) -> Result<Task> {
        let priority = input.validate(self.settings.default_task_priority)?;

        let mut session = self.open_session(session_id).await?;
        ensure_participant(&session, assigned_by)?;
        ensure_participant(&session, assigned_to)?;

        let now = self.clock.now();
        let mut task = Task {
            id: format!("task_{}", uuid::Uuid::new_v4()),
            record_id: None,
            session_id: session.id.clone(),
            assigned_by,
            assigned_to,
            assigned_by_actor: self.directory.id_of(assigned_by),
            assigned_to_actor: self.directory.id_of(assigned_to),
            title: input.title,
            description: input.description,
            priority,
            status: TaskStatus::Assigned,
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
        };
        session.tasks.push(task.clone());
        session.metrics.tasks_completed += 1;
        session.activate();
        debug!(session_id, task_id = %task.id, to = %assigned_to, priority, "Task created");

        if let Some(record) = self
            .persist(Table::Tasks, session_id, RecordBody::Task(task.clone()))
            .await
        {
            task.record_id = record.id;
            if let Some(stored) = session.tasks.last_mut() {
                stored.record_id = record.id;
            }
        }
        self.emit(
            session_id,
            EventDetails::TaskCreated {
                task_id: task.id.clone(),
                assigned_by,
                assigned_to,
                title: task.title.clone(),
                priority,
            },
        )
        .await;
        Ok(task)
    }

    /// 推进任务状态（只能向前）
    pub async fn advance_task(
        &self,
        session_id: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<Task> {
        let mut session = self.open_session(session_id).await?;
        let now = self.clock.now();
        let task = session
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| CoordinationError::TaskNotFound {
                session_id: session_id.to_string(),
                task_id: task_id.to_string(),
            })?;

        let previous = task.status;
        if !previous.can_advance_to(status) {
            return Err(CoordinationError::validation(format!(
                "task {task_id} cannot move from {previous:?} to {status:?}"
            )));
        }
        task.status = status;
        task.updated_at = now;
        let task = task.clone();

        self.emit(
            session_id,
            EventDetails::TaskAdvanced {
                task_id: task_id.to_string(),
                from: previous,
                to: status,
            },
        )
        .await;
        Ok(task)
    }

    /// 记录决策：默认置信度 85，截断到 [0, 100]；decisions_made + 1
    pub async fn record_decision(
        &self,
        session_id: &str,
        agent: ActorRole,
        input: DecisionInput,
    ) -> Result<Decision> {
        let confidence = input.validate(self.settings.default_confidence)?;

        let mut session = self.open_session(session_id).await?;
        ensure_participant(&session, agent)?;

        let mut decision = Decision {
            id: format!("decision_{}", uuid::Uuid::new_v4()),
            record_id: None,
            session_id: session.id.clone(),
            agent,
            agent_actor: self.directory.id_of(agent),
            decision_type: input.decision_type,
            description: input.description,
            reasoning: input.reasoning,
            confidence,
            status: DecisionStatus::Made,
            made_at: self.clock.now(),
        };
        session.decisions.push(decision.clone());
        session.metrics.decisions_made += 1;
        session.activate();
        debug!(session_id, agent = %agent, confidence, "Decision recorded");

        if let Some(record) = self
            .persist(Table::Decisions, session_id, RecordBody::Decision(decision.clone()))
            .await
        {
            decision.record_id = record.id;
            if let Some(stored) = session.decisions.last_mut() {
                stored.record_id = record.id;
            }
        }
        self.emit(
            session_id,
            EventDetails::DecisionRecorded {
                decision_id: decision.id.clone(),
                agent,
                decision_type: decision.decision_type,
                confidence,
            },
        )
        .await;
        Ok(decision)
    }

    /// Made → Executed
    pub async fn mark_decision_executed(
        &self,
        session_id: &str,
        decision_id: &str,
    ) -> Result<Decision> {
        let mut session = self.open_session(session_id).await?;
        let decision = session
            .decisions
            .iter_mut()
            .find(|d| d.id == decision_id)
            .ok_or_else(|| CoordinationError::DecisionNotFound {
                session_id: session_id.to_string(),
                decision_id: decision_id.to_string(),
            })?;
        if decision.status == DecisionStatus::Executed {
            return Err(CoordinationError::validation(format!(
                "decision {decision_id} already executed"
            )));
        }
        decision.status = DecisionStatus::Executed;
        let decision = decision.clone();

        self.emit(
            session_id,
            EventDetails::DecisionExecuted {
                decision_id: decision_id.to_string(),
            },
        )
        .await;
        Ok(decision)
    }

    /// 记录指标：只写入 metrics 表，不进入会话列表；metrics_logged + 1
    pub async fn log_metric(
        &self,
        session_id: &str,
        agent: ActorRole,
        metric_type: &str,
        value: f64,
        unit: Option<&str>,
    ) -> Result<()> {
        if metric_type.trim().is_empty() {
            return Err(CoordinationError::validation("metric type must not be empty"));
        }
        if !value.is_finite() {
            return Err(CoordinationError::validation(format!(
                "metric {metric_type} has non-finite value"
            )));
        }

        let mut session = self.open_session(session_id).await?;
        ensure_participant(&session, agent)?;
        session.metrics.metrics_logged += 1;

        let unit = unit.map(str::to_string);
        let record = MetricRecord {
            agent,
            agent_actor: self.directory.id_of(agent),
            metric_type: metric_type.to_string(),
            value,
            unit: unit.clone(),
            recorded_at: self.clock.now(),
        };
        self.persist(Table::Metrics, session_id, RecordBody::Metric(record))
            .await;
        self.emit(
            session_id,
            EventDetails::MetricLogged {
                agent,
                metric_type: metric_type.to_string(),
                value,
                unit,
            },
        )
        .await;
        Ok(())
    }

    /// 完成会话：评分、写归档记录、标记 Completed、移入历史
    ///
    /// 归档写入失败时返回 PersistenceFatal，会话不做任何修改并留在活跃表中。
    pub async fn complete(&self, session_id: &str, outcome: &str) -> Result<FinalMetrics> {
        if outcome.trim().is_empty() {
            return Err(CoordinationError::validation("outcome must not be empty"));
        }

        let mut session = self.open_session(session_id).await?;
        let completed_at = self.clock.now();
        let score = scorer::efficiency_score(session.created_at, completed_at, &session.metrics);

        let mut finalized = session.clone();
        finalized.status = SessionStatus::Completed;
        finalized.completed_at = Some(completed_at);
        finalized.outcome = Some(outcome.to_string());
        finalized.efficiency_score = Some(score);

        let archival = Record::new(
            RecordBody::Session(SessionSummary::from(&finalized)),
            Some(session_id.to_string()),
            completed_at,
        );
        if let Err(source) = self.store.insert(Table::CoordinationSessions, archival).await {
            error!(session_id, error = %source, "Archival write failed, session stays active");
            return Err(CoordinationError::PersistenceFatal {
                session_id: session_id.to_string(),
                source,
            });
        }

        *session = finalized.clone();
        drop(session);
        self.registry.archive(session_id, finalized.clone()).await?;

        let metrics = FinalMetrics {
            session_id: finalized.id.clone(),
            scenario_id: finalized.scenario_id.clone(),
            outcome: outcome.to_string(),
            duration_ms: finalized.duration_ms(completed_at),
            messages_sent: finalized.metrics.messages_sent,
            tasks_completed: finalized.metrics.tasks_completed,
            decisions_made: finalized.metrics.decisions_made,
            metrics_logged: finalized.metrics.metrics_logged,
            efficiency_score: score,
            completed_at,
        };
        info!(
            session_id,
            outcome,
            score,
            duration_ms = metrics.duration_ms,
            "Coordination session completed"
        );

        self.emit(
            session_id,
            EventDetails::SessionCompleted {
                outcome: outcome.to_string(),
                efficiency_score: score,
                duration_ms: metrics.duration_ms,
            },
        )
        .await;
        Ok(metrics)
    }

    /// 标记会话失败并移入历史（不评分）
    pub async fn fail(&self, session_id: &str, reason: &str) -> Result<Session> {
        if reason.trim().is_empty() {
            return Err(CoordinationError::validation("failure reason must not be empty"));
        }

        let mut session = self.open_session(session_id).await?;
        let now = self.clock.now();
        session.status = SessionStatus::Failed;
        session.completed_at = Some(now);
        session.failure_reason = Some(reason.to_string());
        let failed = session.clone();
        drop(session);

        self.persist(
            Table::CoordinationSessions,
            session_id,
            RecordBody::Session(SessionSummary::from(&failed)),
        )
        .await;
        self.registry.archive(session_id, failed.clone()).await?;
        warn!(session_id, reason, "Coordination session failed");

        self.emit(
            session_id,
            EventDetails::SessionFailed {
                reason: reason.to_string(),
            },
        )
        .await;
        Ok(failed)
    }

    /// 把创建时间超过 max_age 的活跃会话标记为失败，返回被处理的会话 ID
    pub async fn expire_stale(&self, max_age: Duration) -> Vec<SessionId> {
        // 超出可表示范围的时长视为没有会话过期
        let cutoff = match chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| self.clock.now().checked_sub_signed(age))
        {
            Some(cutoff) => cutoff,
            None => return Vec::new(),
        };
        let reason = format!("expired after {}s without completion", max_age.as_secs());

        let mut expired = Vec::new();
        for id in self.registry.stale_since(cutoff).await {
            match self.fail(&id, &reason).await {
                Ok(_) => expired.push(id),
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(session_id = %id, error = %e, "Failed to expire session"),
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired stale coordination sessions");
        }
        expired
    }

    /// 按 [engine].session_timeout_secs 清理
    pub async fn expire_timed_out(&self) -> Vec<SessionId> {
        self.expire_stale(self.settings.session_timeout).await
    }

    /// 活跃或历史会话的完整快照
    pub async fn status(&self, session_id: &str) -> Result<Session> {
        self.registry.get(session_id).await
    }

    pub async fn list_active(&self) -> Vec<Session> {
        self.registry.list_active().await
    }

    /// 最近归档的会话，最新的在前
    pub async fn history(&self, limit: usize) -> Vec<Session> {
        self.registry.history(limit).await
    }

    /// 使用默认条数的 history
    pub async fn recent_history(&self) -> Vec<Session> {
        self.history(self.settings.history_limit).await
    }

    /// 读回某会话已持久化的协同事件，最新的在前
    pub async fn events(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<CoordinationEvent>, StoreError> {
        let records = self
            .store
            .query(
                Table::CoordinationEvents,
                RecordQuery::for_session(session_id).newest_first().limit(limit),
            )
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|r| match r.body {
                RecordBody::Event(event) => Some(event),
                _ => None,
            })
            .collect())
    }

    /// 锁住一个未终结的活跃会话
    async fn open_session(&self, session_id: &str) -> Result<OwnedMutexGuard<Session>> {
        let handle = self.registry.handle(session_id).await?;
        let session = handle.lock_owned().await;
        if session.status.is_terminal() {
            // complete / fail 已定格但尚未移出活跃表
            return Err(CoordinationError::SessionNotFound(session_id.to_string()));
        }
        Ok(session)
    }

    /// 非关键写入：失败降级为警告
    async fn persist(&self, table: Table, session_id: &str, body: RecordBody) -> Option<Record> {
        let record = Record::new(body, Some(session_id.to_string()), self.clock.now());
        match self.store.insert(table, record).await {
            Ok(saved) => Some(saved),
            Err(e) => {
                warn!(session_id, table = %table, error = %e, "Persistence failed, keeping in-memory state");
                None
            }
        }
    }

    async fn emit(&self, session_id: &str, details: EventDetails) {
        let event = CoordinationEvent {
            session_id: session_id.to_string(),
            details,
            timestamp: self.clock.now(),
        };
        self.persist(
            Table::CoordinationEvents,
            session_id,
            RecordBody::Event(event.clone()),
        )
        .await;
        // 没有订阅者时 send 返回错误，忽略即可
        let _ = self.events.send(event);
    }
}

fn ensure_participant(session: &Session, role: ActorRole) -> Result<()> {
    if session.is_participant(role) {
        Ok(())
    } else {
        Err(CoordinationError::validation(format!(
            "{role} is not a participant of session {}",
            session.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::session::DecisionType;
    use crate::store::MemoryRecordStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// 可切换失败的存储
    struct FlakyStore {
        inner: MemoryRecordStore,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryRecordStore::new(),
                failing: AtomicBool::new(false),
            }
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl RecordStore for FlakyStore {
        async fn insert(&self, table: Table, record: Record) -> Result<Record, StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("store offline".into()));
            }
            self.inner.insert(table, record).await
        }

        async fn query(&self, table: Table, query: RecordQuery) -> Result<Vec<Record>, StoreError> {
            self.inner.query(table, query).await
        }
    }

    fn engine_with(store: Arc<dyn RecordStore>) -> (CoordinationEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let engine = CoordinationEngine::new(
            store,
            ActorDirectory::new(),
            clock.clone(),
            EngineSettings::default(),
        );
        (engine, clock)
    }

    fn engine() -> (CoordinationEngine, Arc<MemoryRecordStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryRecordStore::new());
        let (engine, clock) = engine_with(store.clone());
        (engine, store, clock)
    }

    fn all_roles() -> Vec<ActorRole> {
        ActorRole::ALL.to_vec()
    }

    #[tokio::test]
    async fn test_state_machine() {
        let (engine, _, _) = engine();
        let session = engine.initialize("customer_service", all_roles()).await.unwrap();
        assert_eq!(session.status, SessionStatus::Initializing);

        engine
            .send_message(
                &session.id,
                ActorRole::ServiceAgent,
                ActorRole::Coordinator,
                "Customer is furious about a double charge",
                MessageType::Escalation,
            )
            .await
            .unwrap();
        assert_eq!(engine.status(&session.id).await.unwrap().status, SessionStatus::Active);

        engine.complete(&session.id, "resolved").await.unwrap();
        let done = engine.status(&session.id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.outcome.as_deref(), Some("resolved"));
        assert!(engine.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn test_task_and_decision_also_activate() {
        let (engine, _, _) = engine();
        let a = engine.initialize("bi", all_roles()).await.unwrap();
        engine
            .create_task(&a.id, ActorRole::Coordinator, ActorRole::InfraAgent, TaskInput::new("Pull sales data", ""))
            .await
            .unwrap();
        assert_eq!(engine.status(&a.id).await.unwrap().status, SessionStatus::Active);

        let b = engine.initialize("bi", all_roles()).await.unwrap();
        engine
            .record_decision(
                &b.id,
                ActorRole::Coordinator,
                DecisionInput::new(DecisionType::Strategic, "Focus on retention", "churn is up"),
            )
            .await
            .unwrap();
        assert_eq!(engine.status(&b.id).await.unwrap().status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_metric_does_not_activate_or_append() {
        let (engine, store, _) = engine();
        let s = engine.initialize("resource_optimization", all_roles()).await.unwrap();
        engine
            .log_metric(&s.id, ActorRole::InfraAgent, "cpu_usage", 73.5, Some("percent"))
            .await
            .unwrap();

        let snapshot = engine.status(&s.id).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Initializing);
        assert_eq!(snapshot.metrics.metrics_logged, 1);
        assert!(snapshot.messages.is_empty());
        assert_eq!(store.count(Table::Metrics).await, 1);
    }

    #[tokio::test]
    async fn test_double_completion_is_not_found() {
        let (engine, _, _) = engine();
        let s = engine.initialize("customer_service", all_roles()).await.unwrap();
        engine.complete(&s.id, "resolved").await.unwrap();

        let err = engine.complete(&s.id, "resolved").await.unwrap_err();
        assert!(matches!(err, CoordinationError::SessionNotFound(_)));
        assert_eq!(engine.history(10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_completion_archives_once() {
        let (engine, store, _) = engine();
        let engine = Arc::new(engine);
        let s = engine.initialize("customer_service", all_roles()).await.unwrap();

        let a = {
            let engine = Arc::clone(&engine);
            let id = s.id.clone();
            tokio::spawn(async move { engine.complete(&id, "resolved").await })
        };
        let b = {
            let engine = Arc::clone(&engine);
            let id = s.id.clone();
            tokio::spawn(async move { engine.complete(&id, "resolved").await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(CoordinationError::SessionNotFound(_))))
                .count(),
            1
        );
        assert_eq!(engine.history(10).await.len(), 1);
        assert!(engine.list_active().await.is_empty());
        assert_eq!(store.count(Table::CoordinationSessions).await, 1);
    }

    #[tokio::test]
    async fn test_unknown_session_fails_everywhere() {
        let (engine, _, _) = engine();
        let id = "coord_missing";
        assert!(engine
            .send_message(id, ActorRole::Coordinator, ActorRole::ServiceAgent, "hi", MessageType::Info)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(engine
            .create_task(id, ActorRole::Coordinator, ActorRole::ServiceAgent, TaskInput::new("t", ""))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(engine.log_metric(id, ActorRole::Coordinator, "x", 1.0, None).await.unwrap_err().is_not_found());
        assert!(engine.complete(id, "resolved").await.unwrap_err().is_not_found());
        assert!(engine.status(id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_no_appends_after_completion() {
        let (engine, _, _) = engine();
        let s = engine.initialize("customer_service", all_roles()).await.unwrap();
        engine.complete(&s.id, "resolved").await.unwrap();

        let err = engine
            .send_message(&s.id, ActorRole::Coordinator, ActorRole::ServiceAgent, "late", MessageType::Info)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(engine.status(&s.id).await.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_append_order_round_trip() {
        let (engine, _, _) = engine();
        let s = engine.initialize("incident_response", all_roles()).await.unwrap();

        let mut sent = Vec::new();
        for (i, kind) in MessageType::ALL.into_iter().enumerate() {
            let m = engine
                .send_message(&s.id, ActorRole::Coordinator, ActorRole::InfraAgent, format!("step {i}"), kind)
                .await
                .unwrap();
            sent.push(m.id);
        }
        let mut tasks = Vec::new();
        for i in 0..3 {
            let t = engine
                .create_task(&s.id, ActorRole::Coordinator, ActorRole::ServiceAgent, TaskInput::new(format!("task {i}"), ""))
                .await
                .unwrap();
            tasks.push(t.id);
        }

        let mut decisions = Vec::new();
        for (i, kind) in [DecisionType::Strategic, DecisionType::Tactical, DecisionType::PolicyMandate]
            .into_iter()
            .enumerate()
        {
            let d = engine
                .record_decision(&s.id, ActorRole::Coordinator, DecisionInput::new(kind, format!("decision {i}"), ""))
                .await
                .unwrap();
            decisions.push(d.id);
        }

        let snapshot = engine.status(&s.id).await.unwrap();
        let got: Vec<_> = snapshot.messages.iter().map(|m| m.id.clone()).collect();
        assert_eq!(got, sent);
        let got: Vec<_> = snapshot.decisions.iter().map(|d| d.id.clone()).collect();
        assert_eq!(got, decisions);
        assert_eq!(snapshot.metrics.decisions_made, 3);
        let got: Vec<_> = snapshot.tasks.iter().map(|t| t.id.clone()).collect();
        assert_eq!(got, tasks);
        assert_eq!(snapshot.metrics.messages_sent, 6);
        assert_eq!(snapshot.metrics.tasks_completed, 3);
    }

    #[tokio::test]
    async fn test_defaults_and_record_ids() {
        let (engine, _, _) = engine();
        let s = engine.initialize("bi", all_roles()).await.unwrap();

        let task = engine
            .create_task(&s.id, ActorRole::Coordinator, ActorRole::InfraAgent, TaskInput::new("Aggregate", ""))
            .await
            .unwrap();
        assert_eq!(task.priority, 3);
        assert_eq!(task.status, TaskStatus::Assigned);
        assert!(task.record_id.is_some());

        let decision = engine
            .record_decision(
                &s.id,
                ActorRole::Coordinator,
                DecisionInput::new(DecisionType::Tactical, "Use cached data", "speed"),
            )
            .await
            .unwrap();
        assert_eq!(decision.confidence, 85);
        assert!(decision.record_id.is_some());

        let snapshot = engine.status(&s.id).await.unwrap();
        assert_eq!(snapshot.tasks[0].record_id, task.record_id);
        assert_eq!(snapshot.decisions[0].record_id, decision.record_id);
    }

    #[tokio::test]
    async fn test_validation_rejected_before_mutation() {
        let (engine, _, _) = engine();
        let s = engine
            .initialize("customer_service", vec![ActorRole::Coordinator, ActorRole::ServiceAgent])
            .await
            .unwrap();

        let err = engine
            .send_message(&s.id, ActorRole::Coordinator, ActorRole::InfraAgent, "hi", MessageType::Command)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinationError::Validation(_)));

        let err = engine
            .create_task(
                &s.id,
                ActorRole::Coordinator,
                ActorRole::ServiceAgent,
                TaskInput::new("Refund", "").with_priority(9),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinationError::Validation(_)));

        let snapshot = engine.status(&s.id).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Initializing);
        assert_eq!(snapshot.metrics, Default::default());

        assert!(engine.initialize("x", vec![]).await.is_err());
        assert!(engine
            .initialize("x", vec![ActorRole::Coordinator, ActorRole::Coordinator])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_downgraded() {
        let store = Arc::new(FlakyStore::new());
        let (engine, _) = engine_with(store.clone());
        let s = engine.initialize("customer_service", all_roles()).await.unwrap();

        store.set_failing(true);
        let message = engine
            .send_message(&s.id, ActorRole::ServiceAgent, ActorRole::Coordinator, "help", MessageType::Request)
            .await
            .unwrap();
        assert_eq!(message.priority(), 2);
        let task = engine
            .create_task(&s.id, ActorRole::Coordinator, ActorRole::InfraAgent, TaskInput::new("Check logs", ""))
            .await
            .unwrap();
        assert!(task.record_id.is_none());
        engine.log_metric(&s.id, ActorRole::InfraAgent, "latency", 120.0, Some("ms")).await.unwrap();

        let snapshot = engine.status(&s.id).await.unwrap();
        assert_eq!(snapshot.metrics.messages_sent, 1);
        assert_eq!(snapshot.metrics.tasks_completed, 1);
        assert_eq!(snapshot.metrics.metrics_logged, 1);
    }

    #[tokio::test]
    async fn test_archival_failure_is_fatal_and_retryable() {
        let store = Arc::new(FlakyStore::new());
        let (engine, _) = engine_with(store.clone());
        let s = engine.initialize("customer_service", all_roles()).await.unwrap();
        engine
            .send_message(&s.id, ActorRole::ServiceAgent, ActorRole::Coordinator, "help", MessageType::Escalation)
            .await
            .unwrap();

        store.set_failing(true);
        let err = engine.complete(&s.id, "resolved").await.unwrap_err();
        assert!(matches!(err, CoordinationError::PersistenceFatal { .. }));

        let still_active = engine.status(&s.id).await.unwrap();
        assert_eq!(still_active.status, SessionStatus::Active);
        assert!(still_active.outcome.is_none());
        assert_eq!(engine.list_active().await.len(), 1);

        store.set_failing(false);
        let metrics = engine.complete(&s.id, "resolved").await.unwrap();
        assert_eq!(metrics.outcome, "resolved");
    }

    #[tokio::test]
    async fn test_score_uses_session_duration() {
        let (engine, _, clock) = engine();
        let s = engine.initialize("customer_service", all_roles()).await.unwrap();
        for _ in 0..25 {
            engine
                .send_message(&s.id, ActorRole::Coordinator, ActorRole::ServiceAgent, "status?", MessageType::Info)
                .await
                .unwrap();
        }
        clock.advance(Duration::from_secs(8 * 60));
        let metrics = engine.complete(&s.id, "resolved").await.unwrap();
        assert_eq!(metrics.duration_ms, 8 * 60 * 1000);
        assert_eq!(metrics.efficiency_score, 94);
    }

    #[tokio::test]
    async fn test_advance_task_and_execute_decision() {
        let (engine, _, _) = engine();
        let s = engine.initialize("incident_response", all_roles()).await.unwrap();
        let task = engine
            .create_task(&s.id, ActorRole::Coordinator, ActorRole::InfraAgent, TaskInput::new("Restart db", ""))
            .await
            .unwrap();

        let t = engine.advance_task(&s.id, &task.id, TaskStatus::InProgress).await.unwrap();
        assert_eq!(t.status, TaskStatus::InProgress);
        let t = engine.advance_task(&s.id, &task.id, TaskStatus::Completed).await.unwrap();
        assert_eq!(t.status, TaskStatus::Completed);
        assert!(matches!(
            engine.advance_task(&s.id, &task.id, TaskStatus::Assigned).await,
            Err(CoordinationError::Validation(_))
        ));
        assert!(matches!(
            engine.advance_task(&s.id, "task_nope", TaskStatus::Completed).await,
            Err(CoordinationError::TaskNotFound { .. })
        ));

        let d = engine
            .record_decision(
                &s.id,
                ActorRole::Coordinator,
                DecisionInput::new(DecisionType::EmergencyResponse, "Fail over", "primary down"),
            )
            .await
            .unwrap();
        let d = engine.mark_decision_executed(&s.id, &d.id).await.unwrap();
        assert_eq!(d.status, DecisionStatus::Executed);
        assert!(engine.mark_decision_executed(&s.id, &d.id).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_and_expire() {
        let (engine, store, clock) = engine();
        let a = engine.initialize("customer_service", all_roles()).await.unwrap();
        assert!(matches!(
            engine.fail(&a.id, "  ").await,
            Err(CoordinationError::Validation(_))
        ));
        assert_eq!(engine.status(&a.id).await.unwrap().status, SessionStatus::Initializing);
        assert!(engine.complete(&a.id, "").await.is_err());

        let failed = engine.fail(&a.id, "agent crashed").await.unwrap();
        assert_eq!(failed.status, SessionStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("agent crashed"));
        assert!(failed.efficiency_score.is_none());
        assert!(engine.fail(&a.id, "again").await.unwrap_err().is_not_found());

        let b = engine.initialize("resource_optimization", all_roles()).await.unwrap();
        clock.advance(Duration::from_secs(3600));
        let c = engine.initialize("business_intelligence", all_roles()).await.unwrap();

        let expired = engine.expire_stale(Duration::from_secs(1800)).await;
        assert_eq!(expired, vec![b.id.clone()]);
        assert_eq!(engine.status(&b.id).await.unwrap().status, SessionStatus::Failed);
        assert_eq!(engine.status(&c.id).await.unwrap().status, SessionStatus::Initializing);
        assert_eq!(store.count(Table::CoordinationSessions).await, 2);
    }

    #[tokio::test]
    async fn test_expire_with_unrepresentable_age() {
        let (engine, _, _) = engine();
        let s = engine.initialize("customer_service", all_roles()).await.unwrap();

        let expired = engine
            .expire_stale(Duration::from_secs(10_000_000_000_000))
            .await;
        assert!(expired.is_empty());
        assert!(engine.expire_stale(Duration::MAX).await.is_empty());
        assert_eq!(engine.status(&s.id).await.unwrap().status, SessionStatus::Initializing);
    }

    #[tokio::test]
    async fn test_every_mutation_emits_event() {
        let (engine, store, _) = engine();
        let mut feed = engine.subscribe();
        let s = engine.initialize("customer_service", all_roles()).await.unwrap();
        engine
            .send_message(&s.id, ActorRole::ServiceAgent, ActorRole::Coordinator, "help", MessageType::Escalation)
            .await
            .unwrap();
        engine
            .create_task(&s.id, ActorRole::Coordinator, ActorRole::InfraAgent, TaskInput::new("Lookup", ""))
            .await
            .unwrap();
        engine.complete(&s.id, "resolved").await.unwrap();

        let mut kinds = Vec::new();
        while let Some(event) = feed.try_recv() {
            kinds.push(event.event_type());
        }
        assert_eq!(
            kinds,
            vec!["session_initialized", "message_sent", "task_created", "session_completed"]
        );
        assert_eq!(store.count(Table::CoordinationEvents).await, 4);

        let persisted = engine.events(&s.id, 2).await.unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].event_type(), "session_completed");
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let (engine, _, _) = engine();
        let engine = Arc::new(engine);
        let s = engine.initialize("incident_response", all_roles()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let engine = Arc::clone(&engine);
            let id = s.id.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .send_message(&id, ActorRole::Coordinator, ActorRole::InfraAgent, format!("ping {i}"), MessageType::Info)
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let snapshot = engine.status(&s.id).await.unwrap();
        assert_eq!(snapshot.messages.len(), 20);
        assert_eq!(snapshot.metrics.messages_sent, 20);
    }
}

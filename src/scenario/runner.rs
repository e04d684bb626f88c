//! 剧本执行器：逐步回放剧本，步骤之间经 Clock 模拟延迟
//!
//! 同一会话内严格顺序执行；不同会话可作为独立 tokio 任务并发运行。
//! 步骤出错或收到取消时，会话被标记为失败并移入历史。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{
    CoordinationEngine, CoordinationError, DecisionInput, FinalMetrics, Result, TaskInput,
};

use super::script::{Action, Scenario, Step};

pub struct ScenarioRunner {
    engine: Arc<CoordinationEngine>,
    delay_scale: f64,
    cancel: CancellationToken,
}

impl ScenarioRunner {
    pub fn new(engine: Arc<CoordinationEngine>) -> Self {
        Self {
            engine,
            delay_scale: 1.0,
            cancel: CancellationToken::new(),
        }
    }

    /// 延迟乘数；非有限值或负数按 0 处理
    pub fn with_delay_scale(mut self, scale: f64) -> Self {
        self.delay_scale = if scale.is_finite() && scale > 0.0 { scale } else { 0.0 };
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// 按 ID 查找并运行内置剧本
    pub async fn run_by_id(&self, scenario_id: &str) -> Result<FinalMetrics> {
        let scenario = Scenario::get(scenario_id)?;
        self.run(&scenario).await
    }

    /// 新建会话、回放全部步骤、以剧本的 outcome 完成会话
    pub async fn run(&self, scenario: &Scenario) -> Result<FinalMetrics> {
        let session = self
            .engine
            .initialize(&scenario.id, scenario.participants.clone())
            .await?;
        info!(session_id = %session.id, scenario = %scenario.id, steps = scenario.steps.len(), "Scenario started");

        if let Err(e) = self.replay(&session.id, scenario).await {
            let reason = match &e {
                CoordinationError::Cancelled(_) => "scenario cancelled".to_string(),
                other => format!("scenario step failed: {other}"),
            };
            if let Err(fail_err) = self.engine.fail(&session.id, &reason).await {
                warn!(session_id = %session.id, error = %fail_err, "Could not mark session failed");
            }
            return Err(e);
        }

        self.engine.complete(&session.id, &scenario.outcome).await
    }

    async fn replay(&self, session_id: &str, scenario: &Scenario) -> Result<()> {
        let clock = self.engine.clock();
        let mut next = 0;

        while let Some(step) = scenario.steps.get(next) {
            let delay = self.scaled(step.delay);
            if self.cancel.is_cancelled() {
                return Err(CoordinationError::Cancelled(format!(
                    "{} before step {}",
                    scenario.id,
                    next + 1
                )));
            }
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        return Err(CoordinationError::Cancelled(format!(
                            "{} while waiting for step {}",
                            scenario.id,
                            next + 1
                        )));
                    }
                    _ = clock.sleep(delay) => {}
                }
            }

            self.apply(session_id, step).await?;
            debug!(session_id, step = next + 1, kind = step.action.kind(), actor = %step.actor, "Step applied");
            next += 1;
        }
        Ok(())
    }

    async fn apply(&self, session_id: &str, step: &Step) -> Result<()> {
        match &step.action {
            Action::Message {
                to,
                message_type,
                content,
            } => {
                self.engine
                    .send_message(session_id, step.actor, *to, content.clone(), *message_type)
                    .await?;
            }
            Action::Task {
                to,
                title,
                description,
                priority,
                category,
                estimated_minutes,
            } => {
                let mut input = TaskInput::new(title.clone(), description.clone());
                if let Some(p) = priority {
                    input = input.with_priority(*p);
                }
                if let Some(c) = category {
                    input = input.with_category(c.clone());
                }
                if let Some(m) = estimated_minutes {
                    input = input.with_estimate(*m);
                }
                self.engine
                    .create_task(session_id, step.actor, *to, input)
                    .await?;
            }
            Action::Decision {
                decision_type,
                description,
                reasoning,
                confidence,
            } => {
                let mut input =
                    DecisionInput::new(*decision_type, description.clone(), reasoning.clone());
                if let Some(c) = confidence {
                    input = input.with_confidence(*c);
                }
                self.engine
                    .record_decision(session_id, step.actor, input)
                    .await?;
            }
            Action::Metric {
                metric_type,
                value,
                unit,
            } => {
                self.engine
                    .log_metric(session_id, step.actor, metric_type, *value, unit.as_deref())
                    .await?;
            }
        }
        Ok(())
    }

    fn scaled(&self, delay: Duration) -> Duration {
        if self.delay_scale == 0.0 {
            Duration::ZERO
        } else {
            delay.mul_f64(self.delay_scale)
        }
    }
}

//! 内置剧本：固定顺序的步骤，每步写明由谁执行、调用哪个引擎操作、参数和前置延迟

use std::time::Duration;

use crate::core::{ActorRole, CoordinationError, DecisionType, MessageType, Result};

use ActorRole::{Coordinator, InfraAgent, ServiceAgent};

/// 步骤要调用的引擎操作
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Message {
        to: ActorRole,
        message_type: MessageType,
        content: String,
    },
    Task {
        to: ActorRole,
        title: String,
        description: String,
        priority: Option<u8>,
        category: Option<String>,
        estimated_minutes: Option<u32>,
    },
    Decision {
        decision_type: DecisionType,
        description: String,
        reasoning: String,
        confidence: Option<f64>,
    },
    Metric {
        metric_type: String,
        value: f64,
        unit: Option<String>,
    },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Task { .. } => "task",
            Self::Decision { .. } => "decision",
            Self::Metric { .. } => "metric",
        }
    }
}

/// 单个剧本步骤
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// 执行前的模拟延迟
    pub delay: Duration,
    pub actor: ActorRole,
    pub action: Action,
}

impl Step {
    pub fn message(
        delay_ms: u64,
        from: ActorRole,
        to: ActorRole,
        message_type: MessageType,
        content: &str,
    ) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            actor: from,
            action: Action::Message {
                to,
                message_type,
                content: content.to_string(),
            },
        }
    }

    pub fn task(
        delay_ms: u64,
        by: ActorRole,
        to: ActorRole,
        priority: u8,
        title: &str,
        description: &str,
    ) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            actor: by,
            action: Action::Task {
                to,
                title: title.to_string(),
                description: description.to_string(),
                priority: Some(priority),
                category: None,
                estimated_minutes: None,
            },
        }
    }

    pub fn decision(
        delay_ms: u64,
        agent: ActorRole,
        decision_type: DecisionType,
        confidence: f64,
        description: &str,
        reasoning: &str,
    ) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            actor: agent,
            action: Action::Decision {
                decision_type,
                description: description.to_string(),
                reasoning: reasoning.to_string(),
                confidence: Some(confidence),
            },
        }
    }

    pub fn metric(delay_ms: u64, agent: ActorRole, metric_type: &str, value: f64, unit: &str) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            actor: agent,
            action: Action::Metric {
                metric_type: metric_type.to_string(),
                value,
                unit: Some(unit.to_string()),
            },
        }
    }

    /// 给任务步骤补充分类与预估时长
    fn categorized(mut self, category: &str, minutes: u32) -> Self {
        if let Action::Task {
            category: ref mut c,
            estimated_minutes: ref mut m,
            ..
        } = self.action
        {
            *c = Some(category.to_string());
            *m = Some(minutes);
        }
        self
    }
}

/// 一个具名、固定的剧本
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub participants: Vec<ActorRole>,
    pub steps: Vec<Step>,
    /// 剧本结束后 complete 使用的结果标签
    pub outcome: String,
}

impl Scenario {
    pub const IDS: [&'static str; 4] = [
        "customer_service",
        "business_intelligence",
        "incident_response",
        "resource_optimization",
    ];

    pub fn get(id: &str) -> Result<Self> {
        match id {
            "customer_service" => Ok(customer_service()),
            "business_intelligence" => Ok(business_intelligence()),
            "incident_response" => Ok(incident_response()),
            "resource_optimization" => Ok(resource_optimization()),
            other => Err(CoordinationError::UnknownScenario(other.to_string())),
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            customer_service(),
            business_intelligence(),
            incident_response(),
            resource_optimization(),
        ]
    }

    /// 所有步骤延迟之和（缩放前）
    pub fn total_delay(&self) -> Duration {
        self.steps.iter().map(|s| s.delay).sum()
    }

    /// 某类步骤的数量
    pub fn count(&self, kind: &str) -> usize {
        self.steps.iter().filter(|s| s.action.kind() == kind).count()
    }
}

fn customer_service() -> Scenario {
    Scenario {
        id: "customer_service".into(),
        name: "Customer Service Escalation".into(),
        participants: vec![Coordinator, ServiceAgent, InfraAgent],
        outcome: "resolved".into(),
        steps: vec![
            Step::message(
                500,
                ServiceAgent,
                Coordinator,
                MessageType::Escalation,
                "Customer reports a duplicate charge on their last invoice and is requesting a refund",
            ),
            Step::decision(
                800,
                Coordinator,
                DecisionType::Tactical,
                88.0,
                "Verify the billing history before approving a refund",
                "Refund requests above the auto-approval threshold need transaction evidence",
            ),
            Step::task(
                400,
                Coordinator,
                InfraAgent,
                4,
                "Retrieve customer billing history",
                "Pull the last 90 days of transactions for the account and flag duplicates",
            )
            .categorized("data_analysis", 5),
            Step::metric(1200, InfraAgent, "query_latency", 230.0, "ms"),
            Step::message(
                300,
                InfraAgent,
                Coordinator,
                MessageType::Info,
                "Found two identical charges 14 seconds apart; second one is a gateway retry",
            ),
            Step::message(
                300,
                Coordinator,
                ServiceAgent,
                MessageType::Command,
                "Approve the refund for the duplicate charge and apologise to the customer",
            ),
            Step::message(
                500,
                ServiceAgent,
                Coordinator,
                MessageType::Info,
                "Refund issued, customer confirmed the resolution",
            ),
            Step::metric(100, ServiceAgent, "customer_satisfaction", 4.6, "score"),
        ],
    }
}

fn business_intelligence() -> Scenario {
    Scenario {
        id: "business_intelligence".into(),
        name: "Quarterly Business Intelligence".into(),
        participants: vec![Coordinator, ServiceAgent, InfraAgent],
        outcome: "insights_delivered".into(),
        steps: vec![
            Step::decision(
                300,
                Coordinator,
                DecisionType::Strategic,
                82.0,
                "Run a comprehensive quarterly analysis across sales, marketing and operations",
                "Board review is due and the last analysis is older than one quarter",
            ),
            Step::task(
                300,
                Coordinator,
                InfraAgent,
                3,
                "Aggregate quarterly sales data",
                "Collect revenue by region and product line for the current quarter",
            )
            .categorized("data_collection", 15),
            Step::task(
                200,
                Coordinator,
                InfraAgent,
                3,
                "Aggregate marketing funnel data",
                "Collect campaign spend, leads and conversion rates",
            )
            .categorized("data_collection", 10),
            Step::metric(1500, InfraAgent, "records_processed", 48_210.0, "rows"),
            Step::message(
                400,
                InfraAgent,
                Coordinator,
                MessageType::Info,
                "Sales up 12% quarter over quarter; paid campaigns convert 3x better than organic",
            ),
            Step::decision(
                600,
                Coordinator,
                DecisionType::ResourceAllocation,
                79.0,
                "Shift 20% of the organic content budget to paid campaigns",
                "Paid conversion advantage is consistent across all regions",
            ),
            Step::message(
                300,
                Coordinator,
                ServiceAgent,
                MessageType::Command,
                "Prepare the customer-facing summary of the quarterly insights",
            ),
            Step::message(
                700,
                ServiceAgent,
                Coordinator,
                MessageType::Info,
                "Summary drafted and shared with stakeholders",
            ),
        ],
    }
}

fn incident_response() -> Scenario {
    Scenario {
        id: "incident_response".into(),
        name: "Production Incident Response".into(),
        participants: vec![Coordinator, ServiceAgent, InfraAgent],
        outcome: "mitigated".into(),
        steps: vec![
            Step::message(
                100,
                InfraAgent,
                Coordinator,
                MessageType::Escalation,
                "Primary database replica lag above 30s, checkout errors rising",
            ),
            Step::metric(100, InfraAgent, "error_rate", 7.5, "percent"),
            Step::decision(
                200,
                Coordinator,
                DecisionType::EmergencyResponse,
                91.0,
                "Fail over to the standby database",
                "Lag keeps growing and the standby is healthy",
            ),
            Step::task(
                100,
                Coordinator,
                InfraAgent,
                5,
                "Promote standby database",
                "Promote the standby, repoint the connection pool and drain the old primary",
            )
            .categorized("operations", 3),
            Step::message(
                200,
                Coordinator,
                ServiceAgent,
                MessageType::Command,
                "Post a status page notice about degraded checkout",
            ),
            Step::message(
                900,
                InfraAgent,
                Coordinator,
                MessageType::Info,
                "Failover complete, replica lag back under one second",
            ),
            Step::metric(300, InfraAgent, "error_rate", 0.2, "percent"),
            Step::message(
                200,
                ServiceAgent,
                Coordinator,
                MessageType::Info,
                "Status page updated to resolved",
            ),
        ],
    }
}

fn resource_optimization() -> Scenario {
    Scenario {
        id: "resource_optimization".into(),
        name: "Infrastructure Resource Optimization".into(),
        participants: vec![Coordinator, InfraAgent],
        outcome: "optimized".into(),
        steps: vec![
            Step::metric(200, InfraAgent, "cpu_utilization", 23.0, "percent"),
            Step::metric(100, InfraAgent, "monthly_cost", 18_400.0, "usd"),
            Step::message(
                300,
                InfraAgent,
                Coordinator,
                MessageType::Request,
                "Worker pool is under 25% utilised for two weeks; request approval to downsize",
            ),
            Step::decision(
                500,
                Coordinator,
                DecisionType::PolicyMandate,
                86.0,
                "Keep average worker utilisation between 50% and 70%",
                "Sustained low utilisation means paying for idle capacity",
            ),
            Step::task(
                200,
                Coordinator,
                InfraAgent,
                2,
                "Downsize worker pool",
                "Reduce the pool from 12 to 6 instances with autoscaling headroom",
            )
            .categorized("operations", 20),
            Step::message(
                1000,
                InfraAgent,
                Coordinator,
                MessageType::Info,
                "Pool downsized, utilisation now 58%",
            ),
            Step::metric(100, InfraAgent, "monthly_cost", 10_900.0, "usd"),
        ],
    }
}

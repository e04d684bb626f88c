//! 效率评分：根据时长、任务数、消息数计算 0-100 的完成分
//!
//! 奖励快速、少废话、多产出的协同；超过 5 分钟后每分钟扣 2 分，消息量不设无限奖励。

use chrono::{DateTime, Utc};

use super::session::{clamp_percent, SessionMetrics};

const BASE_SCORE: f64 = 100.0;
/// 超过该时长（分钟）开始扣分
const GRACE_MINUTES: f64 = 5.0;
const PENALTY_PER_MINUTE: f64 = 2.0;
const BONUS_PER_TASK: f64 = 5.0;
/// 0 < messages_sent < 20 时的沟通简洁奖励
const CONCISE_MESSAGE_LIMIT: u32 = 20;
const CONCISE_BONUS: f64 = 10.0;

/// 纯函数：由开始 / 结束时间与计数器计算效率分
pub fn efficiency_score(
    created_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    metrics: &SessionMetrics,
) -> u8 {
    let duration_minutes = (completed_at - created_at).num_milliseconds() as f64 / 60_000.0;

    let mut score = BASE_SCORE;
    if duration_minutes > GRACE_MINUTES {
        score -= (duration_minutes - GRACE_MINUTES) * PENALTY_PER_MINUTE;
    }
    score += f64::from(metrics.tasks_completed) * BONUS_PER_TASK;
    if metrics.messages_sent > 0 && metrics.messages_sent < CONCISE_MESSAGE_LIMIT {
        score += CONCISE_BONUS;
    }

    clamp_percent(score)
}

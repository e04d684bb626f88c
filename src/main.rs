//! Realm 演示程序
//!
//! 入口：初始化日志、加载配置、创建存储与协同引擎，注册参与者，
//! 并发运行配置中的剧本（每个会话一个 tokio 任务），最后以 JSON 打印每个会话的 FinalMetrics。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use futures_util::future::join_all;
use realm::core::{EngineBuilder, ShutdownManager};
use realm::scenario::ScenarioRunner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    realm::observability::init();

    // 可选参数：额外的配置文件路径
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = realm::config::load_config(config_path).context("Failed to load config")?;

    let engine = Arc::new(EngineBuilder::from_config(&config).await.build());
    let registered = engine
        .directory()
        .register(engine.store().as_ref(), engine.clock().as_ref())
        .await;
    tracing::info!("Registered {} actors", registered);

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    // 展示层：把事件流输出到 debug 日志
    let mut feed = engine.subscribe();
    tokio::spawn(async move {
        while let Some(event) = feed.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => tracing::debug!(target: "realm::feed", "{}", json),
                Err(e) => tracing::warn!("Failed to encode event: {}", e),
            }
        }
    });

    let handles: Vec<_> = config
        .scenarios
        .run
        .iter()
        .cloned()
        .map(|scenario_id| {
            let runner = ScenarioRunner::new(Arc::clone(&engine))
                .with_delay_scale(config.scenarios.delay_scale)
                .with_cancellation(shutdown.child_token());
            tokio::spawn(async move {
                let result = runner.run_by_id(&scenario_id).await;
                (scenario_id, result)
            })
        })
        .collect();

    let mut failures = 0;
    for joined in join_all(handles).await {
        match joined {
            Ok((_, Ok(metrics))) => {
                let json = serde_json::to_string_pretty(&metrics)
                    .context("Failed to encode final metrics")?;
                println!("{}", json);
            }
            Ok((scenario_id, Err(e))) => {
                failures += 1;
                tracing::error!("Scenario {} failed: {}", scenario_id, e);
            }
            Err(e) => {
                failures += 1;
                tracing::error!("Scenario task panicked: {}", e);
            }
        }
    }

    if shutdown.is_shutdown() {
        tracing::warn!("Run interrupted, cancelled sessions were marked failed");
    }

    let expired = engine.expire_timed_out().await;
    if !expired.is_empty() {
        tracing::warn!("Expired {} sessions left active", expired.len());
    }

    for session in engine.recent_history().await {
        tracing::info!(
            "Archived {} ({}): {:?}, score {:?}",
            session.id,
            session.scenario_id,
            session.status,
            session.efficiency_score
        );
    }
    tracing::info!("Finished with {} failed runs", failures);
    Ok(())
}

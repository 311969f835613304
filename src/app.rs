use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use scheduler_core::AppConfig;
use scheduler_dispatcher::{ScheduleProcessor, ScheduleRunner};
use scheduler_domain::{AgentClientFactory, DriverOutcome, Repositories, TaskExecutor};
use scheduler_infrastructure::{DatabaseManager, MetricsCollector};
use scheduler_worker::{AgentTaskExecutor, HttpAgentClientFactory};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// 执行一次驱动触发后退出，适合由系统cron调用
    Once,
    /// 按固定周期持续触发，直到收到关闭信号
    Daemon,
}

impl FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "once" => Ok(RunMode::Once),
            "daemon" => Ok(RunMode::Daemon),
            _ => Err(anyhow::anyhow!("不支持的运行模式: {s}")),
        }
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    database: Option<DatabaseManager>,
    processor: Arc<ScheduleProcessor>,
}

impl Application {
    /// 连接数据库并组装调度驱动
    pub async fn build(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序");

        let database = DatabaseManager::new(&config.database)
            .await
            .with_context(|| format!("连接数据库失败: {}", config.database.url))?;
        database.migrate().await.context("数据库迁移失败")?;

        let repositories = database.repositories();
        let metrics = Arc::new(MetricsCollector::new());
        let agent_factory: Arc<dyn AgentClientFactory> = Arc::new(HttpAgentClientFactory::new(
            config.agent.clone(),
            metrics.clone(),
        ));

        let mut app = Self::with_components(config, repositories, agent_factory, metrics)?;
        app.database = Some(database);
        Ok(app)
    }

    /// 使用给定的存储与代理工厂组装调度驱动
    pub fn with_components(
        config: AppConfig,
        repositories: Repositories,
        agent_factory: Arc<dyn AgentClientFactory>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self> {
        let executor: Arc<dyn TaskExecutor> = Arc::new(AgentTaskExecutor::new(
            repositories.backups.clone(),
            repositories.activities.clone(),
            config.agent.backup_adapter.clone(),
        ));
        let runner = Arc::new(ScheduleRunner::new(
            repositories.clone(),
            agent_factory,
            executor,
            metrics.clone(),
        ));
        let processor = ScheduleProcessor::new(
            repositories,
            runner,
            config.scheduler.clone(),
            metrics,
        )
        .context("创建调度驱动失败")?;

        Ok(Self {
            config,
            database: None,
            processor: Arc::new(processor),
        })
    }

    /// 执行一次驱动触发
    pub async fn run_once(&self, force: bool) -> DriverOutcome {
        let outcome = self.processor.run(force).await;
        log_outcome(&outcome);
        outcome
    }

    /// 守护模式：按配置周期触发，收到关闭信号后在当前触发完成后退出
    pub async fn run_daemon(&self, force: bool, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let period = Duration::from_secs(self.config.scheduler.tick_interval_seconds);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("守护模式已启动，触发周期: {} 秒", period.as_secs());

        // 仅首次触发使用强制标志
        let mut force_next = force;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // 触发进行中不响应关闭信号，保证调度计划完整执行
                    self.run_once(force_next).await;
                    force_next = false;
                }
                _ = shutdown_rx.recv() => {
                    info!("调度循环收到关闭信号");
                    break;
                }
            }
        }

        Ok(())
    }

    pub async fn close(&self) {
        if let Some(database) = &self.database {
            database.close().await;
        }
    }
}

fn log_outcome(outcome: &DriverOutcome) {
    match outcome {
        DriverOutcome::Throttled => info!("未满最小触发间隔，本次跳过"),
        DriverOutcome::Disabled => info!("调度功能已关闭"),
        DriverOutcome::Completed(summary) => info!(
            "本次触发处理完成: 到期 {}，成功 {}，跳过 {}，失败 {}",
            summary.due, summary.succeeded, summary.skipped, summary.failed
        ),
        DriverOutcome::Failed(message) => error!("本次触发失败: {}", message),
    }
}

/// 在指定地址安装 Prometheus 指标导出器
///
/// 必须在创建 `MetricsCollector` 之前调用，之前创建的指标句柄不会被导出。
pub fn install_metrics_exporter(address: &str) -> Result<()> {
    let address: SocketAddr = address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {address}"))?;

    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .map_err(|e| anyhow::anyhow!("安装 Prometheus 指标导出器失败: {e}"))?;

    info!("Prometheus 指标导出器已启动: {}", address);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_mode_parsing() {
        assert_eq!("once".parse::<RunMode>().unwrap(), RunMode::Once);
        assert_eq!("daemon".parse::<RunMode>().unwrap(), RunMode::Daemon);
        assert!("forever".parse::<RunMode>().is_err());
    }
}

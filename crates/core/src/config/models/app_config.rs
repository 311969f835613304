use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    agent::AgentConfig, database::DatabaseConfig, observability::ObservabilityConfig,
    scheduler::SchedulerConfig,
};

/// 调度器的全部配置，按功能分节
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub agent: AgentConfig,
    pub observability: ObservabilityConfig,
}

/// 未指定配置文件时依次查找的位置
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "config/scheduler.toml",
    "scheduler.toml",
    "/etc/fleet-scheduler/config.toml",
];

/// 环境变量前缀，嵌套键用 `__` 连接，例如 `SCHEDULER__AGENT__VERIFY_TLS`
const ENV_PREFIX: &str = "SCHEDULER";

impl AppConfig {
    /// 依次叠加内置默认值、TOML 配置文件与环境变量，后者优先
    ///
    /// 显式指定的文件必须存在；未指定时使用 [`DEFAULT_CONFIG_PATHS`] 中第一个存在的文件，
    /// 都不存在则只使用默认值与环境变量。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let file = match config_path {
            Some(path) if Path::new(path).exists() => Some(path),
            Some(path) => return Err(anyhow::anyhow!("配置文件不存在: {}", path)),
            None => DEFAULT_CONFIG_PATHS
                .iter()
                .copied()
                .find(|path| Path::new(path).exists()),
        };

        let mut sources = ConfigBuilder::builder();
        if let Some(path) = file {
            sources = sources.add_source(File::new(path, FileFormat::Toml));
        }
        sources = sources.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = sources
            .build()
            .with_context(|| format!("读取配置失败: {}", file.unwrap_or("<默认值>")))?
            .try_deserialize()
            .context("配置格式错误")?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置失败")
    }

    /// 逐节校验，错误信息带上出错的配置节
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("[database] 配置无效")?;
        self.scheduler.validate().context("[scheduler] 配置无效")?;
        self.agent.validate().context("[agent] 配置无效")?;
        self.observability
            .validate()
            .context("[observability] 配置无效")?;
        Ok(())
    }
}

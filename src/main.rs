use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use fleet_scheduler::{
    install_metrics_exporter, wait_for_shutdown_signal, Application, RunMode, ShutdownManager,
};
use scheduler_core::{init_logging, AppConfig, LogFormat};
use scheduler_dispatcher::{force_requested_by_env, FORCE_ENV_VAR};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // 解析命令行参数
    let matches = Command::new("fleet-scheduler")
        .version(env!("CARGO_PKG_VERSION"))
        .about("服务器计划任务调度与远程执行系统")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时依次查找默认位置"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式: once 执行一次后退出，daemon 按周期持续运行")
                .value_parser(["once", "daemon"])
                .default_value("once"),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .help(format!("跳过最小触发间隔检查 (也可设置环境变量 {FORCE_ENV_VAR}=1)"))
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty", "compact"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let config = AppConfig::load(config_path.map(String::as_str)).context("加载配置失败")?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.observability.log_level.clone());
    let log_format: LogFormat = matches
        .get_one::<String>("log-format")
        .unwrap_or(&config.observability.log_format)
        .parse()?;
    init_logging(&log_level, log_format)?;

    let mode: RunMode = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("once")
        .parse()?;
    let force = matches.get_flag("force") || force_requested_by_env();

    info!("启动服务器计划任务调度器，模式: {:?}", mode);
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }

    if mode == RunMode::Daemon {
        if let Some(address) = &config.observability.metrics_listen_address {
            install_metrics_exporter(address)?;
        }
    }

    let app = Application::build(config).await?;

    let exit_code = match mode {
        RunMode::Once => {
            let outcome = app.run_once(force).await;
            if outcome.is_failure() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        RunMode::Daemon => run_daemon(&app, force).await?,
    };

    app.close().await;
    info!("调度器已退出");
    Ok(exit_code)
}

async fn run_daemon(app: &Application, force: bool) -> Result<ExitCode> {
    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;

    let signal_handle = {
        let shutdown_manager = shutdown_manager.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            info!("收到关闭信号，等待当前触发完成...");
            shutdown_manager.shutdown().await;
        })
    };

    let result = app.run_daemon(force, shutdown_rx).await;
    signal_handle.abort();

    match result {
        Ok(()) => {
            info!("守护模式已优雅关闭");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("守护模式运行失败: {e:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}

//! Uptime Vitals 主程序入口
//!
//! HTTP 可用性检测引擎

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use uptime_vitals::cli::args::{Args, Commands};
use uptime_vitals::cli::commands::{
    load_config, ChecksCommand, Command, LogsCommand, RotateCommand, RunOnceCommand,
    StartCommand, ValidateCommand, VersionCommand,
};
use uptime_vitals::logging::{LogConfig, LoggingSystem};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 配置文件中的日志设置，加载失败时由具体命令报告错误
    let settings = load_config(&args)
        .await
        .map(|config| config.logging)
        .unwrap_or_default();
    let log_config = LogConfig::from_settings(&settings, args.log_level.map(Into::into));

    let logging = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!(
        "Uptime Vitals v{} 启动，日志级别: {}",
        uptime_vitals::VERSION,
        logging.config().level
    );

    // 执行命令
    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {}", e);
        eprintln!("错误: {e}");
        std::process::exit(1);
    }

    Ok(())
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Start { .. } => Box::new(StartCommand),
        Commands::RunOnce { .. } => Box::new(RunOnceCommand),
        Commands::Rotate => Box::new(RotateCommand),
        Commands::Checks { .. } => Box::new(ChecksCommand),
        Commands::Logs { .. } => Box::new(LogsCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    };

    command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
}

//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::check::{validate_check, Check, CheckState};
use crate::cli::args::{Args, ChecksAction, Commands, LogsAction, OutputFormat};
use crate::config::{
    validate_config, Config, ConfigLoader, NotificationConfig, NotificationKind, TomlConfigLoader,
};
use crate::error::{ConfigError, LogStoreError, NotificationError, Result};
use crate::health::{
    CheckCycle, HttpHealthChecker, OutcomeProcessor, Scheduler, TaskScheduler,
};
use crate::logs::{LogRecord, LogStore};
use crate::notification::template::default_alert_template;
use crate::notification::{
    AlertDispatcher, AlertTemplate, LogOnlySender, NoOpSender, NotificationSender, TwilioSender,
};
use crate::store::{FileRecordStore, RecordStore};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载配置
///
/// 显式指定的配置文件必须存在；未指定且默认位置没有配置文件时使用默认配置
pub async fn load_config(args: &Args) -> Result<Config> {
    let (config_path, explicit) = args.get_config_path();
    if !explicit && !config_path.exists() {
        info!("未找到配置文件 {}，使用默认配置", config_path.display());
        return Ok(Config::default());
    }

    TomlConfigLoader::new(true).load_from_file(&config_path).await
}

/// 根据配置创建通知发送器
pub fn build_sender(config: &NotificationConfig) -> Result<Arc<dyn NotificationSender>> {
    let sender: Arc<dyn NotificationSender> = match config.kind {
        NotificationKind::Log => Arc::new(LogOnlySender),
        NotificationKind::None => Arc::new(NoOpSender),
        NotificationKind::Twilio => {
            let twilio = config.twilio.clone().ok_or_else(|| {
                NotificationError::ConfigError("缺少 [notification.twilio] 配置".to_string())
            })?;
            Arc::new(TwilioSender::new(twilio)?)
        }
    };
    Ok(sender)
}

/// 服务组件集合
pub struct ServiceComponents {
    /// 检测记录存储
    pub store: Arc<FileRecordStore>,
    /// 检测日志
    pub logs: Arc<LogStore>,
    /// 告警分发器
    pub dispatcher: Arc<AlertDispatcher>,
    /// 检测周期编排器
    pub cycle: Arc<CheckCycle>,
}

impl ServiceComponents {
    /// 根据配置组装检测引擎
    pub fn build(config: &Config) -> Result<Self> {
        let store = Arc::new(FileRecordStore::new(&config.engine.data_dir));
        let logs = Arc::new(LogStore::new(&config.engine.logs_dir));
        let checker = Arc::new(HttpHealthChecker::new(&config.engine.user_agent)?);

        let sender = build_sender(&config.notification)?;
        let template = AlertTemplate::new(
            config
                .notification
                .message_template
                .as_deref()
                .unwrap_or(default_alert_template()),
        )?;
        let dispatcher = Arc::new(AlertDispatcher::new(sender, template));

        let processor = Arc::new(OutcomeProcessor::new(
            store.clone(),
            logs.clone(),
            dispatcher.clone(),
        ));
        let cycle = Arc::new(CheckCycle::new(
            store.clone(),
            checker,
            processor,
            config.engine.max_concurrent_probes,
        ));

        Ok(Self {
            store,
            logs,
            dispatcher,
            cycle,
        })
    }

    /// 创建包含检测周期和日志轮转两个周期任务的调度器
    pub fn scheduler(&self, config: &Config) -> TaskScheduler {
        TaskScheduler::new(config.engine.overlap_policy)
            .with_job(self.cycle.clone(), config.engine.check_interval())
            .with_job(self.logs.clone(), config.engine.rotation_interval())
    }
}

/// 启动命令
pub struct StartCommand;

#[async_trait]
impl Command for StartCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let mut config = load_config(args).await?;
        if let Commands::Start {
            interval,
            max_concurrent,
        } = &args.command
        {
            if let Some(interval_secs) = interval {
                config.engine.check_interval_seconds = *interval_secs;
            }
            if let Some(max) = max_concurrent {
                config.engine.max_concurrent_probes = *max;
            }
        }
        validate_config(&config).map_err(ConfigError::ValidationError)?;

        let components = ServiceComponents::build(&config)?;
        let scheduler = components.scheduler(&config);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("收到中断信号，正在停止服务...");
                    let _ = shutdown_tx.send(());
                }
                Err(err) => {
                    error!("监听中断信号失败: {}", err);
                }
            }
        });

        scheduler.start().await?;
        info!(
            "检测引擎已启动，检测间隔: {}秒，轮转间隔: {}秒",
            config.engine.check_interval_seconds, config.engine.rotation_interval_seconds
        );

        handle_shutdown(shutdown_rx, &scheduler).await?;

        let stats = components.dispatcher.stats();
        info!("服务已停止，告警发送成功 {}，失败 {}", stats.sent, stats.failed);
        Ok(())
    }
}

/// 等待关闭信号并停止调度器
async fn handle_shutdown(
    mut shutdown_rx: broadcast::Receiver<()>,
    scheduler: &TaskScheduler,
) -> Result<()> {
    if let Err(err) = shutdown_rx.recv().await {
        error!("等待关闭信号失败: {}", err);
    }

    scheduler.stop().await?;
    Ok(())
}

/// 单次检测命令
pub struct RunOnceCommand;

#[async_trait]
impl Command for RunOnceCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let format = match &args.command {
            Commands::RunOnce { format } => *format,
            _ => OutputFormat::Text,
        };

        let config = load_config(args).await?;
        let components = ServiceComponents::build(&config)?;
        let report = components.cycle.run().await;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text => {
                println!("检测数量: {}", report.listed);
                println!("  已检测: {}", report.probed);
                println!("  up: {}  down: {}", report.up, report.down);
                println!("  无效记录: {}", report.invalid);
                println!("  读取失败: {}", report.read_failures);
                println!("  保存失败: {}", report.persist_failures);
                println!("  告警: {}", report.alerts);
            }
        }

        if report.list_failed {
            return Err(anyhow::anyhow!("列出检测记录失败").into());
        }
        Ok(())
    }
}

/// 日志轮转命令
pub struct RotateCommand;

#[async_trait]
impl Command for RotateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let config = load_config(args).await?;
        let logs = LogStore::new(&config.engine.logs_dir);
        let report = logs.rotate().await;

        for (log_id, archive_id) in &report.archived {
            println!("✓ {log_id} -> {archive_id}");
        }
        for log_id in &report.conflicts {
            println!("✗ {log_id}: 归档文件已存在");
        }
        for (log_id, reason) in &report.failures {
            println!("✗ {log_id}: {reason}");
        }

        if report.is_clean() {
            println!("轮转完成，归档 {} 个日志", report.archived.len());
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "部分日志未能轮转: 冲突 {}，失败 {}",
                report.conflicts.len(),
                report.failures.len()
            )
            .into())
        }
    }
}

/// 检测记录查看命令
pub struct ChecksCommand;

#[async_trait]
impl Command for ChecksCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Checks { action } = &args.command else {
            return Ok(());
        };

        let config = load_config(args).await?;
        let store = FileRecordStore::new(&config.engine.data_dir);

        match action {
            ChecksAction::List { up, down, format } => {
                let filter = match (up, down) {
                    (true, _) => Some(CheckState::Up),
                    (_, true) => Some(CheckState::Down),
                    _ => None,
                };
                self.list(&store, filter, *format).await
            }
            ChecksAction::Show { id } => self.show(&store, id).await,
        }
    }
}

impl ChecksCommand {
    /// 列出检测
    async fn list(
        &self,
        store: &FileRecordStore,
        filter: Option<CheckState>,
        format: OutputFormat,
    ) -> Result<()> {
        let mut checks = Vec::new();
        let mut invalid = 0usize;

        for id in store.list().await? {
            let raw = store.read(&id).await?;
            match validate_check(&raw) {
                Ok(check) => checks.push(check),
                Err(e) => {
                    eprintln!("跳过无效记录 {id}: {e}");
                    invalid += 1;
                }
            }
        }

        checks.retain(|check| filter.is_none_or(|state| check.state == state));

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&checks)?),
            OutputFormat::Text => {
                for check in &checks {
                    println!("{}", format_check_row(check));
                }
                println!("共 {} 个检测，{} 个无效记录", checks.len(), invalid);
            }
        }
        Ok(())
    }

    /// 显示单个检测
    async fn show(&self, store: &FileRecordStore, id: &str) -> Result<()> {
        let raw = store.read(id).await?;
        match validate_check(&raw) {
            Ok(check) => {
                println!("{check}");
                println!("{}", serde_json::to_string_pretty(&check)?);
            }
            Err(e) => {
                println!("✗ 记录无效: {e}");
                println!("{}", serde_json::to_string_pretty(&raw)?);
            }
        }
        Ok(())
    }
}

/// 格式化检测列表中的一行
pub fn format_check_row(check: &Check) -> String {
    let last_checked = check
        .last_checked
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<20}  {:<4}  {:<6}  {:<40}  {}",
        check.id,
        check.state.to_string(),
        check.method.to_string(),
        check.full_url(),
        last_checked
    )
}

/// 检测日志查看命令
pub struct LogsCommand;

#[async_trait]
impl Command for LogsCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Logs { action } = &args.command else {
            return Ok(());
        };

        let config = load_config(args).await?;
        let logs = LogStore::new(&config.engine.logs_dir);

        match action {
            LogsAction::List { archived } => {
                for id in logs.list(*archived).await? {
                    println!("{id}");
                }
                Ok(())
            }
            LogsAction::Show { id, format } => {
                let records = read_any_log(&logs, id).await?;
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                    OutputFormat::Text => {
                        for record in &records {
                            println!("{}", format_log_row(record));
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

/// 先按活动日志读取，不存在时按归档读取
pub async fn read_any_log(logs: &LogStore, id: &str) -> Result<Vec<LogRecord>> {
    match logs.read_log(id).await {
        Ok(records) => Ok(records),
        Err(LogStoreError::NotFound { .. }) => Ok(logs.read_archive(id).await?),
        Err(e) => Err(e.into()),
    }
}

/// 格式化一条检测日志
pub fn format_log_row(record: &LogRecord) -> String {
    format!(
        "{}  {:<4}  {}{}",
        record.time.to_rfc3339(),
        record.state.to_string(),
        record.outcome,
        if record.alert { "  [ALERT]" } else { "" }
    )
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            config_path,
            verbose,
        } = &args.command
        {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path().0);

            self.validate_config_file(&config_file, *verbose).await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(config_path).await?;

        println!("✓ 配置文件验证通过");
        if verbose {
            let engine = &config.engine;
            println!("检测引擎:");
            println!("  检测间隔: {}秒", engine.check_interval_seconds);
            println!("  轮转间隔: {}秒", engine.rotation_interval_seconds);
            println!("  最大并发: {}", engine.max_concurrent_probes);
            println!("  重叠策略: {}", engine.overlap_policy);
            println!("  数据目录: {}", engine.data_dir.display());
            println!("  日志目录: {}", engine.logs_dir.display());
            println!("通知:");
            println!("  方式: {}", config.notification.kind);
            println!(
                "  模板: {}",
                config
                    .notification
                    .message_template
                    .as_deref()
                    .unwrap_or(default_alert_template())
            );
            println!("日志级别: {}", config.logging.level);
        }

        Ok(())
    }
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

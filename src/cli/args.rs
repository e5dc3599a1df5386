//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Uptime Vitals - HTTP 可用性检测引擎
#[derive(Parser, Debug, Clone)]
#[command(
    name = "uptime-vitals",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "UPTIME_VITALS_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，未指定时使用配置文件中的级别
    #[arg(
        short,
        long,
        value_enum,
        help = "日志级别",
        env = "UPTIME_VITALS_LOG_LEVEL"
    )]
    pub log_level: Option<LogLevel>,

    /// 是否启用详细输出
    #[arg(short, long, help = "启用详细输出")]
    pub verbose: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    /// 跟踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动调度器，直到收到 Ctrl+C
    Start {
        /// 检测间隔（秒）
        #[arg(
            short,
            long,
            value_name = "SECONDS",
            help = "检测间隔（秒）",
            env = "UPTIME_VITALS_INTERVAL"
        )]
        interval: Option<u64>,

        /// 最大并发检测数
        #[arg(
            long,
            value_name = "COUNT",
            help = "最大并发检测数",
            env = "UPTIME_VITALS_MAX_CONCURRENT"
        )]
        max_concurrent: Option<usize>,
    },

    /// 执行一次检测周期并输出汇总
    RunOnce {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 立即执行一次日志轮转
    Rotate,

    /// 查看检测记录
    Checks {
        #[command(subcommand)]
        action: ChecksAction,
    },

    /// 查看检测日志
    Logs {
        #[command(subcommand)]
        action: LogsAction,
    },

    /// 验证配置文件
    Validate {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径")]
        config_path: Option<PathBuf>,

        /// 是否显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 检测记录子命令
#[derive(Subcommand, Debug, Clone)]
pub enum ChecksAction {
    /// 列出所有检测
    List {
        /// 只显示状态为 up 的检测
        #[arg(long, conflicts_with = "down", help = "只显示 up 的检测")]
        up: bool,

        /// 只显示状态为 down 的检测
        #[arg(long, help = "只显示 down 的检测")]
        down: bool,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 显示单个检测
    Show {
        /// 检测ID
        #[arg(value_name = "ID", help = "检测ID")]
        id: String,
    },
}

/// 检测日志子命令
#[derive(Subcommand, Debug, Clone)]
pub enum LogsAction {
    /// 列出日志
    List {
        /// 同时列出已压缩的归档
        #[arg(short, long, help = "包含已压缩的归档")]
        archived: bool,
    },

    /// 显示活动日志或归档中的记录
    Show {
        /// 日志或归档ID
        #[arg(value_name = "ID", help = "日志或归档ID")]
        id: String,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 获取配置文件路径
    ///
    /// # 返回
    /// * `(PathBuf, bool)` - 路径，以及是否由用户显式指定
    pub fn get_config_path(&self) -> (PathBuf, bool) {
        match self.config.clone() {
            Some(config) => (config, true),
            None => (crate::config::get_default_config_path(), false),
        }
    }

    /// 是否启用详细输出
    pub fn is_verbose(&self) -> bool {
        self.verbose || matches!(self.log_level, Some(LogLevel::Debug | LogLevel::Trace))
    }
}

//! 日志系统模块
//!
//! 提供结构化日志配置和管理功能

use crate::config::LoggingConfig;
use log::LevelFilter;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter, Layer};

/// 全局日志初始化状态
#[derive(Debug)]
struct GlobalLoggingState {
    /// 是否已初始化
    initialized: bool,
    /// 初始化结果
    init_result: Result<(), String>,
}

impl Default for GlobalLoggingState {
    fn default() -> Self {
        Self {
            initialized: false,
            init_result: Ok(()),
        }
    }
}

/// 全局日志状态管理器
static GLOBAL_LOGGING_STATE: OnceLock<Mutex<GlobalLoggingState>> = OnceLock::new();

fn lock_state() -> MutexGuard<'static, GlobalLoggingState> {
    GLOBAL_LOGGING_STATE
        .get_or_init(|| Mutex::new(GlobalLoggingState::default()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// 日志配置结构
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 日志文件路径（可选）
    pub file_path: Option<PathBuf>,
    /// 是否输出到控制台
    pub console: bool,
    /// 是否使用JSON格式
    pub json_format: bool,
    /// 模块级别日志控制
    pub module_levels: HashMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file_path: None,
            console: true,
            json_format: false,
            module_levels: HashMap::new(),
        }
    }
}

impl LogConfig {
    /// 从配置文件的 `[logging]` 段构建
    ///
    /// # 参数
    /// * `settings` - 配置文件中的日志配置
    /// * `level_override` - 命令行或环境变量指定的级别，优先于配置文件
    pub fn from_settings(settings: &LoggingConfig, level_override: Option<LevelFilter>) -> Self {
        let level = level_override
            .or_else(|| LevelFilter::from_str(&settings.level).ok())
            .unwrap_or(LevelFilter::Info);

        Self {
            level,
            file_path: settings.file_path.clone(),
            console: settings.file_path.is_none(),
            json_format: settings.json_format,
            module_levels: settings
                .module_levels
                .iter()
                .filter_map(|(module, level)| {
                    LevelFilter::from_str(level)
                        .ok()
                        .map(|level| (module.clone(), level))
                })
                .collect(),
        }
    }
}

/// 日志系统管理器
#[derive(Debug)]
pub struct LoggingSystem {
    /// 配置
    config: LogConfig,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 进程内只初始化一次，重复调用返回新的句柄而不会重复安装 subscriber
    ///
    /// # 参数
    /// * `config` - 日志配置
    ///
    /// # 返回
    /// * `Result<LoggingSystem, anyhow::Error>` - 初始化结果
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<Self> {
        let mut state = lock_state();
        if state.initialized {
            return match &state.init_result {
                Ok(()) => Ok(Self { config }),
                Err(e) => Err(anyhow::anyhow!("日志系统之前初始化失败: {}", e)),
            };
        }

        let init_result = Self::perform_initialization(&config);
        state.initialized = true;
        state.init_result = init_result.as_ref().map(|_| ()).map_err(|e| e.to_string());

        init_result?;
        Ok(Self { config })
    }

    /// 当前句柄使用的配置
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// 执行实际的日志系统初始化
    fn perform_initialization(config: &LogConfig) -> anyhow::Result<()> {
        // log crate 到 tracing 的桥接
        Self::init_log_tracer()?;
        Self::init_tracing_subscriber(config)?;
        Ok(())
    }

    /// 初始化 LogTracer
    fn init_log_tracer() -> anyhow::Result<()> {
        use tracing_log::LogTracer;

        static LOG_TRACER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

        let result = LOG_TRACER_INIT.get_or_init(|| LogTracer::init().map_err(|e| e.to_string()));

        result
            .as_ref()
            .map_err(|e| anyhow::anyhow!("LogTracer初始化失败: {}", e))?;
        Ok(())
    }

    /// 初始化 tracing subscriber
    fn init_tracing_subscriber(config: &LogConfig) -> anyhow::Result<()> {
        let mut env_filter = EnvFilter::from_default_env()
            .add_directive(Self::convert_level_to_directive(config.level));

        for (module, level) in &config.module_levels {
            match format!("{}={}", module, Self::level_to_string(*level)).parse::<Directive>() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(e) => eprintln!("忽略无效的模块日志级别 {module}: {e}"),
            }
        }

        let file_path = config.file_path.as_ref().filter(|_| !config.console);

        let fmt_layer = if let Some(path) = file_path {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("打开日志文件失败: {}", e))?;
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true);
            if config.json_format {
                layer.json().boxed()
            } else {
                layer.boxed()
            }
        } else if config.json_format {
            fmt::layer()
                .json()
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_file(true)
                .with_line_number(true)
                .boxed()
        } else {
            fmt::layer()
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .boxed()
        };

        match registry().with(env_filter).with(fmt_layer).try_init() {
            Ok(()) => {
                tracing::info!("日志系统初始化完成");
                tracing::debug!("日志配置: {:?}", config);
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains(
                    "attempted to set a logger after the logging system was already initialized",
                ) || error_msg.contains("a global default trace dispatcher has already been set")
                {
                    tracing::debug!("日志系统已经初始化过了");
                    Ok(())
                } else {
                    Err(anyhow::anyhow!(
                        "tracing subscriber初始化失败: {}",
                        error_msg
                    ))
                }
            }
        }
    }

    /// 将 log::LevelFilter 转换为 tracing 的指令
    fn convert_level_to_directive(level: LevelFilter) -> Directive {
        use tracing_subscriber::filter::LevelFilter as TracingLevel;
        match level {
            LevelFilter::Off => Directive::from(TracingLevel::OFF),
            LevelFilter::Error => Directive::from(tracing::Level::ERROR),
            LevelFilter::Warn => Directive::from(tracing::Level::WARN),
            LevelFilter::Info => Directive::from(tracing::Level::INFO),
            LevelFilter::Debug => Directive::from(tracing::Level::DEBUG),
            LevelFilter::Trace => Directive::from(tracing::Level::TRACE),
        }
    }

    /// 将 log::LevelFilter 转换为字符串
    fn level_to_string(level: LevelFilter) -> &'static str {
        match level {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        }
    }

    /// 重置日志系统状态（主要用于测试）
    #[cfg(test)]
    pub fn reset_for_testing() {
        let mut state = lock_state();
        state.initialized = false;
        state.init_result = Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::BTreeMap;
    use tempfile::NamedTempFile;

    fn create_test_config() -> LogConfig {
        LogConfig {
            level: LevelFilter::Info,
            ..LogConfig::default()
        }
    }

    #[test]
    #[serial]
    fn test_logging_system_single_initialization() {
        LoggingSystem::reset_for_testing();

        let config = create_test_config();
        let system = LoggingSystem::setup_logging(config.clone()).unwrap();
        assert_eq!(system.config(), &config);
        assert!(lock_state().initialized);

        // 第二次调用不会重复安装 subscriber
        let json = LogConfig {
            json_format: true,
            ..config
        };
        let second = LoggingSystem::setup_logging(json.clone()).unwrap();
        assert_eq!(second.config(), &json);
    }

    #[test]
    #[serial]
    fn test_logging_system_with_file_output() {
        LoggingSystem::reset_for_testing();

        let temp_file = NamedTempFile::new().unwrap();
        let config = LogConfig {
            file_path: Some(temp_file.path().to_path_buf()),
            console: false,
            ..create_test_config()
        };

        assert!(LoggingSystem::setup_logging(config).is_ok());
    }

    #[test]
    fn test_from_settings() {
        let settings = LoggingConfig {
            level: "debug".to_string(),
            json_format: true,
            file_path: Some(PathBuf::from("/tmp/uptime.log")),
            module_levels: BTreeMap::from([
                ("reqwest".to_string(), "warn".to_string()),
                ("hyper".to_string(), "loud".to_string()),
            ]),
        };

        let config = LogConfig::from_settings(&settings, None);
        assert_eq!(config.level, LevelFilter::Debug);
        assert!(!config.console);
        assert!(config.json_format);
        // 无法识别的模块级别被忽略
        assert_eq!(
            config.module_levels,
            HashMap::from([("reqwest".to_string(), LevelFilter::Warn)])
        );

        let overridden = LogConfig::from_settings(&settings, Some(LevelFilter::Warn));
        assert_eq!(overridden.level, LevelFilter::Warn);

        let fallback = LogConfig::from_settings(
            &LoggingConfig {
                level: "loud".to_string(),
                ..LoggingConfig::default()
            },
            None,
        );
        assert_eq!(fallback.level, LevelFilter::Info);
        assert!(fallback.console);
    }
}

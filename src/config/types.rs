//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::health::scheduler::OverlapPolicy;
use crate::notification::template::AlertTemplate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 检测引擎配置
    #[serde(default)]
    pub engine: EngineConfig,
    /// 通知配置
    #[serde(default)]
    pub notification: NotificationConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 检测引擎配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// 检测周期间隔（秒）
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// 日志轮转间隔（秒）
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval_seconds: u64,
    /// 最大并发检测数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_probes: usize,
    /// 周期重叠策略
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
    /// 检测记录目录
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// 检测日志目录
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    /// 检测请求的 User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            rotation_interval_seconds: default_rotation_interval(),
            max_concurrent_probes: default_max_concurrent(),
            overlap_policy: OverlapPolicy::default(),
            data_dir: default_data_dir(),
            logs_dir: default_logs_dir(),
            user_agent: default_user_agent(),
        }
    }
}

impl EngineConfig {
    /// 检测周期间隔
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    /// 日志轮转间隔
    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_seconds)
    }
}

/// 通知方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// 只写入运行日志
    #[default]
    Log,
    /// Twilio 短信
    Twilio,
    /// 不发送
    None,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Log => write!(f, "log"),
            NotificationKind::Twilio => write!(f, "twilio"),
            NotificationKind::None => write!(f, "none"),
        }
    }
}

/// 通知配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NotificationConfig {
    /// 通知方式
    #[serde(default)]
    pub kind: NotificationKind,
    /// 告警消息模板（Handlebars）
    pub message_template: Option<String>,
    /// Twilio 账号配置
    pub twilio: Option<TwilioConfig>,
}

/// Twilio 账号配置
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct TwilioConfig {
    /// 账号SID
    pub account_sid: String,
    /// 认证令牌
    pub auth_token: String,
    /// 发送方号码
    pub from_phone: String,
    /// 接口地址
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
}

impl fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"***")
            .field("from_phone", &self.from_phone)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// 运行日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 是否使用JSON格式
    #[serde(default)]
    pub json_format: bool,
    /// 日志文件路径，未设置时输出到控制台
    pub file_path: Option<PathBuf>,
    /// 按模块覆盖的日志级别，例如 `reqwest = "warn"`
    #[serde(default)]
    pub module_levels: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
            module_levels: BTreeMap::new(),
        }
    }
}

// 默认值函数
fn default_check_interval() -> u64 {
    60
}
fn default_rotation_interval() -> u64 {
    24 * 60 * 60
}
fn default_max_concurrent() -> usize {
    50
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(".data")
}
fn default_logs_dir() -> PathBuf {
    PathBuf::from(".logs")
}
fn default_user_agent() -> String {
    format!("uptime-vitals/{}", env!("CARGO_PKG_VERSION"))
}
fn default_twilio_api_base() -> String {
    "https://api.twilio.com".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    let engine = &config.engine;
    if engine.check_interval_seconds == 0 {
        return Err("检测间隔不能为0".to_string());
    }

    if engine.rotation_interval_seconds == 0 {
        return Err("日志轮转间隔不能为0".to_string());
    }

    if engine.max_concurrent_probes == 0 {
        return Err("最大并发检测数不能为0".to_string());
    }

    if engine.data_dir.as_os_str().is_empty() || engine.logs_dir.as_os_str().is_empty() {
        return Err("数据目录和日志目录不能为空".to_string());
    }

    if engine.user_agent.trim().is_empty() {
        return Err("User-Agent不能为空".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.logging.level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.logging.level, valid_log_levels
        ));
    }

    for (module, level) in &config.logging.module_levels {
        if module.trim().is_empty() || !valid_log_levels.contains(&level.as_str()) {
            return Err(format!("无效的模块日志级别: {module} = {level}"));
        }
    }

    // 验证消息模板
    if let Some(ref template) = config.notification.message_template {
        AlertTemplate::new(template).map_err(|e| format!("消息模板无效: {e}"))?;
    }

    if config.notification.kind == NotificationKind::Twilio {
        let twilio = config
            .notification
            .twilio
            .as_ref()
            .ok_or_else(|| "通知方式为 twilio 时必须配置 [notification.twilio]".to_string())?;

        if twilio.account_sid.trim().is_empty()
            || twilio.auth_token.trim().is_empty()
            || twilio.from_phone.trim().is_empty()
        {
            return Err("Twilio 的 account_sid、auth_token 和 from_phone 不能为空".to_string());
        }

        if !twilio.api_base.starts_with("http://") && !twilio.api_base.starts_with("https://") {
            return Err(format!("Twilio 接口地址格式无效: {}", twilio.api_base));
        }
    }

    Ok(())
}

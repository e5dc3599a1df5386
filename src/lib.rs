//! Uptime Vitals - HTTP 可用性检测引擎
//!
//! 周期性地检测一组用户定义的 HTTP(S) 端点：
//! - 并发受限的检测周期，单个检测的失败互不影响
//! - 状态变化（up/down）时发送告警
//! - 每个检测一份追加写入的日志，按天压缩归档
//! - 结构化日志记录

pub mod check;
pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod logs;
pub mod notification;
pub mod store;

// 重新导出主要类型
pub use check::{validate_check, Check, CheckState};
pub use config::Config;
pub use error::UptimeVitalsError;
pub use health::{CheckCycle, HealthChecker, Outcome};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

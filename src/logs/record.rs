//! 检测日志记录

use crate::check::{Check, CheckState};
use crate::health::result::Outcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一次检测评估的完整记录，每行一条追加到检测日志中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// 评估前的检测快照
    pub check: Check,
    /// 检测结果
    pub outcome: Outcome,
    /// 评估得出的新状态
    pub state: CheckState,
    /// 是否触发告警
    pub alert: bool,
    /// 检测时间（毫秒时间戳）
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
}

impl LogRecord {
    /// 序列化为单行JSON
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// 从单行JSON解析，空行或无法解析时返回 `None`
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        serde_json::from_str(line).ok()
    }
}

//! 检测结果数据结构
//!
//! 定义单次检测的结果（响应码或错误二选一）以及结果评估产生的决策

use crate::check::CheckState;
use crate::error::ProbeError;
use serde::{Deserialize, Serialize};

/// 单次检测的结果，只在一个检测周期内存在
///
/// 响应码和错误恰好存在一个，由枚举结构保证
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "OutcomeRecord", try_from = "OutcomeRecord")]
pub enum Outcome {
    /// 收到响应
    Response { response_code: u16 },
    /// 传输错误或超时
    Failed(ProbeError),
}

impl Outcome {
    /// 收到响应的结果
    pub fn response(response_code: u16) -> Self {
        Outcome::Response { response_code }
    }

    /// 传输错误的结果
    pub fn transport(detail: impl Into<String>) -> Self {
        Outcome::Failed(ProbeError::Transport {
            detail: detail.into(),
        })
    }

    /// 超时的结果
    pub fn timeout() -> Self {
        Outcome::Failed(ProbeError::Timeout)
    }

    /// 响应码（如果有）
    pub fn response_code(&self) -> Option<u16> {
        match self {
            Outcome::Response { response_code } => Some(*response_code),
            Outcome::Failed(_) => None,
        }
    }

    /// 错误（如果有）
    pub fn error(&self) -> Option<&ProbeError> {
        match self {
            Outcome::Response { .. } => None,
            Outcome::Failed(error) => Some(error),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Response { response_code } => write!(f, "HTTP {response_code}"),
            Outcome::Failed(error) => write!(f, "{error}"),
        }
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Transport,
    Timeout,
}

/// 结果中错误部分的持久化形式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeErrorRecord {
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// 结果在日志中的持久化形式：`{"responseCode": .., "error": ..}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub response_code: Option<u16>,
    pub error: Option<OutcomeErrorRecord>,
}

impl From<Outcome> for OutcomeRecord {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Response { response_code } => Self {
                response_code: Some(response_code),
                error: None,
            },
            Outcome::Failed(ProbeError::Transport { detail }) => Self {
                response_code: None,
                error: Some(OutcomeErrorRecord {
                    kind: ErrorKind::Transport,
                    detail: Some(detail),
                }),
            },
            Outcome::Failed(ProbeError::Timeout) => Self {
                response_code: None,
                error: Some(OutcomeErrorRecord {
                    kind: ErrorKind::Timeout,
                    detail: None,
                }),
            },
        }
    }
}

impl TryFrom<OutcomeRecord> for Outcome {
    type Error = String;

    fn try_from(record: OutcomeRecord) -> Result<Self, Self::Error> {
        match (record.response_code, record.error) {
            (Some(response_code), None) => Ok(Outcome::Response { response_code }),
            (None, Some(error)) => Ok(match error.kind {
                ErrorKind::Timeout => Outcome::Failed(ProbeError::Timeout),
                ErrorKind::Transport => Outcome::Failed(ProbeError::Transport {
                    detail: error.detail.unwrap_or_default(),
                }),
            }),
            (Some(_), Some(_)) => Err("结果不能同时包含响应码和错误".to_string()),
            (None, None) => Err("结果必须包含响应码或错误".to_string()),
        }
    }
}

/// 结果评估产生的决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// 新状态
    pub new_state: CheckState,
    /// 是否需要告警
    pub alert_warranted: bool,
}

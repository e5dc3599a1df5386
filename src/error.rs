//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Uptime Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum UptimeVitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 检测记录校验错误
    #[error("检测记录校验错误: {0}")]
    Validation(#[from] ValidationError),

    /// 记录存储错误
    #[error("记录存储错误: {0}")]
    Store(#[from] StoreError),

    /// 检测日志存储错误
    #[error("检测日志错误: {0}")]
    LogStore(#[from] LogStoreError),

    /// 通知相关错误
    #[error("通知错误: {0}")]
    Notification(#[from] NotificationError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 检测记录校验错误，记录被跳过但不会从存储中删除
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// 记录不是JSON对象
    #[error("检测记录不是对象")]
    NotAnObject,

    /// 必填字段缺失
    #[error("缺少必填字段: {field}")]
    MissingField { field: &'static str },

    /// 字段类型或取值不合法
    #[error("字段 {field} 不合法: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// 检测执行错误，作为检测结果的一部分而不是流水线异常
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// 传输层错误（DNS、连接拒绝、TLS等）
    #[error("传输错误: {detail}")]
    Transport { detail: String },

    /// 超时
    #[error("请求超时")]
    Timeout,
}

/// 记录存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    /// 记录不存在
    #[error("记录不存在: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// 乐观并发检查失败，记录已被其他写入者更新
    #[error("记录已被并发更新: {id}")]
    Conflict { id: String },

    /// 存储IO错误
    #[error("存储IO失败: {0}")]
    Io(#[from] std::io::Error),

    /// 记录序列化错误
    #[error("记录序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 检测日志存储错误
#[derive(Error, Debug)]
pub enum LogStoreError {
    /// 归档文件已存在，拒绝覆盖
    #[error("归档文件已存在: {name}")]
    RotationConflict { name: String },

    /// 日志或归档不存在
    #[error("日志不存在: {name}")]
    NotFound { name: String },

    /// 日志IO错误
    #[error("日志IO失败: {0}")]
    Io(#[from] std::io::Error),

    /// 归档内容解码失败
    #[error("归档解码失败: {0}")]
    Decode(#[from] base64::DecodeError),

    /// 日志记录序列化失败
    #[error("日志记录序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 通知错误类型
#[derive(Error, Debug)]
pub enum NotificationError {
    /// 发送失败
    #[error("通知发送失败: {0}")]
    SendError(String),

    /// 模板渲染错误
    #[error("模板渲染失败: {0}")]
    TemplateError(String),

    /// 配置错误
    #[error("通知配置错误: {0}")]
    ConfigError(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, UptimeVitalsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err: UptimeVitalsError = ValidationError::MissingField {
            field: "successCodes",
        }
        .into();
        assert!(err.to_string().contains("successCodes"));

        let err: UptimeVitalsError = LogStoreError::RotationConflict {
            name: "abc-1.gz.b64".to_string(),
        }
        .into();
        assert!(err.to_string().contains("abc-1.gz.b64"));
    }

    #[test]
    fn test_probe_error_display() {
        assert_eq!(ProbeError::Timeout.to_string(), "请求超时");
        let err = ProbeError::Transport {
            detail: "Connection refused".to_string(),
        };
        assert!(err.to_string().contains("Connection refused"));
    }
}

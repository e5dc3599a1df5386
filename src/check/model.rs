//! 检测数据结构
//!
//! 定义被监控端点的检测记录及其协议、方法和状态枚举

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// 检测ID的固定长度
pub const CHECK_ID_LENGTH: usize = 20;

/// 所属用户引用（手机号）的固定长度
pub const OWNER_REF_LENGTH: usize = 10;

/// 检测协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// 明文HTTP
    Http,
    /// HTTPS
    Https,
}

impl Protocol {
    /// 协议字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// 从字符串解析，仅接受小写形式
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 检测使用的HTTP方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// 存储中的小写形式
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
        }
    }

    /// 从字符串解析，仅接受小写形式
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "delete" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    /// 转换为reqwest的请求方法
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// 检测状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    /// 端点可达且状态码符合预期
    Up,
    /// 端点不可达、超时或状态码不符合预期
    #[default]
    Down,
}

impl CheckState {
    /// 判断状态是否为正常
    pub fn is_up(&self) -> bool {
        matches!(self, CheckState::Up)
    }

    /// 从字符串解析
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "up" => Some(CheckState::Up),
            "down" => Some(CheckState::Down),
            _ => None,
        }
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckState::Up => write!(f, "up"),
            CheckState::Down => write!(f, "down"),
        }
    }
}

/// 被监控的端点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    /// 检测ID，创建后不可变
    pub id: String,
    /// 所属用户（手机号），同时作为告警目的地
    #[serde(rename = "userPhone")]
    pub owner_ref: String,
    /// 协议
    pub protocol: Protocol,
    /// 主机与路径，不含协议前缀
    pub url: String,
    /// 请求方法
    pub method: HttpMethod,
    /// 视为正常的状态码集合
    pub success_codes: Vec<u16>,
    /// 超时时间（秒，1-5）
    pub timeout_seconds: u8,
    /// 当前状态，仅由结果评估器修改
    #[serde(default)]
    pub state: CheckState,
    /// 最近一次完成检测的时间，首次检测前为空
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_checked: Option<DateTime<Utc>>,
    /// 存储记录中的其他字段，更新时原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Check {
    /// 请求超时时长
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_seconds) * 1000)
    }

    /// 带协议的完整地址
    pub fn full_url(&self) -> String {
        format!("{}://{}", self.protocol, self.url)
    }

    /// 状态码是否在成功集合内
    pub fn accepts(&self, response_code: u16) -> bool {
        self.success_codes.contains(&response_code)
    }

    /// 是否已经完成过至少一次检测
    pub fn has_been_checked(&self) -> bool {
        self.last_checked.is_some()
    }

    /// 生成带有新状态和检测时间的副本
    pub fn with_result(&self, state: CheckState, checked_at: DateTime<Utc>) -> Self {
        let mut updated = self.clone();
        updated.state = state;
        updated.last_checked = Some(checked_at);
        updated
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.id, self.method, self.full_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_check() -> Check {
        Check {
            id: "a".repeat(CHECK_ID_LENGTH),
            owner_ref: "5551234567".to_string(),
            protocol: Protocol::Https,
            url: "example.com/health".to_string(),
            method: HttpMethod::Get,
            success_codes: vec![200, 201],
            timeout_seconds: 3,
            state: CheckState::Down,
            last_checked: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_timeout_in_millis() {
        let check = sample_check();
        assert_eq!(check.timeout(), Duration::from_millis(3000));
    }

    #[test]
    fn test_full_url_and_display() {
        let check = sample_check();
        assert_eq!(check.full_url(), "https://example.com/health");
        assert!(check.to_string().ends_with("GET https://example.com/health"));
    }

    #[test]
    fn test_with_result_keeps_identity() {
        let check = sample_check();
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let updated = check.with_result(CheckState::Up, at);

        assert_eq!(updated.id, check.id);
        assert_eq!(updated.state, CheckState::Up);
        assert_eq!(updated.last_checked, Some(at));
        assert!(!check.has_been_checked());
        assert!(updated.has_been_checked());
    }

    #[test]
    fn test_serialization_uses_record_field_names() {
        let mut check = sample_check();
        check.last_checked = Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
        check
            .extra
            .insert("createdBy".to_string(), Value::String("api".to_string()));

        let value = serde_json::to_value(&check).unwrap();
        assert_eq!(value["userPhone"], "5551234567");
        assert_eq!(value["successCodes"], serde_json::json!([200, 201]));
        assert_eq!(value["timeoutSeconds"], 3);
        assert_eq!(value["lastChecked"], 1_700_000_000_000i64);
        assert_eq!(value["createdBy"], "api");
    }

    #[test]
    fn test_unchecked_record_omits_last_checked() {
        let value = serde_json::to_value(sample_check()).unwrap();
        assert!(value.get("lastChecked").is_none());
        assert_eq!(value["state"], "down");
    }
}

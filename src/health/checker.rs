//! HTTP检测执行器
//!
//! 对每个检测发出一次请求，并把响应、传输错误、超时三者之一转换为检测结果

use crate::check::Check;
use crate::error::Result;
use crate::health::result::Outcome;
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Instant;
use tokio::time::timeout;
use tracing::debug;

/// 检测执行器trait，定义检测接口
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// 执行一次检测
    ///
    /// # 参数
    /// * `check` - 已校验的检测
    ///
    /// # 返回
    /// * `Outcome` - 响应码或错误，恰好其一
    async fn probe(&self, check: &Check) -> Outcome;
}

/// HTTP检测执行器实现
pub struct HttpHealthChecker {
    /// HTTP客户端
    client: Client,
}

impl HttpHealthChecker {
    /// 创建新的HTTP检测执行器
    ///
    /// # 参数
    /// * `user_agent` - 请求使用的User-Agent
    ///
    /// # 返回
    /// * `Result<Self>` - 执行器实例
    pub fn new(user_agent: &str) -> Result<Self> {
        // 不跟随重定向，检测的是端点本身返回的状态码
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| anyhow::anyhow!("创建HTTP客户端失败: {e}"))?;

        Ok(Self { client })
    }

    /// 解析检测地址
    fn parse_url(check: &Check) -> std::result::Result<Url, String> {
        let url = Url::parse(&check.full_url()).map_err(|e| format!("Invalid URL: {e}"))?;
        if url.host_str().is_none() {
            return Err("Invalid URL: missing host".to_string());
        }
        Ok(url)
    }

    /// 格式化请求错误信息，使其更加清晰易读
    fn format_request_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            let error_str = format!("{error:?}");
            if error_str.contains("dns") || error_str.contains("failed to lookup") {
                "DNS resolution failed".to_string()
            } else if error_str.contains("certificate") || error_str.contains("tls") {
                "SSL/TLS certificate error".to_string()
            } else {
                "Connection refused".to_string()
            }
        } else if error.is_request() {
            "Invalid request".to_string()
        } else if error.is_body() || error.is_decode() {
            "Response decode error".to_string()
        } else {
            format!("Request failed: {error}")
        }
    }
}

#[async_trait]
impl HealthChecker for HttpHealthChecker {
    async fn probe(&self, check: &Check) -> Outcome {
        let url = match Self::parse_url(check) {
            Ok(url) => url,
            Err(detail) => return Outcome::transport(detail),
        };

        let request = self.client.request(check.method.to_reqwest(), url);
        let start_time = Instant::now();

        // timeout 只会完成一次：先到达的事件决定结果，落败的请求 future 被丢弃并关闭连接
        let outcome = match timeout(check.timeout(), request.send()).await {
            Ok(Ok(response)) => Outcome::response(response.status().as_u16()),
            Ok(Err(e)) => Outcome::transport(Self::format_request_error(&e)),
            Err(_) => Outcome::timeout(),
        };

        debug!(
            "检测完成: {} -> {} ({}ms)",
            check,
            outcome,
            start_time.elapsed().as_millis()
        );
        outcome
    }
}

//! 通知发送器模块
//!
//! 定义通知发送的trait和基础实现

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// 通知发送器trait
///
/// 发送即忘：调用方只关心是否成功提交，不消费送达确认
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 发送消息
    ///
    /// # 参数
    /// * `destination` - 接收方（例如手机号）
    /// * `message` - 消息内容
    ///
    /// # 返回
    /// * `Result<()>` - 发送结果
    async fn send(&self, destination: &str, message: &str) -> Result<()>;

    /// 发送器名称，用于日志
    fn name(&self) -> &'static str;
}

/// 空的通知发送器实现（用于禁用通知）
pub struct NoOpSender;

#[async_trait]
impl NotificationSender for NoOpSender {
    async fn send(&self, _destination: &str, _message: &str) -> Result<()> {
        // 不执行任何操作
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// 只把告警写入运行日志的发送器
pub struct LogOnlySender;

#[async_trait]
impl NotificationSender for LogOnlySender {
    async fn send(&self, destination: &str, message: &str) -> Result<()> {
        info!(destination = %destination, "ALERT: {}", message);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

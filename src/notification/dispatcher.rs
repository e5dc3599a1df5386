//! 告警分发器
//!
//! 把状态变化后的检测格式化为告警消息并交给通知发送器。发送失败只记录日志，
//! 不重试，也不回滚已经持久化的状态。

use crate::check::Check;
use crate::notification::sender::NotificationSender;
use crate::notification::template::AlertTemplate;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// 分发统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// 发送成功次数
    pub sent: u64,
    /// 发送失败次数（含模板渲染失败）
    pub failed: u64,
}

/// 告警分发器
pub struct AlertDispatcher {
    /// 通知发送器
    sender: Arc<dyn NotificationSender>,
    /// 消息模板
    template: AlertTemplate,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl AlertDispatcher {
    /// 创建告警分发器
    pub fn new(sender: Arc<dyn NotificationSender>, template: AlertTemplate) -> Self {
        Self {
            sender,
            template,
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// 发送状态变化告警，尽力而为
    ///
    /// # 参数
    /// * `check` - 已更新为新状态的检测
    pub async fn dispatch(&self, check: &Check) {
        let message = match self.template.render(check) {
            Ok(message) => message,
            Err(e) => {
                error!("渲染告警消息失败: {} - {}", check.id, e);
                self.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        match self.sender.send(&check.owner_ref, &message).await {
            Ok(()) => {
                info!("告警已发送({}): {}", self.sender.name(), message);
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!("发送状态变化告警失败: {} - {}", check.id, e);
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// 分发统计
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{CheckState, HttpMethod, Protocol};
    use crate::notification::template::default_alert_template;
    use async_trait::async_trait;
    use serde_json::Map;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        messages: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSender for RecordingSender {
        async fn send(&self, destination: &str, message: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("gateway unavailable");
            }
            self.messages
                .lock()
                .await
                .push((destination.to_string(), message.to_string()));
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn down_check() -> Check {
        Check {
            id: "abcdefghij0123456789".to_string(),
            owner_ref: "5551234567".to_string(),
            protocol: Protocol::Http,
            url: "example.com/status".to_string(),
            method: HttpMethod::Get,
            success_codes: vec![200],
            timeout_seconds: 1,
            state: CheckState::Down,
            last_checked: None,
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_sends_to_owner() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = AlertDispatcher::new(
            sender.clone(),
            AlertTemplate::new(default_alert_template()).unwrap(),
        );

        dispatcher.dispatch(&down_check()).await;

        let messages = sender.messages.lock().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "5551234567");
        assert_eq!(
            messages[0].1,
            "Alert: Your check for GET - http://example.com/status is currently down"
        );
        assert_eq!(dispatcher.stats(), DispatchStats { sent: 1, failed: 0 });
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_swallowed() {
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..Default::default()
        });
        let dispatcher = AlertDispatcher::new(
            sender,
            AlertTemplate::new(default_alert_template()).unwrap(),
        );

        dispatcher.dispatch(&down_check()).await;
        assert_eq!(dispatcher.stats(), DispatchStats { sent: 0, failed: 1 });
    }
}

//! Twilio 短信发送器模块
//!
//! 通过 Twilio REST 接口发送状态变化短信

use crate::config::types::TwilioConfig;
use crate::error::NotificationError;
use crate::notification::sender::NotificationSender;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info};

/// 短信正文最大长度
pub const MAX_SMS_LENGTH: usize = 1600;

/// 手机号长度（不含国家码）
const PHONE_LENGTH: usize = 10;

/// Twilio 短信发送器
pub struct TwilioSender {
    /// HTTP客户端
    client: Client,
    /// 账号配置
    config: TwilioConfig,
}

impl TwilioSender {
    /// 创建新的 Twilio 发送器
    ///
    /// # 参数
    /// * `config` - Twilio 账号配置
    ///
    /// # 返回
    /// * `Result<Self>` - 发送器实例
    pub fn new(config: TwilioConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("创建HTTP客户端失败")?;

        Ok(Self { client, config })
    }

    /// 消息接口地址
    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    /// 校验接收方和消息内容
    fn validate(destination: &str, message: &str) -> Result<(String, String)> {
        let phone = destination.trim();
        if phone.chars().count() != PHONE_LENGTH || !phone.chars().all(|c| c.is_ascii_digit()) {
            anyhow::bail!("无效的手机号: {}", destination);
        }

        let body = message.trim();
        if body.is_empty() || body.chars().count() > MAX_SMS_LENGTH {
            anyhow::bail!("短信内容长度必须在 1 到 {} 之间", MAX_SMS_LENGTH);
        }

        Ok((format!("+1{phone}"), body.to_string()))
    }
}

#[async_trait]
impl NotificationSender for TwilioSender {
    async fn send(&self, destination: &str, message: &str) -> Result<()> {
        let (to, body) = Self::validate(destination, message)?;
        debug!("发送短信到: {}", to);

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("From", self.config.from_phone.as_str()),
                ("To", to.as_str()),
                ("Body", body.as_str()),
            ])
            .send()
            .await
            .context("发送短信请求失败")?;

        let status = response.status();
        if status.is_success() {
            info!("短信发送成功: {}", to);
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            error!("短信发送失败: {} - {}", status, text);
            Err(NotificationError::SendError(format!("{status} {text}")).into())
        }
    }

    fn name(&self) -> &'static str {
        "twilio"
    }
}

//! 消息模板模块
//!
//! 使用 Handlebars 渲染状态变化告警消息

use crate::check::Check;
use crate::error::NotificationError;
use handlebars::Handlebars;
use serde::Serialize;

const TEMPLATE_NAME: &str = "alert";

/// 模板上下文数据
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    /// 检测ID
    pub id: String,
    /// 请求方法（大写）
    pub method: String,
    /// 协议
    pub protocol: String,
    /// 主机与路径
    pub url: String,
    /// 新状态
    pub state: String,
    /// 告警接收方
    pub destination: String,
}

impl From<&Check> for TemplateContext {
    fn from(check: &Check) -> Self {
        Self {
            id: check.id.clone(),
            method: check.method.to_string(),
            protocol: check.protocol.to_string(),
            url: check.url.clone(),
            state: check.state.to_string(),
            destination: check.owner_ref.clone(),
        }
    }
}

/// 告警消息模板
pub struct AlertTemplate {
    registry: Handlebars<'static>,
}

impl AlertTemplate {
    /// 创建模板并检查语法
    ///
    /// # 参数
    /// * `template` - Handlebars 模板字符串
    ///
    /// # 返回
    /// * `Result<Self, NotificationError>` - 模板实例
    pub fn new(template: &str) -> Result<Self, NotificationError> {
        let mut registry = Handlebars::new();
        // 短信是纯文本，不做HTML转义
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(true);
        registry
            .register_template_string(TEMPLATE_NAME, template)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))?;
        Ok(Self { registry })
    }

    /// 渲染告警消息
    pub fn render(&self, check: &Check) -> Result<String, NotificationError> {
        self.registry
            .render(TEMPLATE_NAME, &TemplateContext::from(check))
            .map_err(|e| NotificationError::TemplateError(e.to_string()))
    }
}

/// 默认的告警消息模板
pub fn default_alert_template() -> &'static str {
    "Alert: Your check for {{method}} - {{protocol}}://{{url}} is currently {{state}}"
}

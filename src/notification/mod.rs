//! 通知模块
//!
//! 提供告警消息模板、告警分发器以及短信等通知发送器

pub mod dispatcher;
pub mod sender;
pub mod template;
pub mod twilio;

// 重新导出主要类型
pub use dispatcher::AlertDispatcher;
pub use sender::{LogOnlySender, NoOpSender, NotificationSender};
pub use template::AlertTemplate;
pub use twilio::TwilioSender;

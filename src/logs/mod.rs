//! 检测日志模块
//!
//! 每个检测一份追加写入的日志文件，定期压缩归档

pub mod archive;
pub mod record;
pub mod store;

pub use record::LogRecord;
pub use store::{LogStore, RotationReport, ARCHIVE_SUFFIX, LOG_SUFFIX};

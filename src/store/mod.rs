//! 记录存储模块
//!
//! 定义检测记录存储的接口，并提供基于文件和内存的实现

pub mod file;
pub mod memory;

use crate::check::validation::parse_last_checked;
use crate::check::Check;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

// 重新导出主要类型
pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;

/// 检测记录所在的集合名
pub const CHECKS_COLLECTION: &str = "checks";

/// 存储层结果类型
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// 检测记录存储trait
///
/// `read` 返回原始JSON，由调用方负责校验；`update` 带有乐观并发检查，
/// 只有当存储中的 `lastChecked` 仍等于 `expected_last_checked` 时才写入。
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 列出所有检测ID
    async fn list(&self) -> StoreResult<Vec<String>>;

    /// 读取单条原始记录
    ///
    /// # 返回
    /// * `StoreResult<Value>` - 原始记录，不存在时返回 `StoreError::NotFound`
    async fn read(&self, id: &str) -> StoreResult<Value>;

    /// 更新检测记录
    ///
    /// # 参数
    /// * `id` - 检测ID
    /// * `check` - 新的检测数据
    /// * `expected_last_checked` - 读取时看到的 `lastChecked`
    ///
    /// # 返回
    /// * `StoreResult<()>` - 并发更新时返回 `StoreError::Conflict`
    async fn update(
        &self,
        id: &str,
        check: &Check,
        expected_last_checked: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;
}

/// 判断存储中的记录是否仍然是评估开始时看到的版本
///
/// 与校验使用同一解析规则，校验视为未设置的值在这里同样视为未设置
pub(crate) fn is_unchanged(record: &Value, expected: Option<DateTime<Utc>>) -> bool {
    let stored = record.get("lastChecked").and_then(parse_last_checked);
    stored.map(|at| at.timestamp_millis()) == expected.map(|at| at.timestamp_millis())
}

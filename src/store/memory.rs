//! 内存记录存储，用于测试和嵌入式使用

use crate::check::Check;
use crate::error::StoreError;
use crate::store::{is_unchanged, RecordStore, StoreResult, CHECKS_COLLECTION};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

/// 内存记录存储
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<String, Value>>,
    /// 读取时模拟失败的ID
    failing_reads: RwLock<HashSet<String>>,
    /// 更新时模拟失败的ID
    failing_updates: RwLock<HashSet<String>>,
}

impl MemoryRecordStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入或覆盖一条原始记录
    pub async fn insert(&self, id: impl Into<String>, record: Value) {
        self.records.write().await.insert(id.into(), record);
    }

    /// 获取原始记录快照
    pub async fn get(&self, id: &str) -> Option<Value> {
        self.records.read().await.get(id).cloned()
    }

    /// 让指定ID的读取返回IO错误
    pub async fn fail_reads_for(&self, id: impl Into<String>) {
        self.failing_reads.write().await.insert(id.into());
    }

    /// 让指定ID的更新返回IO错误
    pub async fn fail_updates_for(&self, id: impl Into<String>) {
        self.failing_updates.write().await.insert(id.into());
    }

    fn simulated_failure(id: &str) -> StoreError {
        StoreError::Io(std::io::Error::other(format!("模拟存储故障: {id}")))
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list(&self) -> StoreResult<Vec<String>> {
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn read(&self, id: &str) -> StoreResult<Value> {
        if self.failing_reads.read().await.contains(id) {
            return Err(Self::simulated_failure(id));
        }
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                collection: CHECKS_COLLECTION.to_string(),
                id: id.to_string(),
            })
    }

    async fn update(
        &self,
        id: &str,
        check: &Check,
        expected_last_checked: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        if self.failing_updates.read().await.contains(id) {
            return Err(Self::simulated_failure(id));
        }

        let mut records = self.records.write().await;
        let current = records.get(id).ok_or_else(|| StoreError::NotFound {
            collection: CHECKS_COLLECTION.to_string(),
            id: id.to_string(),
        })?;
        if !is_unchanged(current, expected_last_checked) {
            return Err(StoreError::Conflict { id: id.to_string() });
        }

        records.insert(id.to_string(), serde_json::to_value(check)?);
        Ok(())
    }
}

//! 基于文件的记录存储
//!
//! 每条记录保存为 `<base_dir>/<collection>/<id>.json`

use crate::check::Check;
use crate::error::StoreError;
use crate::store::{is_unchanged, RecordStore, StoreResult, CHECKS_COLLECTION};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// 文件记录存储
pub struct FileRecordStore {
    /// 集合目录
    dir: PathBuf,
    /// 串行化读-比较-写，避免同一进程内的并发更新互相覆盖
    write_lock: Mutex<()>,
}

impl FileRecordStore {
    /// 创建检测集合的文件存储
    ///
    /// # 参数
    /// * `base_dir` - 数据根目录
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: base_dir.as_ref().join(CHECKS_COLLECTION),
            write_lock: Mutex::new(()),
        }
    }

    /// 集合目录
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// 新建记录，已存在时失败（供CLI和测试写入初始数据）
    pub async fn create(&self, id: &str, record: &Value) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_vec_pretty(record)?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.record_path(id))
            .await?;
        file.write_all(&content).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_raw(&self, id: &str) -> StoreResult<Value> {
        match tokio::fs::read(self.record_path(id)).await {
            Ok(content) => Ok(serde_json::from_slice(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                collection: CHECKS_COLLECTION.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn list(&self) -> StoreResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            if let Some(id) = file_name.to_string_lossy().strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn read(&self, id: &str) -> StoreResult<Value> {
        self.read_raw(id).await
    }

    async fn update(
        &self,
        id: &str,
        check: &Check,
        expected_last_checked: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        // 只更新已存在的记录
        let current = self.read_raw(id).await?;
        if !is_unchanged(&current, expected_last_checked) {
            return Err(StoreError::Conflict { id: id.to_string() });
        }

        // 先写临时文件再重命名，中途失败时原记录保持完整
        let content = serde_json::to_vec_pretty(check)?;
        let tmp_path = self.dir.join(format!("{id}.json.tmp"));
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, self.record_path(id)).await?;
        debug!("已更新检测记录: {}", id);
        Ok(())
    }
}

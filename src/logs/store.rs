//! 检测日志存储
//!
//! 每个检测一个追加写入的 `<id>.log` 文件；轮转时把日志内容压缩为
//! 只写一次的 `<id>-<时间戳>.gz.b64` 归档，归档写入成功后才清空源日志。

use crate::error::LogStoreError;
use crate::logs::archive;
use crate::logs::record::LogRecord;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// 活动日志文件后缀
pub const LOG_SUFFIX: &str = ".log";

/// 归档文件后缀
pub const ARCHIVE_SUFFIX: &str = ".gz.b64";

/// 日志存储结果类型
pub type LogResult<T> = std::result::Result<T, LogStoreError>;

/// 单次轮转的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationReport {
    /// 成功轮转的日志及其归档ID
    pub archived: Vec<(String, String)>,
    /// 因归档名冲突而中止的日志
    pub conflicts: Vec<String>,
    /// 其他失败的日志及原因
    pub failures: Vec<(String, String)>,
}

impl RotationReport {
    /// 是否全部成功
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.failures.is_empty()
    }
}

/// 检测日志存储
pub struct LogStore {
    /// 日志目录
    base_dir: PathBuf,
    /// 上一次分配的归档时间戳，保证同一进程内归档名严格递增
    last_stamp: AtomicI64,
    /// 追加与“读取-归档-清空”互斥，轮转期间的追加不会被清空丢失
    io_lock: Mutex<()>,
}

impl LogStore {
    /// 创建日志存储
    ///
    /// # 参数
    /// * `base_dir` - 日志目录，首次写入时自动创建
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            last_stamp: AtomicI64::new(0),
            io_lock: Mutex::new(()),
        }
    }

    /// 日志目录
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn log_path(&self, log_id: &str) -> PathBuf {
        self.base_dir.join(format!("{log_id}{LOG_SUFFIX}"))
    }

    fn archive_path(&self, archive_id: &str) -> PathBuf {
        self.base_dir.join(format!("{archive_id}{ARCHIVE_SUFFIX}"))
    }

    /// 追加一条检测日志
    ///
    /// # 参数
    /// * `check_id` - 检测ID，即日志文件名
    /// * `record` - 日志记录
    pub async fn append(&self, check_id: &str, record: &LogRecord) -> LogResult<()> {
        let line = record.to_line()?;
        self.append_line(check_id, &line).await
    }

    /// 追加一行文本，每次调用独立完成打开、写入、关闭
    pub async fn append_line(&self, log_id: &str, line: &str) -> LogResult<()> {
        let _guard = self.io_lock.lock().await;
        tokio::fs::create_dir_all(&self.base_dir).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(log_id))
            .await?;

        let mut buffer = String::with_capacity(line.len() + 1);
        buffer.push_str(line);
        buffer.push('\n');
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// 列出日志ID
    ///
    /// # 参数
    /// * `include_archived` - 是否包含已压缩的归档
    pub async fn list(&self, include_archived: bool) -> LogResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(id) = name.strip_suffix(LOG_SUFFIX) {
                ids.push(id.to_string());
            } else if let Some(id) = name.strip_suffix(ARCHIVE_SUFFIX) {
                if include_archived {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// 轮转所有活动日志，单个日志失败不影响其他日志
    pub async fn rotate(&self) -> RotationReport {
        let mut report = RotationReport::default();

        let logs = match self.list(false).await {
            Ok(logs) => logs,
            Err(e) => {
                error!("列出待轮转日志失败: {}", e);
                report.failures.push((String::new(), e.to_string()));
                return report;
            }
        };

        if logs.is_empty() {
            debug!("没有需要轮转的日志");
            return report;
        }

        for log_id in logs {
            let archive_id = format!("{}-{}", log_id, self.next_archive_stamp());
            match self.rotate_log_to(&log_id, &archive_id).await {
                Ok(()) => {
                    debug!("日志已轮转: {} -> {}", log_id, archive_id);
                    report.archived.push((log_id, archive_id));
                }
                Err(LogStoreError::RotationConflict { name }) => {
                    warn!("归档文件已存在，跳过轮转: {} ({})", log_id, name);
                    report.conflicts.push(log_id);
                }
                Err(e) => {
                    error!("日志轮转失败: {} - {}", log_id, e);
                    report.failures.push((log_id, e.to_string()));
                }
            }
        }

        info!(
            "日志轮转完成: 成功 {}, 冲突 {}, 失败 {}",
            report.archived.len(),
            report.conflicts.len(),
            report.failures.len()
        );
        report
    }

    /// 将一个日志轮转到指定归档名
    ///
    /// 归档已存在时返回 `RotationConflict`，源日志保持不变；
    /// 只有归档完整写入后才会清空源日志。
    pub async fn rotate_log_to(&self, log_id: &str, archive_id: &str) -> LogResult<()> {
        let _guard = self.io_lock.lock().await;

        let content = match tokio::fs::read(self.log_path(log_id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LogStoreError::NotFound {
                    name: log_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let encoded = tokio::task::spawn_blocking(move || archive::encode(&content))
            .await
            .map_err(std::io::Error::other)??;

        self.write_archive(archive_id, encoded.as_bytes()).await?;

        tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.log_path(log_id))
            .await?;
        Ok(())
    }

    /// 以只创建语义写入归档，绝不覆盖已有文件
    async fn write_archive(&self, archive_id: &str, content: &[u8]) -> LogResult<()> {
        let path = self.archive_path(archive_id);
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(LogStoreError::RotationConflict {
                    name: format!("{archive_id}{ARCHIVE_SUFFIX}"),
                })
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = Self::write_and_sync(&mut file, content).await {
            // 不完整的归档不能留下
            drop(file);
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                warn!("清理不完整归档失败: {} - {}", path.display(), remove_err);
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn write_and_sync(file: &mut tokio::fs::File, content: &[u8]) -> std::io::Result<()> {
        file.write_all(content).await?;
        file.flush().await?;
        file.sync_all().await
    }

    /// 解压归档，返回轮转前的原始字节
    pub async fn decompress(&self, archive_id: &str) -> LogResult<Vec<u8>> {
        let encoded = match tokio::fs::read_to_string(self.archive_path(archive_id)).await {
            Ok(encoded) => encoded,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LogStoreError::NotFound {
                    name: archive_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        tokio::task::spawn_blocking(move || archive::decode(&encoded))
            .await
            .map_err(std::io::Error::other)?
    }

    /// 读取活动日志中的记录
    pub async fn read_log(&self, log_id: &str) -> LogResult<Vec<LogRecord>> {
        let content = match tokio::fs::read(self.log_path(log_id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LogStoreError::NotFound {
                    name: log_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(parse_records(&content))
    }

    /// 读取归档中的记录
    pub async fn read_archive(&self, archive_id: &str) -> LogResult<Vec<LogRecord>> {
        let content = self.decompress(archive_id).await?;
        Ok(parse_records(&content))
    }

    /// 分配下一个归档时间戳（毫秒），同一毫秒内的多次轮转依次加一
    fn next_archive_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let (Ok(previous) | Err(previous)) =
            self.last_stamp
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                    Some(now.max(last + 1))
                });
        now.max(previous + 1)
    }
}

fn parse_records(content: &[u8]) -> Vec<LogRecord> {
    String::from_utf8_lossy(content)
        .lines()
        .filter_map(LogRecord::from_line)
        .collect()
}

//! 检测周期编排
//!
//! 一个周期：列出所有检测ID -> 逐个读取并校验 -> 在信号量限制下并发执行
//! 检测和结果处理。单个检测的失败不会影响其它检测。

use crate::check::{validate_check, Check};
use crate::error::ValidationError;
use crate::health::checker::HealthChecker;
use crate::health::evaluator::{EvaluationReport, OutcomeProcessor};
use crate::store::RecordStore;
use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// 一次检测周期的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// 列出的检测数量
    pub listed: usize,
    /// 校验失败被跳过的数量
    pub invalid: usize,
    /// 读取失败被跳过的数量
    pub read_failures: usize,
    /// 实际执行检测的数量
    pub probed: usize,
    /// 新状态为 up 的数量
    pub up: usize,
    /// 新状态为 down 的数量
    pub down: usize,
    /// 已分发的告警数量
    pub alerts: usize,
    /// 持久化失败的数量
    pub persist_failures: usize,
    /// 列出检测ID是否失败
    pub list_failed: bool,
}

impl CycleReport {
    fn record(&mut self, report: &EvaluationReport) {
        self.probed += 1;
        if report.decision.new_state.is_up() {
            self.up += 1;
        } else {
            self.down += 1;
        }
        if report.alert_dispatched {
            self.alerts += 1;
        }
        if !report.persisted {
            self.persist_failures += 1;
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listed={} invalid={} read_failures={} probed={} up={} down={} alerts={} persist_failures={}",
            self.listed,
            self.invalid,
            self.read_failures,
            self.probed,
            self.up,
            self.down,
            self.alerts,
            self.persist_failures
        )
    }
}

/// 检测周期编排器
pub struct CheckCycle {
    /// 记录存储
    store: Arc<dyn RecordStore>,
    /// 检测执行器
    checker: Arc<dyn HealthChecker>,
    /// 结果处理器
    processor: Arc<OutcomeProcessor>,
    /// 并发检测上限
    semaphore: Arc<Semaphore>,
}

impl CheckCycle {
    /// 创建检测周期编排器
    ///
    /// # 参数
    /// * `store` - 记录存储
    /// * `checker` - 检测执行器
    /// * `processor` - 结果处理器
    /// * `max_concurrent_probes` - 同时进行的检测数上限
    pub fn new(
        store: Arc<dyn RecordStore>,
        checker: Arc<dyn HealthChecker>,
        processor: Arc<OutcomeProcessor>,
        max_concurrent_probes: usize,
    ) -> Self {
        Self {
            store,
            checker,
            processor,
            semaphore: Arc::new(Semaphore::new(max_concurrent_probes.max(1))),
        }
    }

    /// 加载并校验所有检测
    ///
    /// 返回通过校验的检测，同时在报告中累计无效和读取失败的数量
    pub async fn load_checks(&self, report: &mut CycleReport) -> Vec<Check> {
        let ids = match self.store.list().await {
            Ok(ids) => ids,
            Err(e) => {
                error!("列出检测失败，结束本周期: {}", e);
                report.list_failed = true;
                return Vec::new();
            }
        };
        report.listed = ids.len();

        let mut checks = Vec::with_capacity(ids.len());
        for id in ids {
            let raw = match self.store.read(&id).await {
                Ok(raw) => raw,
                Err(e) => {
                    error!("读取检测失败: {} - {}", id, e);
                    report.read_failures += 1;
                    continue;
                }
            };

            let validated = validate_check(&raw).and_then(|check| {
                // 记录内的ID必须与存储键一致，否则后续写入会落到别的检测上
                if check.id == id {
                    Ok(check)
                } else {
                    Err(ValidationError::InvalidField {
                        field: "id",
                        reason: format!("与存储键 {id} 不一致"),
                    })
                }
            });

            match validated {
                Ok(check) => checks.push(check),
                Err(e) => {
                    warn!("检测记录无效，已跳过: {} - {}", id, e);
                    report.invalid += 1;
                }
            }
        }

        checks
    }

    /// 执行一个完整的检测周期
    pub async fn run(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let checks = self.load_checks(&mut report).await;
        debug!("本周期待检测数量: {}", checks.len());

        let results = join_all(checks.iter().map(|check| self.probe_and_process(check))).await;
        for result in results.iter().flatten() {
            report.record(result);
        }

        info!("检测周期完成: {}", report);
        report
    }

    /// 检测单个目标并处理结果
    async fn probe_and_process(&self, check: &Check) -> Option<EvaluationReport> {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!("获取并发许可失败，跳过本次检测: {}", check.id);
                return None;
            }
        };

        debug!("开始检测: {}", check);
        let outcome = self.checker.probe(check).await;
        debug!("检测结果: {} - {}", check.id, outcome);

        Some(self.processor.process(check, outcome).await)
    }
}

//! 健康检测模块
//!
//! 提供HTTP检测执行、结果评估、检测周期编排和任务调度功能

pub mod checker;
pub mod cycle;
pub mod evaluator;
pub mod result;
pub mod scheduler;

// 重新导出主要类型
pub use checker::{HealthChecker, HttpHealthChecker};
pub use cycle::{CheckCycle, CycleReport};
pub use evaluator::{evaluate, EvaluationReport, OutcomeProcessor};
pub use result::{Decision, Outcome};
pub use scheduler::{OverlapPolicy, PeriodicJob, RunGate, Scheduler, SchedulerStatus, TaskScheduler};

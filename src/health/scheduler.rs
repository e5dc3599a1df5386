//! 任务调度器模块
//!
//! 两个独立的周期触发器：检测周期和日志轮转。触发器在启动时立即触发一次，
//! 之后按各自的间隔触发，且从不等待上一次运行结束。每个周期任务由一个
//! `RunGate` 状态机保护，决定运行中到来的触发是跳过还是排队一次。

use crate::health::cycle::CheckCycle;
use crate::logs::LogStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// 运行中再次触发时的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// 跳过本次触发
    #[default]
    Skip,
    /// 记录一次待运行，当前运行结束后立即再运行一次
    QueueOne,
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlapPolicy::Skip => write!(f, "skip"),
            OverlapPolicy::QueueOne => write!(f, "queue_one"),
        }
    }
}

/// 运行门状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GateState {
    /// 空闲
    Idle = 0,
    /// 运行中
    Running = 1,
    /// 运行中，且有一次排队的运行
    RunningWithPending = 2,
}

impl GateState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => GateState::Running,
            2 => GateState::RunningWithPending,
            _ => GateState::Idle,
        }
    }
}

/// 触发请求的准入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// 可以开始运行
    Start,
    /// 已在运行，本次触发被丢弃
    Skipped,
    /// 已在运行，本次触发记为一次待运行
    Queued,
}

/// 周期任务的运行门
///
/// 状态转换只通过 CAS 完成：
/// `Idle -> Running`（开始），`Running -> RunningWithPending`（排队），
/// `RunningWithPending -> Running`（结束后继续），`Running -> Idle`（结束）。
#[derive(Debug)]
pub struct RunGate {
    state: AtomicU8,
    policy: OverlapPolicy,
}

impl RunGate {
    /// 创建空闲的运行门
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            state: AtomicU8::new(GateState::Idle as u8),
            policy,
        }
    }

    /// 当前状态
    pub fn state(&self) -> GateState {
        GateState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// 处理一次触发
    pub fn try_enter(&self) -> Admission {
        if self.transition(GateState::Idle, GateState::Running) {
            return Admission::Start;
        }

        match self.policy {
            OverlapPolicy::Skip => Admission::Skipped,
            OverlapPolicy::QueueOne => {
                if self.transition(GateState::Running, GateState::RunningWithPending) {
                    Admission::Queued
                } else {
                    // 已有一次待运行，多余的触发合并掉
                    Admission::Skipped
                }
            }
        }
    }

    /// 结束一次运行
    ///
    /// # 返回
    /// * `bool` - 为 true 时调用方应立即再运行一次（门保持 Running）
    pub fn finish(&self) -> bool {
        loop {
            if self.transition(GateState::RunningWithPending, GateState::Running) {
                return true;
            }
            if self.transition(GateState::Running, GateState::Idle) {
                return false;
            }
            if self.state() == GateState::Idle {
                return false;
            }
        }
    }

    fn transition(&self, from: GateState, to: GateState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// 可被调度的周期任务
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    /// 任务名称，用于日志和状态
    fn name(&self) -> &'static str;

    /// 执行一次
    async fn execute(&self);
}

#[async_trait]
impl PeriodicJob for CheckCycle {
    fn name(&self) -> &'static str {
        "check-cycle"
    }

    async fn execute(&self) {
        self.run().await;
    }
}

#[async_trait]
impl PeriodicJob for LogStore {
    fn name(&self) -> &'static str {
        "log-rotation"
    }

    async fn execute(&self) {
        let report = self.rotate().await;
        if report.is_clean() {
            info!("日志轮转完成，归档数量: {}", report.archived.len());
        } else {
            warn!(
                "日志轮转完成，归档: {}，冲突: {}，失败: {}",
                report.archived.len(),
                report.conflicts.len(),
                report.failures.len()
            );
        }
    }
}

/// 单个周期任务的状态
#[derive(Debug, Clone)]
pub struct RoutineStatus {
    /// 任务名称
    pub name: &'static str,
    /// 触发间隔
    pub interval: Duration,
    /// 当前运行门状态
    pub state: GateState,
    /// 已开始的运行次数
    pub runs_started: u64,
    /// 已完成的运行次数
    pub runs_completed: u64,
    /// 被跳过的触发次数
    pub skipped_ticks: u64,
    /// 被排队的触发次数
    pub queued_ticks: u64,
    /// 最近一次开始时间
    pub last_started: Option<DateTime<Utc>>,
    /// 最近一次完成时间
    pub last_finished: Option<DateTime<Utc>>,
}

/// 调度器状态
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    /// 调度器是否运行中
    pub is_running: bool,
    /// 重叠策略
    pub overlap_policy: OverlapPolicy,
    /// 各周期任务状态
    pub routines: Vec<RoutineStatus>,
}

/// 任务调度器trait，定义调度接口
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// 启动调度器
    ///
    /// # 返回
    /// * `Result<()>` - 启动结果
    async fn start(&self) -> Result<()>;

    /// 停止调度器
    ///
    /// # 返回
    /// * `Result<()>` - 停止结果
    async fn stop(&self) -> Result<()>;

    /// 获取调度器状态
    ///
    /// # 返回
    /// * `SchedulerStatus` - 当前状态
    async fn get_status(&self) -> SchedulerStatus;
}

#[derive(Debug, Default, Clone)]
struct RoutineCounters {
    runs_started: u64,
    runs_completed: u64,
    skipped_ticks: u64,
    queued_ticks: u64,
    last_started: Option<DateTime<Utc>>,
    last_finished: Option<DateTime<Utc>>,
}

/// 停止时等待进行中运行的默认上限
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// 一个受运行门保护的周期任务
struct Routine {
    job: Arc<dyn PeriodicJob>,
    period: Duration,
    gate: RunGate,
    counters: RwLock<RoutineCounters>,
    /// 当前运行的句柄，运行门保证同一时刻最多一个
    current_run: Mutex<Option<JoinHandle<()>>>,
}

impl Routine {
    /// 处理一次触发，不等待运行结束
    async fn trigger(self: &Arc<Self>) {
        let name = self.job.name();
        match self.gate.try_enter() {
            Admission::Start => {
                let routine = Arc::clone(self);
                let handle = tokio::spawn(async move { routine.run_until_drained().await });
                *self
                    .current_run
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
            Admission::Skipped => {
                warn!("{} 仍在运行，跳过本次触发", name);
                self.counters.write().await.skipped_ticks += 1;
            }
            Admission::Queued => {
                info!("{} 仍在运行，本次触发已排队", name);
                self.counters.write().await.queued_ticks += 1;
            }
        }
    }

    /// 运行任务，直到没有排队的运行
    async fn run_until_drained(&self) {
        loop {
            {
                let mut counters = self.counters.write().await;
                counters.runs_started += 1;
                counters.last_started = Some(Utc::now());
            }
            debug!("开始运行: {}", self.job.name());

            self.job.execute().await;

            {
                let mut counters = self.counters.write().await;
                counters.runs_completed += 1;
                counters.last_finished = Some(Utc::now());
            }

            if !self.gate.finish() {
                break;
            }
            debug!("执行排队的运行: {}", self.job.name());
        }
    }

    /// 等待进行中的运行结束，超时后中止
    async fn drain(&self, limit: Duration) {
        let handle = self
            .current_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut handle) = handle else {
            return;
        };

        if handle.is_finished() {
            return;
        }
        info!("等待进行中的运行结束: {}", self.job.name());
        if tokio::time::timeout(limit, &mut handle).await.is_err() {
            warn!("{} 在 {:?} 内未结束，已中止", self.job.name(), limit);
            handle.abort();
        }
    }

    async fn status(&self) -> RoutineStatus {
        let counters = self.counters.read().await.clone();
        RoutineStatus {
            name: self.job.name(),
            interval: self.period,
            state: self.gate.state(),
            runs_started: counters.runs_started,
            runs_completed: counters.runs_completed,
            skipped_ticks: counters.skipped_ticks,
            queued_ticks: counters.queued_ticks,
            last_started: counters.last_started,
            last_finished: counters.last_finished,
        }
    }
}

/// 任务调度器实现
pub struct TaskScheduler {
    /// 周期任务
    routines: Vec<Arc<Routine>>,
    /// 重叠策略
    policy: OverlapPolicy,
    /// 触发循环句柄
    tasks: RwLock<Vec<JoinHandle<()>>>,
    /// 停止信号
    shutdown_tx: broadcast::Sender<()>,
    /// 停止时等待进行中运行的上限
    stop_timeout: Duration,
}

impl TaskScheduler {
    /// 创建新的任务调度器
    ///
    /// # 参数
    /// * `policy` - 重叠策略，作用于所有周期任务
    pub fn new(policy: OverlapPolicy) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            routines: Vec::new(),
            policy,
            tasks: RwLock::new(Vec::new()),
            shutdown_tx,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// 设置停止时等待进行中运行的上限
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// 注册一个周期任务
    ///
    /// # 参数
    /// * `job` - 周期任务
    /// * `period` - 触发间隔，启动时会先立即触发一次
    pub fn with_job(mut self, job: Arc<dyn PeriodicJob>, period: Duration) -> Self {
        self.routines.push(Arc::new(Routine {
            job,
            period,
            gate: RunGate::new(self.policy),
            counters: RwLock::new(RoutineCounters::default()),
            current_run: Mutex::new(None),
        }));
        self
    }

    /// 订阅停止信号
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    fn spawn_trigger_loop(&self, routine: Arc<Routine>) -> JoinHandle<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = interval(routine.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                "启动周期任务: {}，间隔: {:?}",
                routine.job.name(),
                routine.period
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => routine.trigger().await,
                    _ = shutdown_rx.recv() => {
                        debug!("周期任务收到停止信号: {}", routine.job.name());
                        break;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Scheduler for TaskScheduler {
    async fn start(&self) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if !tasks.is_empty() {
            anyhow::bail!("调度器已在运行");
        }

        info!(
            "启动任务调度器，周期任务数量: {}，重叠策略: {}",
            self.routines.len(),
            self.policy
        );
        for routine in &self.routines {
            tasks.push(self.spawn_trigger_loop(Arc::clone(routine)));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!("停止任务调度器");
        // 没有订阅者时发送会失败，可以忽略
        let _ = self.shutdown_tx.send(());

        let mut tasks = self.tasks.write().await;
        for task in tasks.drain(..) {
            task.abort();
        }

        // 触发循环已停止，不会再有新的运行
        for routine in &self.routines {
            routine.drain(self.stop_timeout).await;
        }

        info!("任务调度器已停止");
        Ok(())
    }

    async fn get_status(&self) -> SchedulerStatus {
        let mut routines = Vec::with_capacity(self.routines.len());
        for routine in &self.routines {
            routines.push(routine.status().await);
        }

        SchedulerStatus {
            is_running: !self.tasks.read().await.is_empty(),
            overlap_policy: self.policy,
            routines,
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.try_write() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        for routine in &self.routines {
            if let Some(handle) = routine
                .current_run
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// 记录运行次数和最大并发的测试任务
    #[derive(Default)]
    struct CountingJob {
        runs: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        work: Duration,
    }

    #[async_trait]
    impl PeriodicJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn execute(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_gate_skip_policy() {
        let gate = RunGate::new(OverlapPolicy::Skip);
        assert_eq!(gate.try_enter(), Admission::Start);
        assert_eq!(gate.state(), GateState::Running);
        assert_eq!(gate.try_enter(), Admission::Skipped);
        assert!(!gate.finish());
        assert_eq!(gate.state(), GateState::Idle);
        assert_eq!(gate.try_enter(), Admission::Start);
    }

    #[test]
    fn test_gate_queue_one_coalesces() {
        let gate = RunGate::new(OverlapPolicy::QueueOne);
        assert_eq!(gate.try_enter(), Admission::Start);
        assert_eq!(gate.try_enter(), Admission::Queued);
        assert_eq!(gate.try_enter(), Admission::Skipped);
        assert_eq!(gate.state(), GateState::RunningWithPending);

        assert!(gate.finish());
        assert_eq!(gate.state(), GateState::Running);
        assert!(!gate.finish());
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[test]
    fn test_overlap_policy_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: OverlapPolicy,
        }
        let parsed: Wrapper = toml::from_str("policy = \"queue_one\"").unwrap();
        assert_eq!(parsed.policy, OverlapPolicy::QueueOne);
        assert_eq!(OverlapPolicy::default(), OverlapPolicy::Skip);
    }

    #[tokio::test]
    async fn test_fires_immediately_on_start() {
        let job = Arc::new(CountingJob::default());
        let scheduler =
            TaskScheduler::new(OverlapPolicy::Skip).with_job(job.clone(), Duration::from_secs(3600));

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await.unwrap();

        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skip_policy_never_overlaps() {
        let job = Arc::new(CountingJob {
            work: Duration::from_millis(300),
            ..Default::default()
        });
        let scheduler =
            TaskScheduler::new(OverlapPolicy::Skip).with_job(job.clone(), Duration::from_millis(20));

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = scheduler.get_status().await;
        scheduler.stop().await.unwrap();

        let routine = &status.routines[0];
        assert_eq!(routine.runs_started, 1);
        assert!(routine.skipped_ticks >= 1);
        assert_eq!(routine.queued_ticks, 0);
        assert_eq!(job.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_queue_one_runs_again_after_drain() {
        let job = Arc::new(CountingJob {
            work: Duration::from_millis(100),
            ..Default::default()
        });
        let scheduler = TaskScheduler::new(OverlapPolicy::QueueOne)
            .with_job(job.clone(), Duration::from_millis(20));

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;
        let status = scheduler.get_status().await;
        scheduler.stop().await.unwrap();

        let routine = &status.routines[0];
        assert!(routine.runs_started >= 2);
        assert!(routine.queued_ticks >= 1);
        assert_eq!(job.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_halts_triggers() {
        let job = Arc::new(CountingJob::default());
        let scheduler =
            TaskScheduler::new(OverlapPolicy::Skip).with_job(job.clone(), Duration::from_millis(20));

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await.unwrap();
        assert!(!scheduler.get_status().await.is_running);

        let runs = job.runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), runs);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let scheduler = TaskScheduler::new(OverlapPolicy::Skip)
            .with_job(Arc::new(CountingJob::default()), Duration::from_secs(60));
        scheduler.start().await.unwrap();
        assert!(scheduler.start().await.is_err());
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_waits_for_run_in_progress() {
        let job = Arc::new(CountingJob {
            work: Duration::from_millis(200),
            ..Default::default()
        });
        let scheduler =
            TaskScheduler::new(OverlapPolicy::Skip).with_job(job.clone(), Duration::from_secs(3600));

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(job.in_flight.load(Ordering::SeqCst), 1);

        scheduler.stop().await.unwrap();

        // 运行完整结束，而不是被中途丢弃
        assert_eq!(job.in_flight.load(Ordering::SeqCst), 0);
        let status = scheduler.get_status().await;
        assert_eq!(status.routines[0].runs_completed, 1);
        assert_eq!(status.routines[0].state, GateState::Idle);
    }

    #[tokio::test]
    async fn test_stop_wait_is_bounded() {
        let job = Arc::new(CountingJob {
            work: Duration::from_secs(10),
            ..Default::default()
        });
        let scheduler = TaskScheduler::new(OverlapPolicy::Skip)
            .with_job(job.clone(), Duration::from_secs(3600))
            .with_stop_timeout(Duration::from_millis(100));

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stopped = tokio::time::timeout(Duration::from_secs(2), scheduler.stop()).await;
        assert!(stopped.is_ok());
        assert_eq!(
            scheduler.get_status().await.routines[0].runs_completed,
            0
        );
    }
}

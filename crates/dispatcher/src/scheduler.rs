//! 分类探查调度器
//!
//! 每个副本运行一个固定间隔的循环。每个周期持有分布式锁，取出最早创建的一个
//! 进行中的分类任务同步执行；周期主体在独立的 tokio 任务中运行，主体 panic
//! 时锁仍会释放，任务保持 Running 并在下一周期重新执行。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use explore_config::SchedulerConfig;
use explore_core::{
    DistributedLock, ExploreError, ExploreKind, ExploreResult, ExploreTaskRepository,
    ExploreTaskStatus, StructuredLogger, SubTaskRepository, TaskRemark,
};
use explore_infrastructure::ExploreMetrics;

use crate::fan_out::{FanOutController, FanOutOutcome};

/// 周期主体需要的组件，克隆后移入 spawn 的任务
#[derive(Clone)]
struct CycleBody {
    task_repo: Arc<dyn ExploreTaskRepository>,
    sub_task_repo: Arc<dyn SubTaskRepository>,
    fan_out: Arc<FanOutController>,
    metrics: Arc<ExploreMetrics>,
}

impl CycleBody {
    async fn process_next(self) -> ExploreResult<Option<String>> {
        let Some(mut task) = self
            .task_repo
            .next_schedulable(&ExploreKind::SCHEDULED)
            .await?
        else {
            return Ok(None);
        };
        StructuredLogger::log_task_claimed(&task.id, task.kind, &task.target);

        let removed = self.sub_task_repo.delete_by_parent(&task.id).await?;
        if removed > 0 {
            debug!("任务 {} 清理上次遗留的 {} 个子任务", task.id, removed);
        }

        if task.status == ExploreTaskStatus::Queued {
            task.transition_to(ExploreTaskStatus::Running)?;
            if !self
                .task_repo
                .update_if_status(&task, ExploreTaskStatus::Queued)
                .await?
            {
                info!("任务 {} 在开始执行前状态已变更，跳过", task.id);
                return Ok(Some(task.id));
            }
            StructuredLogger::log_status_change(
                &task.id,
                ExploreTaskStatus::Queued,
                ExploreTaskStatus::Running,
            );
        }

        let result = self.fan_out.execute(&task).await;

        let mut current = self
            .task_repo
            .get_by_id(&task.id)
            .await?
            .ok_or_else(|| ExploreError::task_not_found(&task.id))?;
        if current.status == ExploreTaskStatus::Canceled {
            info!("任务 {} 执行期间已被取消，保留取消状态", current.id);
            return Ok(Some(current.id));
        }

        let (status, remark) = match result {
            Ok(FanOutOutcome::Finished) => (ExploreTaskStatus::Finished, None),
            Ok(FanOutOutcome::Canceled) => (ExploreTaskStatus::Canceled, None),
            Err(ExploreError::PartialFailure { remark }) => (ExploreTaskStatus::Failed, Some(remark)),
            Err(e) => {
                StructuredLogger::log_system_error("scheduler", "fan_out", &e);
                (
                    ExploreTaskStatus::Failed,
                    Some(TaskRemark::with_description(e.to_string())),
                )
            }
        };

        let previous = current.status;
        current.finish_with(status, None, remark)?;
        if !self.task_repo.update_if_status(&current, previous).await? {
            info!("任务 {} 在写回结果前状态已变更，保留现有状态", current.id);
            return Ok(Some(current.id));
        }

        StructuredLogger::log_status_change(&current.id, previous, current.status);
        StructuredLogger::log_task_completed(&current.id, current.status, current.remark.as_ref());
        self.metrics.record_task_completed(current.kind, current.status);
        Ok(Some(current.id))
    }
}

pub struct ExploreScheduler {
    body: CycleBody,
    lock: Arc<dyn DistributedLock>,
    config: SchedulerConfig,
    metrics: Arc<ExploreMetrics>,
}

impl ExploreScheduler {
    pub fn new(
        task_repo: Arc<dyn ExploreTaskRepository>,
        sub_task_repo: Arc<dyn SubTaskRepository>,
        lock: Arc<dyn DistributedLock>,
        fan_out: Arc<FanOutController>,
        config: SchedulerConfig,
        metrics: Arc<ExploreMetrics>,
    ) -> Self {
        Self {
            body: CycleBody {
                task_repo,
                sub_task_repo,
                fan_out,
                metrics: metrics.clone(),
            },
            lock,
            config,
            metrics,
        }
    }

    /// 调度循环，收到关闭信号后退出；单个周期的错误只记录日志
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        if !self.config.enabled {
            info!("分类探查调度器未启用");
            return;
        }

        let mut ticker = interval(Duration::from_secs(self.config.interval_seconds));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "分类探查调度器已启动，间隔 {} 秒",
            self.config.interval_seconds
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(Some(task_id)) => debug!("调度周期处理了任务 {}", task_id),
                        Ok(None) => {}
                        Err(e) => StructuredLogger::log_system_error("scheduler", "run_cycle", &e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("分类探查调度器收到关闭信号");
                    break;
                }
            }
        }
    }

    /// 执行一个调度周期，返回本周期处理的任务ID
    pub async fn run_cycle(&self) -> ExploreResult<Option<String>> {
        let wait_started = Instant::now();
        self.acquire_lock().await;
        self.metrics
            .record_lock_wait(wait_started.elapsed().as_secs_f64());

        let body = self.body.clone();
        let result = match tokio::spawn(body.process_next()).await {
            Ok(result) => result,
            Err(join_error) => {
                error!("调度周期主体异常退出: {}", join_error);
                Err(ExploreError::Internal(format!(
                    "调度周期主体异常退出: {join_error}"
                )))
            }
        };

        if let Err(e) = self.lock.unlock(&self.config.lock_name).await {
            StructuredLogger::log_system_error("scheduler", "unlock", &e);
        }
        self.metrics.record_scheduler_cycle(result.is_ok());
        result
    }

    /// 阻塞直到拿到锁，不设超时
    async fn acquire_lock(&self) {
        let retry = Duration::from_millis(self.config.lock_retry_millis);
        loop {
            match self.lock.try_lock(&self.config.lock_name).await {
                Ok(true) => return,
                Ok(false) => debug!("调度锁 {} 被占用，等待重试", self.config.lock_name),
                Err(e) => warn!("获取调度锁 {} 失败: {}", self.config.lock_name, e),
            }
            sleep(retry).await;
        }
    }
}

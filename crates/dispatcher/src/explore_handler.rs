//! “立即探查”消息处理
//!
//! 消费 explore-now 队列，为数据探查、时间戳探查任务逐视图下发作业。作业下发是
//! 幂等的（按视图更新同一作业），消息重复投递不会产生多余作业。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use explore_config::MessageQueueConfig;
use explore_core::{
    ExploreError, ExploreResult, ExploreTask, ExploreTaskRepository, ExploreTaskStatus, Message,
    MessageQueue, MessageType, StructuredLogger, TaskRemark,
};
use explore_infrastructure::ExploreMetrics;

use crate::job_dispatcher::JobDispatcher;
use crate::targets::target_views;

/// 作业下发失败的视图在任务备注中的分桶
pub const DISPATCH_FAILURE_REASON: &str = "dispatch";

pub struct ExploreMessageHandler {
    queue: Arc<dyn MessageQueue>,
    task_repo: Arc<dyn ExploreTaskRepository>,
    dispatcher: Arc<JobDispatcher>,
    config: MessageQueueConfig,
    metrics: Arc<ExploreMetrics>,
}

impl ExploreMessageHandler {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        task_repo: Arc<dyn ExploreTaskRepository>,
        dispatcher: Arc<JobDispatcher>,
        config: MessageQueueConfig,
        metrics: Arc<ExploreMetrics>,
    ) -> Self {
        Self {
            queue,
            task_repo,
            dispatcher,
            config,
            metrics,
        }
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        if let Err(e) = self.queue.create_queue(&self.config.explore_queue, true).await {
            StructuredLogger::log_system_error("explore_handler", "create_queue", &e);
        }

        let mut poll = interval(Duration::from_millis(self.config.poll_interval_millis));
        info!("开始消费探查消息队列 {}", self.config.explore_queue);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!("消费探查消息失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("探查消息处理器收到关闭信号");
                    break;
                }
            }
        }
    }

    /// 拉取并处理当前积压的消息，返回处理数量
    pub async fn poll_once(&self) -> ExploreResult<usize> {
        let messages = self
            .queue
            .consume_messages(&self.config.explore_queue)
            .await?;
        let count = messages.len();
        for message in messages {
            self.process(message).await;
        }

        if let Ok(depth) = self.queue.get_queue_size(&self.config.explore_queue).await {
            self.metrics.update_queue_depth(depth);
        }
        Ok(count)
    }

    async fn process(&self, message: Message) {
        let (settled, requeued) = match self.handle_message(&message).await {
            Ok(()) => (self.queue.ack_message(&message.id).await, false),
            Err(e) => {
                let requeue = e.is_retryable() && !message.is_retry_exhausted(self.config.max_retries);
                if requeue {
                    warn!(
                        "消息 {} 处理失败，重新入队（第 {} 次重试）: {}",
                        message.id,
                        message.retry_count + 1,
                        e
                    );
                } else {
                    error!("消息 {} 处理失败，不再重试: {}", message.id, e);
                    self.fail_task(&message, &e).await;
                }
                (self.queue.nack_message(&message.id, requeue).await, requeue)
            }
        };
        self.metrics.record_message_processed(requeued);
        if let Err(e) = settled {
            StructuredLogger::log_system_error("explore_handler", "settle_message", &e);
        }
    }

    pub async fn handle_message(&self, message: &Message) -> ExploreResult<()> {
        let MessageType::ExploreNow(payload) = &message.message_type;

        let Some(mut task) = self.task_repo.get_by_id(&payload.task_id).await? else {
            warn!("探查消息引用的任务 {} 不存在，跳过", payload.task_id);
            return Ok(());
        };
        if !task.is_active() {
            debug!("任务 {} 已处于 {} 状态，跳过", task.id, task.status);
            return Ok(());
        }
        if !task.kind.uses_execution_engine() {
            warn!("任务 {} 的类型 {} 不经执行引擎，跳过", task.id, task.kind);
            return Ok(());
        }
        debug!("用户 {} 触发任务 {} 的立即探查", payload.user_id, task.id);

        let views = target_views(self.dispatcher.metadata_repo(), &task.target).await?;
        let mut remark = TaskRemark::default();

        for view in &views {
            // 每个视图下发前确认任务仍在进行中
            match self.reload_active(&task.id).await? {
                Some(current) => task = current,
                None => return self.clean_up_after_cancel(&task.id).await,
            }
            match self.dispatcher.dispatch(&mut task, view).await {
                Ok(_) => StructuredLogger::log_view_explored(&task.id, &view.id, true, None),
                // 单视图任务遇到可重试错误时整体重投
                Err(e) if e.is_retryable() && !task.target.is_datasource() => return Err(e),
                Err(e) => {
                    let reason = e.to_string();
                    StructuredLogger::log_view_explored(&task.id, &view.id, false, Some(&reason));
                    remark.push(DISPATCH_FAILURE_REASON, &view.id);
                }
            }
        }

        let Some(mut task) = self.reload_active(&task.id).await? else {
            return self.clean_up_after_cancel(&task.id).await;
        };
        let previous = task.status;

        if views.is_empty() {
            task.finish_with(ExploreTaskStatus::Finished, None, None)?;
        } else if remark.total_count == views.len() {
            task.finish_with(ExploreTaskStatus::Failed, None, Some(remark))?;
        } else {
            task.transition_to(ExploreTaskStatus::Running)?;
            task.remark = (!remark.is_empty()).then_some(remark);
        }
        if !self.task_repo.update_if_status(&task, previous).await? {
            return self.clean_up_after_cancel(&task.id).await;
        }

        if task.status != previous {
            StructuredLogger::log_status_change(&task.id, previous, task.status);
        }
        if task.status.is_terminal() {
            StructuredLogger::log_task_completed(&task.id, task.status, task.remark.as_ref());
            self.metrics.record_task_completed(task.kind, task.status);
        }
        Ok(())
    }

    /// 重新读取任务，已结束或已删除时返回 `None`
    async fn reload_active(&self, task_id: &str) -> ExploreResult<Option<ExploreTask>> {
        Ok(self
            .task_repo
            .get_by_id(task_id)
            .await?
            .filter(ExploreTask::is_active))
    }

    /// 下发期间任务被取消：删除取消之后才创建的作业
    async fn clean_up_after_cancel(&self, task_id: &str) -> ExploreResult<()> {
        let Some(task) = self.task_repo.get_by_id(task_id).await? else {
            return Ok(());
        };
        info!("任务 {} 下发期间状态变为 {}，停止下发", task.id, task.status);
        if task.status == ExploreTaskStatus::Canceled {
            let deleted = self.dispatcher.cancel_jobs(&task).await?;
            if deleted > 0 {
                info!("任务 {} 已取消，清理 {} 个遗留作业", task.id, deleted);
            }
        }
        Ok(())
    }

    /// 消息放弃重试时把仍在进行中的任务标记为失败
    async fn fail_task(&self, message: &Message, error: &ExploreError) {
        let MessageType::ExploreNow(payload) = &message.message_type;
        let result: ExploreResult<()> = async {
            let Some(mut task) = self.task_repo.get_by_id(&payload.task_id).await? else {
                return Ok(());
            };
            if !task.is_active() {
                return Ok(());
            }
            let previous = task.status;
            task.finish_with(
                ExploreTaskStatus::Failed,
                None,
                Some(TaskRemark::with_description(error.to_string())),
            )?;
            if !self.task_repo.update_if_status(&task, previous).await? {
                return Ok(());
            }
            StructuredLogger::log_status_change(&task.id, previous, task.status);
            self.metrics.record_task_completed(task.kind, task.status);
            Ok(())
        }
        .await;

        if let Err(e) = result {
            StructuredLogger::log_system_error("explore_handler", "fail_task", &e);
        }
    }
}

//! 结构化日志工具
//!
//! 为探查任务生命周期中的关键事件输出带 `event` 字段的结构化日志，
//! 输出格式（json/pretty）由二进制入口初始化的 `tracing-subscriber` 决定。

use tracing::{debug, error, info, warn};

use crate::models::{ExploreKind, ExploreTarget, ExploreTaskStatus, TaskRemark};

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_task_created(task_id: &str, kind: ExploreKind, target: &ExploreTarget, user_id: &str) {
        info!(
            event = "explore_task_created",
            task.id = task_id,
            task.kind = %kind,
            task.target = %target,
            user.id = user_id,
            "Explore task created"
        );
    }

    pub fn log_task_claimed(task_id: &str, kind: ExploreKind, target: &ExploreTarget) {
        info!(
            event = "explore_task_claimed",
            task.id = task_id,
            task.kind = %kind,
            task.target = %target,
            "Explore task claimed by scheduler"
        );
    }

    pub fn log_status_change(task_id: &str, from: ExploreTaskStatus, to: ExploreTaskStatus) {
        info!(
            event = "explore_task_status_changed",
            task.id = task_id,
            status.from = %from,
            status.to = %to,
            "Explore task status changed"
        );
    }

    pub fn log_task_completed(task_id: &str, status: ExploreTaskStatus, remark: Option<&TaskRemark>) {
        match status {
            ExploreTaskStatus::Failed => warn!(
                event = "explore_task_completed",
                task.id = task_id,
                task.status = %status,
                failed_views = remark.map_or(0, |r| r.total_count),
                description = remark.and_then(|r| r.description.as_deref()).unwrap_or(""),
                "Explore task completed with failures"
            ),
            _ => info!(
                event = "explore_task_completed",
                task.id = task_id,
                task.status = %status,
                "Explore task completed"
            ),
        }
    }

    pub fn log_view_explored(task_id: &str, view_id: &str, success: bool, reason: Option<&str>) {
        if success {
            debug!(
                event = "view_explored",
                task.id = task_id,
                view.id = view_id,
                "View exploration finished"
            );
        } else {
            warn!(
                event = "view_explored",
                task.id = task_id,
                view.id = view_id,
                reason = reason.unwrap_or("unknown"),
                "View exploration failed"
            );
        }
    }

    pub fn log_job_dispatched(task_id: &str, view_id: &str, job_id: &str, version: i64, created: bool) {
        info!(
            event = "explore_job_dispatched",
            task.id = task_id,
            view.id = view_id,
            job.id = job_id,
            job.version = version,
            job.created = created,
            "Explore job upserted"
        );
    }

    pub fn log_enrichment_skipped(view_id: &str, field_id: &str, what: &str, error: &dyn std::fmt::Display) {
        warn!(
            event = "enrichment_skipped",
            view.id = view_id,
            field.id = field_id,
            enrichment = what,
            error = %error,
            "Rule enrichment failed, rule skipped"
        );
    }

    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::fmt::Display) {
        error!(
            event = "system_error",
            component = component,
            operation = operation,
            error = %error,
            "System error occurred"
        );
    }
}

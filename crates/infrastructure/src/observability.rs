//! 探查服务指标采集
//!
//! 指标通过 `metrics` 门面记录，是否导出以及导出到哪里由二进制入口安装的
//! recorder（Prometheus exporter）决定；未安装 recorder 时所有记录都是空操作。

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::debug;

use explore_core::{ExploreKind, ExploreTaskStatus};

pub struct ExploreMetrics {
    scheduler_cycles_total: Counter,
    scheduler_cycle_errors_total: Counter,
    lock_wait_duration: Histogram,
    fan_out_duration: Histogram,
    jobs_dispatched_total: Counter,
    messages_processed_total: Counter,
    messages_requeued_total: Counter,
    batch_items_total: Counter,
    batch_failures_total: Counter,
    explore_queue_depth: Gauge,
}

impl ExploreMetrics {
    pub fn new() -> Self {
        Self {
            scheduler_cycles_total: counter!("explore_scheduler_cycles_total"),
            scheduler_cycle_errors_total: counter!("explore_scheduler_cycle_errors_total"),
            lock_wait_duration: histogram!("explore_scheduler_lock_wait_seconds"),
            fan_out_duration: histogram!("explore_fan_out_duration_seconds"),
            jobs_dispatched_total: counter!("explore_jobs_dispatched_total"),
            messages_processed_total: counter!("explore_messages_processed_total"),
            messages_requeued_total: counter!("explore_messages_requeued_total"),
            batch_items_total: counter!("explore_batch_items_total"),
            batch_failures_total: counter!("explore_batch_failures_total"),
            explore_queue_depth: gauge!("explore_queue_depth"),
        }
    }

    pub fn record_task_created(&self, kind: ExploreKind) {
        counter!("explore_tasks_created_total", "kind" => kind.as_str()).increment(1);
    }

    pub fn record_task_completed(&self, kind: ExploreKind, status: ExploreTaskStatus) {
        counter!(
            "explore_tasks_completed_total",
            "kind" => kind.as_str(),
            "status" => status.as_str()
        )
        .increment(1);
    }

    pub fn record_scheduler_cycle(&self, success: bool) {
        self.scheduler_cycles_total.increment(1);
        if !success {
            self.scheduler_cycle_errors_total.increment(1);
        }
    }

    pub fn record_lock_wait(&self, duration_seconds: f64) {
        self.lock_wait_duration.record(duration_seconds);
    }

    pub fn record_fan_out(&self, view_count: usize, failed: usize, duration_seconds: f64) {
        self.fan_out_duration.record(duration_seconds);
        debug!(
            view_count = view_count,
            failed = failed,
            duration_seconds = duration_seconds,
            "Fan-out finished"
        );
    }

    pub fn record_view_explored(&self, outcome: &'static str) {
        counter!("explore_views_explored_total", "outcome" => outcome).increment(1);
    }

    pub fn record_job_dispatched(&self, created: bool) {
        self.jobs_dispatched_total.increment(1);
        let mode = if created { "create" } else { "update" };
        counter!("explore_job_upserts_total", "mode" => mode).increment(1);
    }

    pub fn record_message_processed(&self, requeued: bool) {
        self.messages_processed_total.increment(1);
        if requeued {
            self.messages_requeued_total.increment(1);
        }
    }

    pub fn update_queue_depth(&self, depth: u32) {
        self.explore_queue_depth.set(depth as f64);
    }

    pub fn record_batch(&self, total: usize, failed: usize) {
        self.batch_items_total.increment(total as u64);
        self.batch_failures_total.increment(failed as u64);
    }
}

impl Default for ExploreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

//! 探查任务调度与执行
//!
//! 规则解析、作业下发、状态汇总面向执行引擎；分类分级探查由调度器在
//! 分布式锁保护下逐个任务执行。

pub mod batch_executor;
pub mod explore_handler;
pub mod fan_out;
pub mod grading;
pub mod job_dispatcher;
pub mod rule_resolver;
pub mod rule_service;
pub mod scheduler;
pub mod status_aggregator;
pub mod targets;
pub mod task_service;
pub mod view_explorer;

pub use batch_executor::BatchExecutor;
pub use explore_handler::{ExploreMessageHandler, DISPATCH_FAILURE_REASON};
pub use fan_out::{FanOutController, FanOutOutcome};
pub use grading::grade_fields;
pub use job_dispatcher::JobDispatcher;
pub use rule_resolver::RuleResolver;
pub use rule_service::RuleService;
pub use scheduler::ExploreScheduler;
pub use status_aggregator::{aggregate, AggregatedStatus, FailureCategory, TaskStatusRefresher};
pub use task_service::{CreateTaskRequest, TaskService};
pub use view_explorer::{FailureBucket, ViewExplorer, ViewFailure, ViewOutcome};

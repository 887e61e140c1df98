//! # 数据模型
//!
//! 定义探查任务编排的核心数据结构：探查任务、子任务、探查规则、分级规则、
//! 视图/字段元数据，以及与执行引擎交互的作业描述和执行记录。
//!
//! ## 状态管理
//!
//! ### 探查任务状态流转
//! ```text
//! Queued → Running → Finished
//!   ↓        ↓   ↘
//! Canceled Canceled  Failed
//! ```
//!
//! 终态（Finished/Failed/Canceled）不可再离开，见 [`ExploreTask::transition_to`]。
//!
//! ## 序列化
//!
//! 所有模型都实现 `serde::Serialize` 与 `serde::Deserialize`，
//! 状态枚举使用大写字符串，其余枚举使用 snake_case。

pub mod grade;
pub mod job;
pub mod message;
pub mod metadata;
pub mod remark;
pub mod rule;
pub mod sub_task;
pub mod task;

pub use grade::*;
pub use job::*;
pub use message::*;
pub use metadata::*;
pub use remark::*;
pub use rule::*;
pub use sub_task::*;
pub use task::*;

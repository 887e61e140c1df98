//! 探查任务编排服务的装配层

pub mod app;
pub mod shutdown;

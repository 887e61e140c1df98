use thiserror::Error;

use crate::models::TaskRemark;

/// 探查服务错误类型定义
#[derive(Debug, Error)]
pub enum ExploreError {
    #[error("数据验证失败: {0}")]
    Validation(String),

    #[error("探查任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("探查规则未找到: {id}")]
    RuleNotFound { id: String },

    #[error("视图未找到: {id}")]
    ViewNotFound { id: String },

    #[error("数据源未找到: {id}")]
    DatasourceNotFound { id: String },

    #[error("资源冲突: {0}")]
    Conflict(String),

    #[error("下游服务 {service} 调用失败: {message}")]
    Downstream { service: String, message: String },

    #[error("部分探查失败: {} 个视图失败", remark.total_count)]
    PartialFailure { remark: TaskRemark },

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type ExploreResult<T> = std::result::Result<T, ExploreError>;

impl ExploreError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn task_not_found<S: Into<String>>(id: S) -> Self {
        Self::TaskNotFound { id: id.into() }
    }
    pub fn rule_not_found<S: Into<String>>(id: S) -> Self {
        Self::RuleNotFound { id: id.into() }
    }
    pub fn view_not_found<S: Into<String>>(id: S) -> Self {
        Self::ViewNotFound { id: id.into() }
    }
    pub fn datasource_not_found<S: Into<String>>(id: S) -> Self {
        Self::DatasourceNotFound { id: id.into() }
    }
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn downstream<S: Into<String>, M: ToString>(service: S, message: M) -> Self {
        Self::Downstream {
            service: service.into(),
            message: message.to_string(),
        }
    }
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ExploreError::TaskNotFound { .. }
                | ExploreError::RuleNotFound { .. }
                | ExploreError::ViewNotFound { .. }
                | ExploreError::DatasourceNotFound { .. }
        )
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExploreError::Downstream { .. }
                | ExploreError::MessageQueue(_)
                | ExploreError::Timeout(_)
        )
    }
    pub fn user_message(&self) -> &str {
        match self {
            ExploreError::TaskNotFound { .. } => "请求的探查任务不存在",
            ExploreError::RuleNotFound { .. } => "请求的探查规则不存在",
            ExploreError::ViewNotFound { .. } => "请求的视图不存在",
            ExploreError::DatasourceNotFound { .. } => "请求的数据源不存在",
            ExploreError::Validation(_) => "输入数据验证失败",
            ExploreError::Conflict(_) => "目标上已存在进行中的探查任务或同名规则",
            ExploreError::PartialFailure { .. } => "部分视图探查失败，请查看任务备注",
            ExploreError::Timeout(_) => "操作超时，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for ExploreError {
    fn from(err: serde_json::Error) -> Self {
        ExploreError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ExploreError {
    fn from(err: anyhow::Error) -> Self {
        ExploreError::Internal(err.to_string())
    }
}

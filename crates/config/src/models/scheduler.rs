use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub lock_name: String,
    pub lock_retry_millis: u64,
    /// 单个视图探查的超时时间，未设置表示不限制
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_timeout_seconds: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 5,
            lock_name: "explore:classification:scheduler".to_string(),
            lock_retry_millis: 500,
            view_timeout_seconds: None,
        }
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_timeout_seconds(self.interval_seconds, "scheduler.interval_seconds")?;
        ValidationUtils::validate_not_empty(&self.lock_name, "scheduler.lock_name")?;
        if self.lock_retry_millis == 0 {
            return Err(crate::ConfigError::Validation(
                "scheduler.lock_retry_millis must be greater than 0".to_string(),
            ));
        }
        if let Some(timeout) = self.view_timeout_seconds {
            ValidationUtils::validate_timeout_seconds(timeout, "scheduler.view_timeout_seconds")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { workers: 10 }
    }
}

impl ConfigValidator for BatchConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_count(self.workers, "batch.workers", 256)
    }
}

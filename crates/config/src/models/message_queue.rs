use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageQueueConfig {
    pub explore_queue: String,
    pub poll_interval_millis: u64,
    pub max_retries: i32,
    pub max_queue_size: usize,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            explore_queue: "explore_now".to_string(),
            poll_interval_millis: 500,
            max_retries: 3,
            max_queue_size: 10000,
        }
    }
}

impl ConfigValidator for MessageQueueConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.explore_queue, "message_queue.explore_queue")?;
        if self.poll_interval_millis == 0 {
            return Err(crate::ConfigError::Validation(
                "message_queue.poll_interval_millis must be greater than 0".to_string(),
            ));
        }
        if self.max_retries < 0 {
            return Err(crate::ConfigError::Validation(
                "message_queue.max_retries cannot be negative".to_string(),
            ));
        }
        ValidationUtils::validate_count(self.max_queue_size, "message_queue.max_queue_size", 1_000_000)
    }
}

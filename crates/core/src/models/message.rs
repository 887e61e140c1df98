use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub retry_count: i32,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageType {
    ExploreNow(ExploreNowMessage),
}

/// 一次性的“立即探查”信号，重复投递是安全的（作业下发为幂等 upsert）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExploreNowMessage {
    pub task_id: String,
    pub user_id: String,
    pub user_name: String,
}

impl Message {
    pub fn explore_now(message: ExploreNowMessage) -> Self {
        let payload = serde_json::to_value(&message).unwrap_or(serde_json::Value::Null);
        let correlation_id = Some(message.task_id.clone());
        Self {
            id: Uuid::new_v4().to_string(),
            message_type: MessageType::ExploreNow(message),
            payload,
            timestamp: Utc::now(),
            retry_count: 0,
            correlation_id,
        }
    }
    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }
    pub fn is_retry_exhausted(&self, max_retries: i32) -> bool {
        self.retry_count >= max_retries
    }
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
    pub fn deserialize(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
    pub fn message_type_str(&self) -> &'static str {
        match &self.message_type {
            MessageType::ExploreNow(_) => "explore_now",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explore_now_message() {
        let message = Message::explore_now(ExploreNowMessage {
            task_id: "t-1".to_string(),
            user_id: "u-1".to_string(),
            user_name: "alice".to_string(),
        });

        assert!(!message.id.is_empty());
        assert_eq!(message.retry_count, 0);
        assert_eq!(message.correlation_id.as_deref(), Some("t-1"));
        assert_eq!(message.message_type_str(), "explore_now");
        assert_eq!(message.payload["task_id"], "t-1");
    }

    #[test]
    fn test_message_round_trip_and_retry() {
        let mut message = Message::explore_now(ExploreNowMessage {
            task_id: "t-2".to_string(),
            user_id: "u-1".to_string(),
            user_name: "alice".to_string(),
        });
        message.increment_retry();
        message.increment_retry();
        assert!(message.is_retry_exhausted(2));
        assert!(!message.is_retry_exhausted(3));

        let json = message.serialize().unwrap();
        let decoded = Message::deserialize(&json).unwrap();
        let MessageType::ExploreNow(inner) = decoded.message_type;
        assert_eq!(inner.task_id, "t-2");
        assert_eq!(decoded.retry_count, 2);
    }
}

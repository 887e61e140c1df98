use async_trait::async_trait;

use crate::{models::Message, ExploreResult};

/// 消息队列抽象：至少一次投递，消费方负责 ack/nack
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish_message(&self, queue: &str, message: &Message) -> ExploreResult<()>;

    async fn consume_messages(&self, queue: &str) -> ExploreResult<Vec<Message>>;

    async fn ack_message(&self, message_id: &str) -> ExploreResult<()>;

    async fn nack_message(&self, message_id: &str, requeue: bool) -> ExploreResult<()>;

    async fn create_queue(&self, queue: &str, durable: bool) -> ExploreResult<()>;

    async fn get_queue_size(&self, queue: &str) -> ExploreResult<u32>;
}

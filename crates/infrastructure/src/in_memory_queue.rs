use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use explore_core::{ExploreError, ExploreResult, Message, MessageQueue};

/// 内存消息队列实现
///
/// 使用 Tokio channels 实现，适用于单实例部署和测试场景。
/// 已消费但未确认的消息保存在 in-flight 表中，`nack_message(requeue = true)`
/// 会将其重试计数加一后重新入队。
#[derive(Debug)]
pub struct InMemoryMessageQueue {
    /// 队列存储：队列名 -> 通道
    queues: Arc<RwLock<HashMap<String, QueueChannels>>>,
    /// 消息ID -> (队列名, 消息)
    in_flight: Arc<Mutex<HashMap<String, (String, Message)>>>,
    /// 单个队列最大容量（0表示无限制）
    max_queue_size: usize,
}

#[derive(Debug)]
struct QueueChannels {
    sender: mpsc::UnboundedSender<Message>,
    /// 多个消费者共享同一个接收端
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Message>>>,
    size: Arc<AtomicU32>,
    durable: bool,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::with_capacity(10000)
    }

    pub fn with_capacity(max_queue_size: usize) -> Self {
        info!(
            "Creating in-memory message queue (max_queue_size: {})",
            max_queue_size
        );
        Self {
            queues: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            max_queue_size,
        }
    }

    /// 已消费但尚未 ack/nack 的消息数量
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    async fn get_or_create_queue(&self, queue_name: &str, durable: bool) {
        let mut queues = self.queues.write().await;
        if !queues.contains_key(queue_name) {
            let (sender, receiver) = mpsc::unbounded_channel();
            queues.insert(
                queue_name.to_string(),
                QueueChannels {
                    sender,
                    receiver: Arc::new(Mutex::new(receiver)),
                    size: Arc::new(AtomicU32::new(0)),
                    durable,
                },
            );
            debug!("Created queue '{}' (durable: {})", queue_name, durable);
        }
    }

    async fn enqueue(&self, queue: &str, message: Message) -> ExploreResult<()> {
        self.get_or_create_queue(queue, false).await;

        let queues = self.queues.read().await;
        let channels = queues
            .get(queue)
            .ok_or_else(|| ExploreError::MessageQueue(format!("Queue '{queue}' not found")))?;

        let current = channels.size.load(Ordering::Relaxed) as usize;
        if self.max_queue_size > 0 && current >= self.max_queue_size {
            warn!("Queue '{}' is full, message {} rejected", queue, message.id);
            return Err(ExploreError::MessageQueue(format!(
                "Queue '{queue}' is full ({current} messages)"
            )));
        }

        let message_id = message.id.clone();
        channels.sender.send(message).map_err(|e| {
            ExploreError::MessageQueue(format!("Failed to send message to queue '{queue}': {e}"))
        })?;
        channels.size.fetch_add(1, Ordering::Relaxed);

        debug!("Enqueued message {} to queue '{}'", message_id, queue);
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish_message(&self, queue: &str, message: &Message) -> ExploreResult<()> {
        self.enqueue(queue, message.clone()).await
    }

    async fn consume_messages(&self, queue: &str) -> ExploreResult<Vec<Message>> {
        self.get_or_create_queue(queue, false).await;

        let (receiver, size) = {
            let queues = self.queues.read().await;
            let channels = queues
                .get(queue)
                .ok_or_else(|| ExploreError::MessageQueue(format!("Queue '{queue}' not found")))?;
            (channels.receiver.clone(), channels.size.clone())
        };

        let mut messages = Vec::new();
        {
            let mut rx = receiver.lock().await;
            while let Ok(message) = rx.try_recv() {
                messages.push(message);
            }
        }

        if !messages.is_empty() {
            size.fetch_sub(messages.len() as u32, Ordering::Relaxed);
            let mut in_flight = self.in_flight.lock().await;
            for message in &messages {
                in_flight.insert(message.id.clone(), (queue.to_string(), message.clone()));
            }
            debug!("Consumed {} messages from queue '{}'", messages.len(), queue);
        }

        Ok(messages)
    }

    async fn ack_message(&self, message_id: &str) -> ExploreResult<()> {
        if self.in_flight.lock().await.remove(message_id).is_none() {
            debug!("Ack for unknown message {}", message_id);
        }
        Ok(())
    }

    async fn nack_message(&self, message_id: &str, requeue: bool) -> ExploreResult<()> {
        let entry = self.in_flight.lock().await.remove(message_id);
        match entry {
            Some((queue, mut message)) if requeue => {
                message.increment_retry();
                debug!(
                    "Requeueing message {} to '{}' (retry_count: {})",
                    message_id, queue, message.retry_count
                );
                self.enqueue(&queue, message).await
            }
            Some(_) => {
                debug!("Message {} dropped after nack", message_id);
                Ok(())
            }
            None => {
                warn!("Nack for unknown message {}", message_id);
                Ok(())
            }
        }
    }

    async fn create_queue(&self, queue: &str, durable: bool) -> ExploreResult<()> {
        self.get_or_create_queue(queue, durable).await;
        let queues = self.queues.read().await;
        if let Some(channels) = queues.get(queue) {
            if channels.durable != durable {
                debug!(
                    "Queue '{}' already exists with durable = {}",
                    queue, channels.durable
                );
            }
        }
        Ok(())
    }

    async fn get_queue_size(&self, queue: &str) -> ExploreResult<u32> {
        let queues = self.queues.read().await;
        queues
            .get(queue)
            .map(|channels| channels.size.load(Ordering::Relaxed))
            .ok_or_else(|| ExploreError::MessageQueue(format!("Queue '{queue}' not found")))
    }
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

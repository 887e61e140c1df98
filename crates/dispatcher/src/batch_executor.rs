//! 固定大小的批量执行池
//!
//! 输入按下标放入共享队列，`workers` 个工作任务竞争取出；每个输入在其下标处
//! 得到且只得到一个结果，单项失败或 panic 不影响其他项。

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error};

use explore_core::{ExploreError, ExploreResult};

pub struct BatchExecutor {
    workers: usize,
}

impl BatchExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// 所有工作任务排空队列并退出后返回，结果顺序与输入一致
    pub async fn run<I, R, F, Fut>(&self, inputs: Vec<I>, handler: F) -> Vec<ExploreResult<R>>
    where
        I: Send + 'static,
        R: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ExploreResult<R>> + Send + 'static,
    {
        let total = inputs.len();
        if total == 0 {
            return Vec::new();
        }

        let pending: VecDeque<(usize, I)> = inputs.into_iter().enumerate().collect();
        let pending = Arc::new(Mutex::new(pending));
        let handler = Arc::new(handler);
        let worker_count = self.workers.min(total);
        let mut handles = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let pending = Arc::clone(&pending);
            let handler = Arc::clone(&handler);
            handles.push(tokio::spawn(async move {
                let mut completed = Vec::new();
                loop {
                    let next = pending.lock().await.pop_front();
                    let Some((index, input)) = next else {
                        break;
                    };
                    let result = match tokio::spawn(handler(input)).await {
                        Ok(result) => result,
                        Err(join_error) => Err(ExploreError::Internal(format!(
                            "批量任务第 {index} 项异常退出: {join_error}"
                        ))),
                    };
                    completed.push((index, result));
                }
                debug!("批量执行工作任务 {} 完成 {} 项", worker_id, completed.len());
                completed
            }));
        }

        let mut slots: Vec<Option<ExploreResult<R>>> = (0..total).map(|_| None).collect();
        for handle in handles {
            match handle.await {
                Ok(completed) => {
                    for (index, result) in completed {
                        slots[index] = Some(result);
                    }
                }
                Err(e) => error!("批量执行工作任务异常退出: {}", e),
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    Err(ExploreError::Internal(format!("批量任务第 {index} 项没有结果")))
                })
            })
            .collect()
    }
}

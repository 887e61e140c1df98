use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// 优雅关闭管理器
///
/// 后台循环通过 [`ShutdownManager::subscribe`] 获取关闭信号，并用
/// [`ShutdownManager::track`] 登记自己的句柄；关闭时先广播信号，再在限定时间内
/// 等待各循环退出，超时的循环被强制中止。
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    components: Arc<Mutex<Vec<(String, JoinHandle<()>)>>>,
    is_shutdown: Arc<Mutex<bool>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            components: Arc::new(Mutex::new(Vec::new())),
            is_shutdown: Arc::new(Mutex::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// 登记需要在关闭时等待的后台循环
    pub async fn track(&self, name: impl Into<String>, handle: JoinHandle<()>) {
        let name = name.into();
        debug!("登记后台组件 {}", name);
        self.components.lock().await.push((name, handle));
    }

    pub async fn is_shutdown(&self) -> bool {
        *self.is_shutdown.lock().await
    }

    /// 广播关闭信号并等待已登记的组件退出，返回超时被中止的组件数
    pub async fn shutdown(&self, grace: Duration) -> usize {
        {
            let mut is_shutdown = self.is_shutdown.lock().await;
            if *is_shutdown {
                debug!("关闭流程已经触发过");
                return 0;
            }
            *is_shutdown = true;
        }

        let receivers = self.shutdown_tx.receiver_count();
        info!("发送关闭信号给 {} 个订阅者", receivers);
        // 没有订阅者时发送失败，可以忽略
        let _ = self.shutdown_tx.send(());

        let components = std::mem::take(&mut *self.components.lock().await);
        let mut aborted = 0;
        for (name, mut handle) in components {
            match timeout(grace, &mut handle).await {
                Ok(Ok(())) => info!("组件 {} 已停止", name),
                Ok(Err(e)) => warn!("组件 {} 异常退出: {}", name, e),
                Err(_) => {
                    warn!("组件 {} 在 {:?} 内未停止，强制中止", name, grace);
                    handle.abort();
                    aborted += 1;
                }
            }
        }
        aborted
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

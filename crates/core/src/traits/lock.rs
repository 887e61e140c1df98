use async_trait::async_trait;

use crate::ExploreResult;

/// 按名称互斥的分布式锁，不提供租约或持有者令牌
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// 尝试获取锁，已被占用时返回 `false`
    async fn try_lock(&self, name: &str) -> ExploreResult<bool>;

    async fn unlock(&self, name: &str) -> ExploreResult<()>;
}

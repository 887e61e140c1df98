//! 分布式锁实现
//!
//! - [`InMemoryDistributedLock`]：单进程互斥，用于单实例部署和测试
//! - [`RedisDistributedLock`]：基于 `SET NX [PX]` 的跨副本互斥，释放时只删除
//!   本实例写入的锁值，过期后被其他副本重新获取的锁不受影响

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use explore_config::{LockConfig, LockType};
use explore_core::{DistributedLock, ExploreError, ExploreResult};

#[derive(Debug, Default)]
pub struct InMemoryDistributedLock {
    held: Mutex<HashSet<String>>,
}

impl InMemoryDistributedLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_locked(&self, name: &str) -> bool {
        self.held.lock().await.contains(name)
    }
}

#[async_trait]
impl DistributedLock for InMemoryDistributedLock {
    async fn try_lock(&self, name: &str) -> ExploreResult<bool> {
        Ok(self.held.lock().await.insert(name.to_string()))
    }

    async fn unlock(&self, name: &str) -> ExploreResult<()> {
        if !self.held.lock().await.remove(name) {
            debug!("Lock '{}' was not held", name);
        }
        Ok(())
    }
}

/// 锁值仍是本实例写入的才删除
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

pub struct RedisDistributedLock {
    conn: redis::aio::ConnectionManager,
    key_prefix: String,
    ttl_millis: Option<u64>,
    /// 写入锁键的值，释放时据此确认仍由本实例持有
    holder: String,
    release: redis::Script,
}

impl RedisDistributedLock {
    pub async fn new(config: &LockConfig) -> ExploreResult<Self> {
        let url = config.redis.build_connection_url();
        let client = redis::Client::open(url).map_err(|e| {
            ExploreError::Configuration(format!("Failed to create Redis client: {e}"))
        })?;
        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(|e| ExploreError::downstream("redis", e))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ExploreError::downstream("redis", e))?;

        info!(
            "Redis distributed lock connected to {}:{}",
            config.redis.host, config.redis.port
        );

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
            ttl_millis: config.ttl_seconds.map(|secs| secs * 1000),
            holder: uuid::Uuid::new_v4().to_string(),
            release: redis::Script::new(RELEASE_SCRIPT),
        })
    }

    fn build_key(&self, name: &str) -> String {
        format!("{}{}", self.key_prefix, name)
    }
}

#[async_trait]
impl DistributedLock for RedisDistributedLock {
    async fn try_lock(&self, name: &str) -> ExploreResult<bool> {
        let key = self.build_key(name);
        let mut conn = self.conn.clone();

        let mut cmd = redis::cmd("SET");
        cmd.arg(&key).arg(&self.holder).arg("NX");
        if let Some(ttl) = self.ttl_millis {
            cmd.arg("PX").arg(ttl);
        }

        let reply: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| ExploreError::downstream("redis", e))?;

        Ok(reply.is_some())
    }

    async fn unlock(&self, name: &str) -> ExploreResult<()> {
        let key = self.build_key(name);
        let mut conn = self.conn.clone();

        let removed: i32 = self
            .release
            .key(&key)
            .arg(&self.holder)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| ExploreError::downstream("redis", e))?;

        if removed == 0 {
            warn!(
                "Lock key '{}' expired or is held by another instance, left untouched",
                key
            );
        }
        Ok(())
    }
}

pub struct LockFactory;

impl LockFactory {
    pub async fn create(config: &LockConfig) -> ExploreResult<Arc<dyn DistributedLock>> {
        match config.r#type {
            LockType::InMemory => {
                info!("Using in-memory distributed lock");
                Ok(Arc::new(InMemoryDistributedLock::new()))
            }
            LockType::Redis => {
                info!("Using Redis distributed lock");
                Ok(Arc::new(RedisDistributedLock::new(config).await?))
            }
        }
    }
}

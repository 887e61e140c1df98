use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    InMemory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
        }
    }
}

impl RedisConfig {
    pub fn build_connection_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

impl ConfigValidator for RedisConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.host, "lock.redis.host")?;
        ValidationUtils::validate_port(self.port)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    pub r#type: LockType,
    pub key_prefix: String,
    /// Redis 锁的安全过期时间，未设置表示锁永不过期
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub redis: RedisConfig,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            r#type: LockType::InMemory,
            key_prefix: "explore:lock:".to_string(),
            ttl_seconds: None,
            redis: RedisConfig::default(),
        }
    }
}

impl ConfigValidator for LockConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if let Some(ttl) = self.ttl_seconds {
            ValidationUtils::validate_timeout_seconds(ttl, "lock.ttl_seconds")?;
        }
        if self.r#type == LockType::Redis {
            self.redis.validate()?;
        }
        Ok(())
    }
}

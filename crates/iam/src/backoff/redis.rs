//! Redis 退避存储
//!
//! 多实例部署时共享失败计数：
//! - `authrix:backoff:{tenant}:{identity}:failures` -> Integer（INCR + EXPIRE，MULTI 事务）
//! - `authrix:backoff:{tenant}:{identity}:blocked_until` -> Integer（Lua 脚本取最大值）

use async_trait::async_trait;
use authrix_common::config::RedisBackoffConfig;
use deadpool_redis::{Config, Pool, PoolConfig, Runtime, Timeouts};
use std::time::Duration;
use tracing::info;

use super::BackoffStore;
use crate::error::{AuthError, AuthResult};

/// 仅当新值更大时覆盖；TTL 只延长不缩短
const SET_MAX_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local candidate = tonumber(ARGV[1])
local ttl = tonumber(ARGV[2])
if candidate > current then
    redis.call('SET', KEYS[1], candidate, 'EX', ttl)
    return candidate
end
if redis.call('TTL', KEYS[1]) < ttl then
    redis.call('EXPIRE', KEYS[1], ttl)
end
return current
"#;

/// Redis 退避存储
#[derive(Clone)]
pub struct RedisBackoffStore {
    pool: Pool,
    script: redis::Script,
}

impl std::fmt::Debug for RedisBackoffStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackoffStore")
            .field("pool_status", &self.pool.status())
            .finish()
    }
}

fn redis_error(context: &str, err: impl std::fmt::Display) -> AuthError {
    AuthError::Storage(format!("{context}: {err}"))
}

impl RedisBackoffStore {
    /// 创建连接池并测试连接
    pub async fn new(config: &RedisBackoffConfig) -> AuthResult<Self> {
        let mut cfg = Config::from_url(&config.url);
        let timeout = Some(Duration::from_millis(config.timeout_ms));
        cfg.pool = Some(PoolConfig {
            max_size: config.pool_size,
            timeouts: Timeouts {
                wait: timeout,
                create: timeout,
                recycle: timeout,
            },
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| redis_error("Failed to create Redis pool", e))?;

        let store = Self {
            pool,
            script: redis::Script::new(SET_MAX_SCRIPT),
        };

        // 测试连接
        let mut conn = store.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut *conn)
            .await
            .map_err(|e| redis_error("Redis PING failed", e))?;

        info!(
            "Redis backoff store initialized: pool_size={}",
            config.pool_size
        );
        Ok(store)
    }

    async fn connection(&self) -> AuthResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| redis_error("Failed to get Redis connection", e))
    }
}

#[async_trait]
impl BackoffStore for RedisBackoffStore {
    async fn get(&self, key: &str) -> AuthResult<Option<i64>> {
        let mut conn = self.connection().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<i64>>(&mut *conn)
            .await
            .map_err(|e| redis_error("Redis GET failed", e))
    }

    async fn incr_with_expiry(&self, key: &str, ttl_secs: u64) -> AuthResult<i64> {
        let mut conn = self.connection().await?;
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .ignore()
            .query_async(&mut *conn)
            .await
            .map_err(|e| redis_error("Redis INCR failed", e))?;
        Ok(count)
    }

    async fn set_max_with_expiry(&self, key: &str, value: i64, ttl_secs: u64) -> AuthResult<i64> {
        let mut conn = self.connection().await?;
        self.script
            .key(key)
            .arg(value)
            .arg(ttl_secs)
            .invoke_async::<_, i64>(&mut *conn)
            .await
            .map_err(|e| redis_error("Redis set-max script failed", e))
    }

    async fn delete(&self, keys: &[String]) -> AuthResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        redis::cmd("DEL")
            .arg(keys)
            .query_async::<_, ()>(&mut *conn)
            .await
            .map_err(|e| redis_error("Redis DEL failed", e))
    }
}

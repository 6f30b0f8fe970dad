//! 登录失败退避
//!
//! 按 (tenant, identity) 统计连续失败次数，达到阈值后按指数退避封禁。
//! 计数与封禁截止时间都保存在 `BackoffStore` 中，多实例部署时使用 Redis 共享。
//!
//! # 状态
//!
//! - Clear: 计数为 0
//! - Warned: 1 <= 计数 < threshold
//! - Blocked: 计数 >= threshold 且 blocked_until 在未来

use std::sync::Arc;

use async_trait::async_trait;
use authrix_common::config::{
    BackoffConfig, BackoffStoreBackend, BackoffStoreConfig, MAX_DURATION_SECS,
};
use chrono::Utc;
use tracing::{debug, warn};

use crate::error::AuthResult;

pub mod memory;
#[cfg(feature = "backend-redis")]
pub mod redis;

pub use memory::MemoryBackoffStore;

/// 退避状态存储
///
/// 每个操作必须是原子的：并发调用方不会丢失计数，也不会缩短封禁时间。
#[async_trait]
pub trait BackoffStore: Send + Sync {
    /// 读取整数值，不存在或已过期返回 None
    async fn get(&self, key: &str) -> AuthResult<Option<i64>>;

    /// 原子递增并设置过期时间，返回递增后的值
    async fn incr_with_expiry(&self, key: &str, ttl_secs: u64) -> AuthResult<i64>;

    /// 原子地把值设为 max(当前值, value) 并设置过期时间，返回最终值
    async fn set_max_with_expiry(&self, key: &str, value: i64, ttl_secs: u64) -> AuthResult<i64>;

    /// 删除键
    async fn delete(&self, keys: &[String]) -> AuthResult<()>;
}

/// 根据配置创建退避存储
pub async fn create_backoff_store(config: &BackoffStoreConfig) -> AuthResult<Arc<dyn BackoffStore>> {
    match config.backend {
        BackoffStoreBackend::Memory => Ok(Arc::new(MemoryBackoffStore::new())),

        #[cfg(feature = "backend-redis")]
        BackoffStoreBackend::Redis => Ok(Arc::new(
            redis::RedisBackoffStore::new(&config.redis).await?,
        )),

        #[cfg(not(feature = "backend-redis"))]
        BackoffStoreBackend::Redis => Err(crate::error::AuthError::Internal(
            "Redis backoff store not enabled. Compile with --features backend-redis".into(),
        )),
    }
}

/// 准入判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    Admit,
    /// 仍在封禁期内，retry_after 为剩余秒数
    Block { retry_after: u64 },
}

/// 登录退避守卫
#[derive(Clone)]
pub struct BackoffGuard {
    store: Arc<dyn BackoffStore>,
    config: BackoffConfig,
}

impl std::fmt::Debug for BackoffGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffGuard")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn failures_key(tenant_id: &str, identity: &str) -> String {
    format!("authrix:backoff:{tenant_id}:{identity}:failures")
}

fn blocked_until_key(tenant_id: &str, identity: &str) -> String {
    format!("authrix:backoff:{tenant_id}:{identity}:blocked_until")
}

impl BackoffGuard {
    pub fn new(store: Arc<dyn BackoffStore>, config: BackoffConfig) -> Self {
        Self { store, config }
    }

    /// 第 count 次失败对应的封禁时长（秒）
    ///
    /// `min(base * multiplier^(count - threshold), max)`
    pub fn backoff_secs(&self, count: u64) -> u64 {
        let exponent = count.saturating_sub(self.config.threshold);
        let exponent = u32::try_from(exponent).unwrap_or(u32::MAX);
        self.config
            .multiplier
            .saturating_pow(exponent)
            .saturating_mul(self.config.base_block_secs)
            .min(self.config.max_block_secs)
    }

    /// 检查是否允许尝试
    pub async fn check(&self, tenant_id: &str, identity: &str) -> AuthResult<BackoffDecision> {
        let blocked_until = self
            .store
            .get(&blocked_until_key(tenant_id, identity))
            .await?;

        let now = Utc::now().timestamp();
        match blocked_until {
            Some(until) if until > now => Ok(BackoffDecision::Block {
                retry_after: (until - now) as u64,
            }),
            _ => Ok(BackoffDecision::Admit),
        }
    }

    /// 记录一次失败，返回累计失败次数
    pub async fn record_failure(&self, tenant_id: &str, identity: &str) -> AuthResult<u64> {
        // 计数器的 TTL 不短于任何可能的封禁时长
        let counter_ttl = self
            .config
            .idle_ttl_secs
            .max(self.config.max_block_secs)
            .min(MAX_DURATION_SECS);
        let count = self
            .store
            .incr_with_expiry(&failures_key(tenant_id, identity), counter_ttl)
            .await?
            .max(0) as u64;

        if count >= self.config.threshold {
            let block = self.backoff_secs(count).min(MAX_DURATION_SECS);
            let until = Utc::now()
                .timestamp()
                .saturating_add(i64::try_from(block).unwrap_or(i64::MAX));
            let ttl = self.config.idle_ttl_secs.max(block).min(MAX_DURATION_SECS);
            let effective = self
                .store
                .set_max_with_expiry(&blocked_until_key(tenant_id, identity), until, ttl)
                .await?;

            warn!(
                "Login blocked for tenant {}: failures={}, blocked_until={}",
                tenant_id, count, effective
            );
        } else {
            debug!("Login failure recorded for tenant {}: failures={}", tenant_id, count);
        }

        Ok(count)
    }

    /// 登录成功后清除状态
    pub async fn reset(&self, tenant_id: &str, identity: &str) -> AuthResult<()> {
        self.store
            .delete(&[
                failures_key(tenant_id, identity),
                blocked_until_key(tenant_id, identity),
            ])
            .await
    }
}

//! IAM 凭证服务配置
//!
//! 令牌有效期、登录退避策略、退避状态存储以及请求级参数

use ks::KsServiceConfig;
use ks::storage::StorageConfig;
use serde::{Deserialize, Serialize};

/// IAM 服务配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IamConfig {
    /// 用户表存储配置
    ///
    /// 未配置时与 services.ks.storage 共用同一个数据库
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,

    /// 令牌配置
    #[serde(default)]
    pub token: TokenConfig,

    /// 登录失败退避策略
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// 退避状态存储
    #[serde(default)]
    pub backoff_store: BackoffStoreConfig,

    /// 单个请求的超时时间（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// 注册时的最小密码长度
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

impl Default for IamConfig {
    fn default() -> Self {
        Self {
            storage: None,
            token: TokenConfig::default(),
            backoff: BackoffConfig::default(),
            backoff_store: BackoffStoreConfig::default(),
            request_timeout_secs: default_request_timeout_secs(),
            min_password_length: default_min_password_length(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_min_password_length() -> usize {
    8
}

impl IamConfig {
    /// 获取用户表存储配置
    ///
    /// 1. 显式配置了 services.iam.storage 时直接使用
    /// 2. 否则回退到 services.ks.storage
    pub fn storage_config<'a>(&'a self, ks: &'a KsServiceConfig) -> &'a StorageConfig {
        self.storage.as_ref().unwrap_or(&ks.storage)
    }

    /// 校验 IAM 配置，返回错误与 "Warning:" 前缀的警告
    pub fn validate(&self, env: &str) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.token.validate());
        errors.extend(self.backoff.validate());

        if self.request_timeout_secs == 0 {
            errors.push("services.iam.request_timeout_secs must be greater than 0".to_string());
        }

        if self.min_password_length == 0 {
            errors.push("services.iam.min_password_length must be greater than 0".to_string());
        }

        match self.backoff_store.backend {
            BackoffStoreBackend::Memory => {
                if env == "prod" {
                    errors.push(
                        "Warning: in-memory backoff store is per-process; use backoff_store.backend = \"redis\" when running multiple instances"
                            .to_string(),
                    );
                }
            }
            BackoffStoreBackend::Redis => {
                if self.backoff_store.redis.url.trim().is_empty() {
                    errors.push(
                        "services.iam.backoff_store.redis.url is required when backend = \"redis\""
                            .to_string(),
                    );
                }
            }
        }

        errors
    }
}

/// 各类时长配置（秒）的上限：十年
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

fn check_duration(errors: &mut Vec<String>, field: &str, value: u64) {
    if value > MAX_DURATION_SECS {
        errors.push(format!(
            "{field} ({value}) must not exceed {MAX_DURATION_SECS} seconds"
        ));
    }
}

/// 令牌配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    /// 访问令牌有效期（秒），默认 15 分钟
    #[serde(default = "default_access_ttl_secs")]
    pub access_ttl_secs: u64,

    /// 刷新令牌有效期（秒），默认 7 天
    #[serde(default = "default_refresh_ttl_secs")]
    pub refresh_ttl_secs: u64,

    /// 校验 exp / iat 时允许的时钟偏差（秒）
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_ttl_secs: default_access_ttl_secs(),
            refresh_ttl_secs: default_refresh_ttl_secs(),
            leeway_secs: default_leeway_secs(),
        }
    }
}

fn default_access_ttl_secs() -> u64 {
    15 * 60
}

fn default_refresh_ttl_secs() -> u64 {
    7 * 24 * 3600
}

fn default_leeway_secs() -> u64 {
    60
}

impl TokenConfig {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.access_ttl_secs == 0 {
            errors.push("services.iam.token.access_ttl_secs must be greater than 0".to_string());
        }
        if self.refresh_ttl_secs == 0 {
            errors.push("services.iam.token.refresh_ttl_secs must be greater than 0".to_string());
        }
        check_duration(&mut errors, "services.iam.token.access_ttl_secs", self.access_ttl_secs);
        check_duration(&mut errors, "services.iam.token.refresh_ttl_secs", self.refresh_ttl_secs);
        check_duration(&mut errors, "services.iam.token.leeway_secs", self.leeway_secs);
        if self.access_ttl_secs >= self.refresh_ttl_secs {
            errors.push(format!(
                "Warning: access token TTL ({}s) is not shorter than refresh token TTL ({}s)",
                self.access_ttl_secs, self.refresh_ttl_secs
            ));
        }
        errors
    }
}

/// 登录失败退避策略
///
/// 失败次数达到 threshold 后开始封禁，封禁时长
/// `min(base_block_secs * multiplier^(count - threshold), max_block_secs)`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// 触发封禁的失败次数
    #[serde(default = "default_threshold")]
    pub threshold: u64,

    /// 首次封禁时长（秒）
    #[serde(default = "default_base_block_secs")]
    pub base_block_secs: u64,

    /// 每多失败一次封禁时长的倍数
    #[serde(default = "default_multiplier")]
    pub multiplier: u64,

    /// 封禁时长上限（秒）
    #[serde(default = "default_max_block_secs")]
    pub max_block_secs: u64,

    /// 计数器空闲过期时间（秒）
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            base_block_secs: default_base_block_secs(),
            multiplier: default_multiplier(),
            max_block_secs: default_max_block_secs(),
            idle_ttl_secs: default_idle_ttl_secs(),
        }
    }
}

fn default_threshold() -> u64 {
    5
}

fn default_base_block_secs() -> u64 {
    30
}

fn default_multiplier() -> u64 {
    2
}

fn default_max_block_secs() -> u64 {
    3600
}

fn default_idle_ttl_secs() -> u64 {
    3600
}

impl BackoffConfig {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.threshold == 0 {
            errors.push(
                "Warning: services.iam.backoff.threshold = 0 blocks every login after the first failure"
                    .to_string(),
            );
        }
        if self.multiplier == 0 {
            errors.push("services.iam.backoff.multiplier must be at least 1".to_string());
        }
        if self.max_block_secs < self.base_block_secs {
            errors.push(format!(
                "Warning: services.iam.backoff.max_block_secs ({}) is smaller than base_block_secs ({})",
                self.max_block_secs, self.base_block_secs
            ));
        }
        if self.idle_ttl_secs == 0 {
            errors.push("services.iam.backoff.idle_ttl_secs must be greater than 0".to_string());
        }
        check_duration(&mut errors, "services.iam.backoff.base_block_secs", self.base_block_secs);
        check_duration(&mut errors, "services.iam.backoff.max_block_secs", self.max_block_secs);
        check_duration(&mut errors, "services.iam.backoff.idle_ttl_secs", self.idle_ttl_secs);
        errors
    }
}

/// 退避状态存储后端
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStoreBackend {
    /// 进程内存（单实例部署）
    #[default]
    Memory,
    /// Redis（多实例共享）
    Redis,
}

/// 退避状态存储配置
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BackoffStoreConfig {
    #[serde(default)]
    pub backend: BackoffStoreBackend,

    #[serde(default)]
    pub redis: RedisBackoffConfig,
}

/// Redis 退避存储配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RedisBackoffConfig {
    /// Redis 连接 URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// 连接池大小
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// 获取连接的超时时间（毫秒）
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RedisBackoffConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    16
}

fn default_redis_timeout_ms() -> u64 {
    2000
}

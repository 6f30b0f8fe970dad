//! 统一配置管理系统
//!
//! 本模块是 Authrix 配置的"单一真理之源"。
//! 所有配置项的定义、文档、默认值都在这里统一管理。

pub mod bind;
pub mod iam;
pub mod services;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use crate::config::bind::BindConfig;
pub use crate::config::iam::{
    BackoffConfig, BackoffStoreBackend, BackoffStoreConfig, IamConfig, MAX_DURATION_SECS,
    RedisBackoffConfig, TokenConfig,
};
pub use crate::config::services::ServicesConfig;
use crate::error::ConfigError;
use ::ks::storage::{StorageBackend, StorageConfig};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Authrix 主配置结构体
///
/// 配置文件使用 TOML 格式，支持完整的类型安全加载。
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthrixConfig {
    /// 服务器实例名称
    ///
    /// 用于在日志中区分不同实例，如 authrix-01, authrix-prod-east-1 等。
    pub name: String,

    /// 运行环境标识
    ///
    /// - "dev": 开发环境
    /// - "prod": 生产环境，额外的安全检查
    /// - "test": 测试环境，用于自动化测试
    pub env: String,

    /// 网络绑定配置
    #[serde(default)]
    pub bind: BindConfig,

    /// 服务配置集合
    #[serde(default)]
    pub services: ServicesConfig,

    /// SQLite 数据库文件存储目录路径
    ///
    /// 密钥表与用户表默认存储在 `{sqlite_path}/authrix.db`。
    #[serde(
        default = "default_sqlite_path",
        serialize_with = "serialize_pathbuf",
        deserialize_with = "deserialize_pathbuf"
    )]
    pub sqlite_path: PathBuf,

    /// 可观测性配置（日志）
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// 可观测性配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObservabilityConfig {
    /// 过滤级别
    ///
    /// 支持 EnvFilter 语法（如 "info,sqlx=warn"）。默认值 "info"。
    #[serde(default = "default_filter_level")]
    pub filter_level: String,

    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    /// 日志输出目标
    ///
    /// - "console": 仅输出到控制台（默认）
    /// - "file": 输出到文件
    #[serde(default = "default_log_output")]
    pub output: String,

    /// 日志轮转开关
    ///
    /// 当 output = "file" 时有效：
    /// - true: 按天轮转日志文件
    /// - false: 追加到单个文件
    #[serde(default)]
    pub rotate: bool,

    /// 日志文件目录
    #[serde(default = "default_log_path")]
    pub path: String,

    /// 日志格式："text"（默认）或 "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            filter_level: default_filter_level(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: default_log_output(),
            rotate: false,
            path: default_log_path(),
            format: default_log_format(),
        }
    }
}

fn default_log_output() -> String {
    "console".to_string()
}

fn default_log_path() -> String {
    "logs/".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_filter_level() -> String {
    "info".to_string()
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("database")
}

fn serialize_pathbuf<S>(path: &Path, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    path.display().to_string().serialize(serializer)
}

fn deserialize_pathbuf<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(PathBuf::from(s))
}

impl Default for AuthrixConfig {
    fn default() -> Self {
        Self {
            name: "authrix-default".to_string(),
            env: "dev".to_string(),
            bind: BindConfig::default(),
            services: ServicesConfig::default(),
            sqlite_path: default_sqlite_path(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AuthrixConfig {
    /// 返回日志配置引用
    pub fn log_config(&self) -> &LogConfig {
        &self.observability.log
    }

    /// 检查是否使用控制台日志输出
    pub fn is_console_logging(&self) -> bool {
        self.observability.log.output == "console"
    }

    /// 检查是否应该轮转日志
    pub fn should_rotate_logs(&self) -> bool {
        self.observability.log.output == "file" && self.observability.log.rotate
    }

    /// 检查是否输出 JSON 格式日志
    pub fn is_json_logging(&self) -> bool {
        self.observability.log.format == "json"
    }

    /// 获取日志过滤级别，优先使用 RUST_LOG
    pub fn get_filter_level(&self) -> String {
        std::env::var("RUST_LOG")
            .ok()
            .and_then(|v| {
                let trimmed = v.trim().to_string();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed)
                }
            })
            .unwrap_or_else(|| self.observability.filter_level.clone())
    }

    /// IAM 用户表使用的存储配置
    pub fn iam_storage_config(&self) -> &StorageConfig {
        self.services.iam.storage_config(&self.services.ks)
    }

    /// HTTP 监听地址
    pub fn http_addr(&self) -> Result<SocketAddr, ConfigError> {
        let http = &self.bind.http;
        let ip: IpAddr = http.ip.parse().map_err(|_| ConfigError::InvalidValue {
            field: "bind.http.ip".to_string(),
            value: http.ip.clone(),
        })?;
        Ok(SocketAddr::new(ip, http.port))
    }

    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::FileNotFound {
                path: path_ref.display().to_string(),
            });
        }

        if !path_ref.is_file() {
            return Err(ConfigError::NotAFile {
                path: path_ref.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.display().to_string(),
            source,
        })?;

        Ok(Self::from_toml(&content)?)
    }

    /// 从 TOML 字符串加载配置
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 将配置序列化为 TOML 字符串
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    /// 验证配置有效性
    ///
    /// 返回的列表中以 "Warning:" 开头的条目只是警告，其余为错误。
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // 验证实例名称
        if self.name.trim().is_empty() {
            errors.push("Instance name cannot be empty".to_string());
        }

        // 验证环境
        if !["dev", "prod", "test"].contains(&self.env.as_str()) {
            errors.push(format!(
                "Invalid environment '{}', must be one of: dev, prod, test",
                self.env
            ));
        }

        // 验证过滤级别（EnvFilter 语法）
        {
            let main_level = self
                .observability
                .filter_level
                .split(',')
                .next()
                .unwrap_or("")
                .trim();
            if !["trace", "debug", "info", "warn", "error"].contains(&main_level) {
                errors.push(format!(
                    "Invalid filter level '{}', must start with one of: trace, debug, info, warn, error",
                    self.observability.filter_level
                ));
            }
        }

        // 验证日志输出
        if !["console", "file"].contains(&self.observability.log.output.as_str()) {
            errors.push(format!(
                "Invalid log output '{}' (observability.log.output), must be 'console' or 'file'",
                self.observability.log.output
            ));
        }

        if !["text", "json"].contains(&self.observability.log.format.as_str()) {
            errors.push(format!(
                "Invalid log format '{}' (observability.log.format), must be 'text' or 'json'",
                self.observability.log.format
            ));
        }

        // 验证监听地址
        if let Err(e) = self.http_addr() {
            errors.push(e.to_string());
        }

        // 验证 SQLite 路径
        if self
            .sqlite_path
            .to_str()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
        {
            errors.push("SQLite database path cannot be empty".to_string());
        }

        // 验证主密钥来源
        let ks = &self.services.ks;
        if ks.get_master_secret_source().is_none() {
            errors.push(
                "No master secret configured: set services.ks.master_secret_file, master_secret_env or master_secret"
                    .to_string(),
            );
        }

        // 验证存储配置
        for (name, storage) in [
            ("services.ks.storage", &ks.storage),
            ("services.iam.storage", self.iam_storage_config()),
        ] {
            match storage.backend {
                StorageBackend::Sqlite => {
                    if storage.sqlite.is_none() {
                        errors.push(format!(
                            "{name} is configured to use SQLite but sqlite config is missing"
                        ));
                    }
                }
                StorageBackend::Postgres => {
                    if storage.postgres.is_none() {
                        errors.push(format!(
                            "{name} is configured to use PostgreSQL but postgres config is missing"
                        ));
                    }
                }
            }
        }

        errors.extend(self.services.iam.validate(&self.env));

        // 生产环境额外检查
        if self.env == "prod" {
            if ks.master_secret.is_some()
                && ks.master_secret_env.is_none()
                && ks.master_secret_file.is_none()
            {
                errors.push("Warning: master secret is stored inline in the configuration file; use services.ks.master_secret_env or master_secret_file in production".to_string());
            }

            // 生产环境应使用文件日志
            if self.observability.log.output == "console" {
                errors.push("Warning: Production environment should use file logging (observability.log.output = \"file\")".to_string());
            }

            // 生产环境建议启用日志轮转
            if self.observability.log.output == "file" && !self.observability.log.rotate {
                errors.push("Warning: Production environment should enable log rotation (observability.log.rotate = true)".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

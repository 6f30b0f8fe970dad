//! 存储后端配置
//!
//! 关系型存储的配置结构，密钥表与用户表共用

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 存储后端类型
    pub backend: StorageBackend,

    /// SQLite 配置（当 backend = "sqlite" 时必需）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite: Option<SqliteConfig>,

    /// PostgreSQL 配置（当 backend = "postgres" 时必需）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite: Some(SqliteConfig::default()),
            postgres: None,
        }
    }
}

/// 存储后端类型枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite 数据库
    Sqlite,
    /// PostgreSQL 数据库
    Postgres,
}

/// SQLite 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// 数据库文件名
    ///
    /// 相对路径基于顶层 sqlite_path 目录解析，绝对路径原样使用
    #[serde(default = "default_sqlite_file")]
    pub path: String,

    /// 连接池大小
    #[serde(default = "default_sqlite_max_connections")]
    pub max_connections: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_sqlite_file(),
            max_connections: default_sqlite_max_connections(),
        }
    }
}

impl SqliteConfig {
    /// 解析数据库文件的实际路径
    pub fn resolve(&self, db_dir: &Path) -> PathBuf {
        db_dir.join(&self.path)
    }
}

fn default_sqlite_file() -> String {
    "authrix.db".to_string()
}

fn default_sqlite_max_connections() -> u32 {
    10
}

/// PostgreSQL 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// 数据库主机地址
    pub host: String,

    /// 数据库端口
    pub port: u16,

    /// 数据库名称
    pub database: String,

    /// 用户名
    pub username: String,

    /// 密码
    pub password: String,

    /// 连接池大小
    #[serde(default = "default_postgres_pool_size")]
    pub pool_size: u32,

    /// 连接最大生命周期（秒）
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "authrix".to_string(),
            username: "authrix".to_string(),
            password: "".to_string(),
            pool_size: default_postgres_pool_size(),
            max_lifetime_secs: default_max_lifetime_secs(),
        }
    }
}

impl PostgresConfig {
    /// 构建连接 URL
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}

fn default_postgres_pool_size() -> u32 {
    20
}

fn default_max_lifetime_secs() -> u64 {
    3600
}

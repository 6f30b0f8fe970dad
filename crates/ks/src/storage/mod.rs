//! KS 存储模块
//!
//! 租户签名密钥的持久化，支持 SQLite 与 PostgreSQL
//!
//! 外部写入方与 `import-key` 负责插入记录，服务端只按租户读取激活密钥。

use std::path::Path;

use async_trait::async_trait;

pub mod backend;
pub mod config;

// SQLite 始终可用
pub mod sqlite;

#[cfg(feature = "backend-postgres")]
pub mod postgres;

use crate::error::{KsError, KsResult};
use crate::types::TenantSigningKey;

pub use backend::KeyRepository;
pub use config::{PostgresConfig, SqliteConfig, StorageBackend, StorageConfig};

use sqlite::SqliteBackend;

#[cfg(feature = "backend-postgres")]
use postgres::PostgresBackend;

/// 密钥存储统一接口
#[derive(Clone, Debug)]
pub enum KeyStorage {
    /// SQLite 存储后端（始终可用）
    Sqlite(Box<SqliteBackend>),

    /// PostgreSQL 存储后端
    #[cfg(feature = "backend-postgres")]
    Postgres(PostgresBackend),
}

impl KeyStorage {
    /// 按 `config.backend` 打开密钥表，必要时建表
    ///
    /// SQLite 文件位于 `db_dir` 下（即 `sqlite_path`）；选择了未编译进来的
    /// 后端时返回 `KsError::Config`。
    pub async fn from_config<P: AsRef<Path>>(
        config: &StorageConfig,
        db_dir: P,
    ) -> KsResult<Self> {
        match config.backend {
            StorageBackend::Sqlite => {
                let cfg = config
                    .sqlite
                    .as_ref()
                    .ok_or_else(|| KsError::Config("Missing SQLite config".into()))?;
                let backend = SqliteBackend::new(cfg, db_dir.as_ref()).await?;
                Ok(Self::Sqlite(Box::new(backend)))
            }

            #[cfg(feature = "backend-postgres")]
            StorageBackend::Postgres => {
                let cfg = config
                    .postgres
                    .as_ref()
                    .ok_or_else(|| KsError::Config("Missing PostgreSQL config".into()))?;
                let backend = PostgresBackend::new(cfg).await?;
                Ok(Self::Postgres(backend))
            }

            #[cfg(not(feature = "backend-postgres"))]
            StorageBackend::Postgres => Err(KsError::Config(
                "PostgreSQL backend not enabled. Compile with --features backend-postgres".into(),
            )),
        }
    }

    /// 获取后端类型名称
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "SQLite",

            #[cfg(feature = "backend-postgres")]
            Self::Postgres(_) => "Postgres",
        }
    }
}

#[async_trait]
impl KeyRepository for KeyStorage {
    async fn init(&self) -> KsResult<()> {
        match self {
            Self::Sqlite(b) => b.init().await,

            #[cfg(feature = "backend-postgres")]
            Self::Postgres(b) => b.init().await,
        }
    }

    async fn active_key(&self, tenant_id: &str) -> KsResult<Option<TenantSigningKey>> {
        match self {
            Self::Sqlite(b) => b.active_key(tenant_id).await,

            #[cfg(feature = "backend-postgres")]
            Self::Postgres(b) => b.active_key(tenant_id).await,
        }
    }

    async fn insert_key(&self, key: &TenantSigningKey) -> KsResult<()> {
        match self {
            Self::Sqlite(b) => b.insert_key(key).await,

            #[cfg(feature = "backend-postgres")]
            Self::Postgres(b) => b.insert_key(key).await,
        }
    }
}

//! SQLite 存储后端实现
//!
//! 使用 sqlx 提供原生异步 SQLite 存储支持

use crate::error::{KsError, KsResult};
use crate::storage::backend::KeyRepository;
use crate::storage::config::SqliteConfig;
use crate::types::TenantSigningKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// 打开 SQLite 连接池（WAL 模式）
///
/// 密钥仓库与用户仓库共用此函数，保证两者的连接参数一致。
pub async fn open_pool(config: &SqliteConfig, db_dir: &Path) -> Result<SqlitePool, sqlx::Error> {
    let file = config.resolve(db_dir);

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", file.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    debug!("SQLite pool opened: path={}", file.display());
    Ok(pool)
}

/// 时间戳（秒）转换为 UTC 时间
pub(crate) fn timestamp_to_datetime(secs: i64) -> KsResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| KsError::Internal(format!("Invalid timestamp in key record: {secs}")))
}

type KeyRow = (String, String, String, String, String, String, bool, i64);

fn row_to_key(row: KeyRow) -> KsResult<TenantSigningKey> {
    let (id, tenant_id, key_id, public_key_pem, encrypted_private_key, algorithm, is_active, created_at) =
        row;
    Ok(TenantSigningKey {
        id,
        tenant_id,
        key_id,
        public_key_pem,
        encrypted_private_key,
        algorithm,
        is_active,
        created_at: timestamp_to_datetime(created_at)?,
    })
}

/// SQLite 存储后端
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl SqliteBackend {
    /// 创建新的 SQLite 后端实例
    ///
    /// # Arguments
    /// * `config` - SQLite 配置
    /// * `db_dir` - 数据库文件存储目录路径（来自 AuthrixConfig.sqlite_path）
    pub async fn new(config: &SqliteConfig, db_dir: &Path) -> KsResult<Self> {
        let pool = open_pool(config, db_dir).await?;
        let backend = Self::from_pool(pool).await?;

        info!(
            "SQLite key storage initialized: path={}, WAL mode enabled",
            config.resolve(db_dir).display()
        );

        Ok(backend)
    }

    /// 基于已有连接池创建后端并初始化表结构
    pub async fn from_pool(pool: SqlitePool) -> KsResult<Self> {
        let backend = Self { pool };
        backend.init().await?;
        Ok(backend)
    }
}

#[async_trait]
impl KeyRepository for SqliteBackend {
    async fn init(&self) -> KsResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenant_signing_keys (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                key_id TEXT NOT NULL,
                public_key_pem TEXT NOT NULL,
                encrypted_private_key TEXT NOT NULL,
                algorithm TEXT NOT NULL DEFAULT 'RS256',
                is_active INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| KsError::Internal(format!("Failed to create tenant_signing_keys table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_signing_keys_tenant_active \
             ON tenant_signing_keys(tenant_id, is_active)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| KsError::Internal(format!("Failed to create index: {e}")))?;

        debug!("SQLite signing key tables and indexes initialized");
        Ok(())
    }

    async fn active_key(&self, tenant_id: &str) -> KsResult<Option<TenantSigningKey>> {
        let row = sqlx::query_as::<_, KeyRow>(
            r#"SELECT id, tenant_id, key_id, public_key_pem, encrypted_private_key,
                      algorithm, is_active, created_at
               FROM tenant_signing_keys
               WHERE tenant_id = ? AND is_active = 1
               ORDER BY created_at DESC
               LIMIT 1"#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let key = row_to_key(row)?;
                debug!(
                    "Found active key for tenant {}: kid={}",
                    tenant_id, key.key_id
                );
                Ok(Some(key))
            }
            None => {
                debug!("No active key found for tenant {}", tenant_id);
                Ok(None)
            }
        }
    }

    async fn insert_key(&self, key: &TenantSigningKey) -> KsResult<()> {
        let mut tx = self.pool.begin().await?;

        if key.is_active {
            sqlx::query("UPDATE tenant_signing_keys SET is_active = 0 WHERE tenant_id = ?")
                .bind(&key.tenant_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"INSERT INTO tenant_signing_keys
               (id, tenant_id, key_id, public_key_pem, encrypted_private_key, algorithm, is_active, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        )
        .bind(&key.id)
        .bind(&key.tenant_id)
        .bind(&key.key_id)
        .bind(&key.public_key_pem)
        .bind(&key.encrypted_private_key)
        .bind(&key.algorithm)
        .bind(key.is_active)
        .bind(key.created_at.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "Stored signing key for tenant {}: kid={}, active={}",
            key.tenant_id, key.key_id, key.is_active
        );
        Ok(())
    }
}

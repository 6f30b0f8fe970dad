//! PostgreSQL 存储后端实现
//!
//! 使用 sqlx 提供 PostgreSQL 存储支持

use crate::error::{KsError, KsResult};
use crate::storage::backend::KeyRepository;
use crate::storage::config::PostgresConfig;
use crate::storage::sqlite::timestamp_to_datetime;
use crate::types::TenantSigningKey;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

/// 打开 PostgreSQL 连接池
pub async fn open_pool(config: &PostgresConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.pool_size)
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .connect(&config.url())
        .await
}

/// PostgreSQL 存储后端
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl PostgresBackend {
    /// 创建新的 PostgreSQL 后端实例
    pub async fn new(config: &PostgresConfig) -> KsResult<Self> {
        let pool = open_pool(config)
            .await
            .map_err(|e| KsError::Internal(format!("Failed to connect to PostgreSQL: {e}")))?;

        let backend = Self { pool };
        backend.init().await?;

        info!(
            "PostgreSQL key storage initialized: host={}:{}, db={}",
            config.host, config.port, config.database
        );

        Ok(backend)
    }
}

type KeyRow = (String, String, String, String, String, String, bool, i64);

#[async_trait]
impl KeyRepository for PostgresBackend {
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
                is_active BOOLEAN NOT NULL DEFAULT FALSE,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| KsError::Internal(format!("Failed to create tenant_signing_keys table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_signing_keys_tenant_active \
             ON tenant_signing_keys(tenant_id) WHERE is_active",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| KsError::Internal(format!("Failed to create index: {e}")))?;

        debug!("PostgreSQL signing key tables and indexes initialized");
        Ok(())
    }

    async fn active_key(&self, tenant_id: &str) -> KsResult<Option<TenantSigningKey>> {
        let row = sqlx::query_as::<_, KeyRow>(
            r#"SELECT id, tenant_id, key_id, public_key_pem, encrypted_private_key,
                      algorithm, is_active, created_at
               FROM tenant_signing_keys
               WHERE tenant_id = $1 AND is_active = TRUE
               ORDER BY created_at DESC
               LIMIT 1"#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((
            id,
            tenant_id,
            key_id,
            public_key_pem,
            encrypted_private_key,
            algorithm,
            is_active,
            created_at,
        )) = row
        else {
            debug!("No active key found for tenant {} in PostgreSQL", tenant_id);
            return Ok(None);
        };

        Ok(Some(TenantSigningKey {
            id,
            tenant_id,
            key_id,
            public_key_pem,
            encrypted_private_key,
            algorithm,
            is_active,
            created_at: timestamp_to_datetime(created_at)?,
        }))
    }

    async fn insert_key(&self, key: &TenantSigningKey) -> KsResult<()> {
        let mut tx = self.pool.begin().await?;

        if key.is_active {
            sqlx::query("UPDATE tenant_signing_keys SET is_active = FALSE WHERE tenant_id = $1")
                .bind(&key.tenant_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"INSERT INTO tenant_signing_keys
               (id, tenant_id, key_id, public_key_pem, encrypted_private_key, algorithm, is_active, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
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
            "Stored signing key for tenant {} in PostgreSQL: kid={}, active={}",
            key.tenant_id, key.key_id, key.is_active
        );
        Ok(())
    }
}

//! SQLite 用户仓库

use crate::error::{AuthError, AuthResult};
use crate::storage::backend::UserRepository;
use crate::storage::{USER_COLUMNS, UserRow, map_insert_error, row_to_user};
use crate::user::TenantUser;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ks::storage::SqliteConfig;
use sqlx::sqlite::SqlitePool;
use std::path::Path;
use tracing::{debug, info};

/// SQLite 用户仓库
#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteUserRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteUserRepository")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl SqliteUserRepository {
    /// 打开数据库并初始化表结构
    ///
    /// 与密钥仓库使用相同的连接参数，默认落在同一个数据库文件中。
    pub async fn new(config: &SqliteConfig, db_dir: &Path) -> AuthResult<Self> {
        let pool = ks::storage::sqlite::open_pool(config, db_dir).await?;
        let repository = Self::from_pool(pool).await?;

        info!(
            "SQLite user storage initialized: path={}",
            config.resolve(db_dir).display()
        );
        Ok(repository)
    }

    pub async fn from_pool(pool: SqlitePool) -> AuthResult<Self> {
        let repository = Self { pool };
        repository.init().await?;
        Ok(repository)
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn init(&self) -> AuthResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenant_users (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                issuer_id TEXT NOT NULL,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                is_verified INTEGER NOT NULL DEFAULT 0,
                token_version INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                last_login_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Storage(format!("Failed to create tenant_users table: {e}")))?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_tenant_users_email \
             ON tenant_users(tenant_id, email)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Storage(format!("Failed to create index: {e}")))?;

        debug!("SQLite user tables and indexes initialized");
        Ok(())
    }

    async fn exists_by_email(&self, tenant_id: &str, email: &str) -> AuthResult<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tenant_users WHERE tenant_id = ? AND email = ?")
                .bind(tenant_id)
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn create(&self, user: &TenantUser) -> AuthResult<()> {
        sqlx::query(
            r#"INSERT INTO tenant_users
               (id, tenant_id, issuer_id, name, email, password_hash, role,
                is_verified, token_version, created_at, last_login_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
        )
        .bind(&user.id)
        .bind(&user.tenant_id)
        .bind(&user.issuer_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.is_verified)
        .bind(user.token_version)
        .bind(user.created_at.timestamp())
        .bind(user.last_login_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        debug!("Created user {} in tenant {}", user.id, user.tenant_id);
        Ok(())
    }

    async fn get_by_email(&self, tenant_id: &str, email: &str) -> AuthResult<Option<TenantUser>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM tenant_users WHERE tenant_id = ? AND email = ?"
        ))
        .bind(tenant_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_user).transpose()
    }

    async fn get_by_id(&self, tenant_id: &str, user_id: &str) -> AuthResult<Option<TenantUser>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM tenant_users WHERE tenant_id = ? AND id = ?"
        ))
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_user).transpose()
    }

    async fn increment_token_version(
        &self,
        tenant_id: &str,
        user_id: &str,
        expected: Option<i64>,
    ) -> AuthResult<Option<i64>> {
        let row: Option<(i64,)> = match expected {
            Some(version) => {
                sqlx::query_as(
                    "UPDATE tenant_users SET token_version = token_version + 1 \
                     WHERE tenant_id = ? AND id = ? AND token_version = ? \
                     RETURNING token_version",
                )
                .bind(tenant_id)
                .bind(user_id)
                .bind(version)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "UPDATE tenant_users SET token_version = token_version + 1 \
                     WHERE tenant_id = ? AND id = ? \
                     RETURNING token_version",
                )
                .bind(tenant_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(row.map(|(version,)| version))
    }

    async fn touch_last_login(
        &self,
        tenant_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> AuthResult<()> {
        sqlx::query("UPDATE tenant_users SET last_login_at = ? WHERE tenant_id = ? AND id = ?")
            .bind(at.timestamp())
            .bind(tenant_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

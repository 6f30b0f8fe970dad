//! PostgreSQL 用户仓库

use crate::error::{AuthError, AuthResult};
use crate::storage::backend::UserRepository;
use crate::storage::{USER_COLUMNS, UserRow, map_insert_error, row_to_user};
use crate::user::TenantUser;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ks::storage::PostgresConfig;
use sqlx::postgres::PgPool;
use tracing::{debug, info};

/// PostgreSQL 用户仓库
#[derive(Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresUserRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresUserRepository")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl PostgresUserRepository {
    pub async fn new(config: &PostgresConfig) -> AuthResult<Self> {
        let pool = ks::storage::postgres::open_pool(config)
            .await
            .map_err(|e| AuthError::Storage(format!("Failed to connect to PostgreSQL: {e}")))?;

        let repository = Self { pool };
        repository.init().await?;

        info!(
            "PostgreSQL user storage initialized: host={}:{}, db={}",
            config.host, config.port, config.database
        );
        Ok(repository)
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
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
                is_verified BOOLEAN NOT NULL DEFAULT FALSE,
                token_version BIGINT NOT NULL DEFAULT 0,
                created_at BIGINT NOT NULL,
                last_login_at BIGINT
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

        debug!("PostgreSQL user tables and indexes initialized");
        Ok(())
    }

    async fn exists_by_email(&self, tenant_id: &str, email: &str) -> AuthResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM tenant_users WHERE tenant_id = $1 AND email = $2)",
        )
        .bind(tenant_id)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create(&self, user: &TenantUser) -> AuthResult<()> {
        sqlx::query(
            r#"INSERT INTO tenant_users
               (id, tenant_id, issuer_id, name, email, password_hash, role,
                is_verified, token_version, created_at, last_login_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
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
        Ok(())
    }

    async fn get_by_email(&self, tenant_id: &str, email: &str) -> AuthResult<Option<TenantUser>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM tenant_users WHERE tenant_id = $1 AND email = $2"
        ))
        .bind(tenant_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_user).transpose()
    }

    async fn get_by_id(&self, tenant_id: &str, user_id: &str) -> AuthResult<Option<TenantUser>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM tenant_users WHERE tenant_id = $1 AND id = $2"
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
        let version: Option<i64> = sqlx::query_scalar(
            "UPDATE tenant_users SET token_version = token_version + 1 \
             WHERE tenant_id = $1 AND id = $2 AND ($3::BIGINT IS NULL OR token_version = $3) \
             RETURNING token_version",
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(expected)
        .fetch_optional(&self.pool)
        .await?;
        Ok(version)
    }

    async fn touch_last_login(
        &self,
        tenant_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> AuthResult<()> {
        sqlx::query("UPDATE tenant_users SET last_login_at = $1 WHERE tenant_id = $2 AND id = $3")
            .bind(at.timestamp())
            .bind(tenant_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::Role;

    fn test_config() -> PostgresConfig {
        PostgresConfig {
            host: std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("POSTGRES_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            database: std::env::var("POSTGRES_DB").unwrap_or_else(|_| "authrix_test".to_string()),
            username: std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("POSTGRES_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
            pool_size: 5,
            max_lifetime_secs: 3600,
        }
    }

    #[tokio::test]
    #[ignore] // 需要 PostgreSQL 服务器
    async fn test_user_lifecycle() {
        let repo = PostgresUserRepository::new(&test_config()).await.unwrap();
        sqlx::query("TRUNCATE TABLE tenant_users")
            .execute(&repo.pool)
            .await
            .unwrap();

        let user = TenantUser {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: "project-0001".to_string(),
            issuer_id: "provider-0001".to_string(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "c2FsdA.aGFzaA".to_string(),
            role: Role::Owner,
            is_verified: false,
            token_version: 0,
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            last_login_at: None,
        };
        repo.create(&user).await.unwrap();
        assert!(matches!(
            repo.create(&user).await,
            Err(AuthError::EmailTaken)
        ));

        assert_eq!(
            repo.increment_token_version("project-0001", &user.id, Some(0))
                .await
                .unwrap(),
            Some(1)
        );
        assert_eq!(
            repo.increment_token_version("project-0001", &user.id, Some(0))
                .await
                .unwrap(),
            None
        );
    }
}

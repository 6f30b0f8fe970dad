//! IAM 用户存储
//!
//! - `UserRepository` trait 定义统一的异步接口
//! - `UserStorage` enum 封装 SQLite / PostgreSQL 实现
//! - 存储配置与 KS 共用 `ks::storage::StorageConfig`

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ks::storage::{StorageBackend, StorageConfig};

pub mod backend;
pub mod sqlite;

#[cfg(feature = "backend-postgres")]
pub mod postgres;

use crate::error::{AuthError, AuthResult};
use crate::user::{Role, TenantUser};

pub use backend::UserRepository;
use sqlite::SqliteUserRepository;

#[cfg(feature = "backend-postgres")]
use postgres::PostgresUserRepository;

pub(crate) const USER_COLUMNS: &str = "id, tenant_id, issuer_id, name, email, password_hash, role, \
     is_verified, token_version, created_at, last_login_at";

pub(crate) type UserRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    bool,
    i64,
    i64,
    Option<i64>,
);

fn timestamp(secs: i64) -> AuthResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::Storage(format!("Invalid timestamp in user record: {secs}")))
}

pub(crate) fn row_to_user(row: UserRow) -> AuthResult<TenantUser> {
    let (
        id,
        tenant_id,
        issuer_id,
        name,
        email,
        password_hash,
        role,
        is_verified,
        token_version,
        created_at,
        last_login_at,
    ) = row;

    Ok(TenantUser {
        id,
        tenant_id,
        issuer_id,
        name,
        email,
        password_hash,
        role: Role::from_str(&role).map_err(AuthError::Storage)?,
        is_verified,
        token_version,
        created_at: timestamp(created_at)?,
        last_login_at: last_login_at.map(timestamp).transpose()?,
    })
}

/// 唯一约束冲突映射为 `EmailTaken`
pub(crate) fn map_insert_error(err: sqlx::Error) -> AuthError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AuthError::EmailTaken,
        _ => AuthError::from(err),
    }
}

/// 用户存储统一接口
#[derive(Clone, Debug)]
pub enum UserStorage {
    /// SQLite 存储后端（始终可用）
    Sqlite(Box<SqliteUserRepository>),

    /// PostgreSQL 存储后端
    #[cfg(feature = "backend-postgres")]
    Postgres(PostgresUserRepository),
}

impl UserStorage {
    /// 从配置创建存储实例
    ///
    /// # Arguments
    /// * `config` - 存储配置（services.iam.storage，缺省时为 services.ks.storage）
    /// * `db_dir` - SQLite 数据库目录
    pub async fn from_config<P: AsRef<Path>>(
        config: &StorageConfig,
        db_dir: P,
    ) -> AuthResult<Self> {
        match config.backend {
            StorageBackend::Sqlite => {
                let cfg = config
                    .sqlite
                    .as_ref()
                    .ok_or_else(|| AuthError::Internal("Missing SQLite config".into()))?;
                let repository = SqliteUserRepository::new(cfg, db_dir.as_ref()).await?;
                Ok(Self::Sqlite(Box::new(repository)))
            }

            #[cfg(feature = "backend-postgres")]
            StorageBackend::Postgres => {
                let cfg = config
                    .postgres
                    .as_ref()
                    .ok_or_else(|| AuthError::Internal("Missing PostgreSQL config".into()))?;
                let repository = PostgresUserRepository::new(cfg).await?;
                Ok(Self::Postgres(repository))
            }

            #[cfg(not(feature = "backend-postgres"))]
            StorageBackend::Postgres => Err(AuthError::Internal(
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

    fn inner(&self) -> &dyn UserRepository {
        match self {
            Self::Sqlite(r) => r.as_ref(),

            #[cfg(feature = "backend-postgres")]
            Self::Postgres(r) => r,
        }
    }
}

#[async_trait]
impl UserRepository for UserStorage {
    async fn init(&self) -> AuthResult<()> {
        self.inner().init().await
    }

    async fn exists_by_email(&self, tenant_id: &str, email: &str) -> AuthResult<bool> {
        self.inner().exists_by_email(tenant_id, email).await
    }

    async fn create(&self, user: &TenantUser) -> AuthResult<()> {
        self.inner().create(user).await
    }

    async fn get_by_email(&self, tenant_id: &str, email: &str) -> AuthResult<Option<TenantUser>> {
        self.inner().get_by_email(tenant_id, email).await
    }

    async fn get_by_id(&self, tenant_id: &str, user_id: &str) -> AuthResult<Option<TenantUser>> {
        self.inner().get_by_id(tenant_id, user_id).await
    }

    async fn increment_token_version(
        &self,
        tenant_id: &str,
        user_id: &str,
        expected: Option<i64>,
    ) -> AuthResult<Option<i64>> {
        self.inner()
            .increment_token_version(tenant_id, user_id, expected)
            .await
    }

    async fn touch_last_login(
        &self,
        tenant_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> AuthResult<()> {
        self.inner().touch_last_login(tenant_id, user_id, at).await
    }
}

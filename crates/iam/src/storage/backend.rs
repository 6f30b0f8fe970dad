//! 用户仓库抽象接口

use crate::error::AuthResult;
use crate::user::TenantUser;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 租户用户仓库
///
/// 查询不到记录返回 `Ok(None)`，不是错误。所有查询都以 tenant_id 为范围。
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 创建表、索引
    async fn init(&self) -> AuthResult<()>;

    /// 邮箱是否已注册（email 需已规范化）
    async fn exists_by_email(&self, tenant_id: &str, email: &str) -> AuthResult<bool>;

    /// 写入新用户
    ///
    /// 违反 (tenant_id, email) 唯一约束时返回 `EmailTaken`
    async fn create(&self, user: &TenantUser) -> AuthResult<()>;

    async fn get_by_email(&self, tenant_id: &str, email: &str) -> AuthResult<Option<TenantUser>>;

    async fn get_by_id(&self, tenant_id: &str, user_id: &str) -> AuthResult<Option<TenantUser>>;

    /// 原子递增 token_version
    ///
    /// `expected` 为 `Some(v)` 时仅当当前值等于 v 才递增。
    ///
    /// # Returns
    /// * `Ok(Some(new_version))` - 递增成功
    /// * `Ok(None)` - 用户不存在或版本不匹配
    async fn increment_token_version(
        &self,
        tenant_id: &str,
        user_id: &str,
        expected: Option<i64>,
    ) -> AuthResult<Option<i64>>;

    /// 更新最后登录时间
    async fn touch_last_login(
        &self,
        tenant_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> AuthResult<()>;
}

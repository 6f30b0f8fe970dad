//! 租户用户模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Owner,
    Admin,
    #[default]
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "OWNER",
            Role::Admin => "ADMIN",
            Role::Member => "MEMBER",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OWNER" => Ok(Role::Owner),
            "ADMIN" => Ok(Role::Admin),
            "MEMBER" => Ok(Role::Member),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// 租户用户
///
/// (tenant_id, email) 唯一；token_version 只增不减，递增即吊销该用户已签发的全部令牌。
#[derive(Clone, PartialEq, Eq)]
pub struct TenantUser {
    pub id: String,
    pub tenant_id: String,
    /// 创建该用户的 provider
    pub issuer_id: String,
    pub name: String,
    /// 已规范化（去空白 + 小写）
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_verified: bool,
    pub token_version: i64,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for TenantUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantUser")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("issuer_id", &self.issuer_id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("token_version", &self.token_version)
            .finish_non_exhaustive()
    }
}

/// 对外返回的用户视图，不含密码哈希与 token_version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub tenant_id: String,
    pub issuer_id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&TenantUser> for UserView {
    fn from(user: &TenantUser) -> Self {
        Self {
            id: user.id.clone(),
            tenant_id: user.tenant_id.clone(),
            issuer_id: user.issuer_id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            is_verified: user.is_verified,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

/// 邮箱规范化：去除首尾空白并转小写
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

//! 凭证编排服务
//!
//! 组合用户仓库、密钥托管、登录退避与令牌服务，实现
//! register / login / refresh / logout / authenticate 五个流程。
//!
//! token_version 是吊销的唯一依据：refresh 与 logout 都会递增它，
//! 递增后该用户此前签发的所有令牌在 refresh / authenticate 时都会被拒绝。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use ks::KeyCustodian;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backoff::{BackoffDecision, BackoffGuard};
use crate::error::{AuthError, AuthResult};
use crate::password::{hash_password_blocking, verify_dummy_blocking, verify_password_blocking};
use crate::storage::UserRepository;
use crate::token::{TokenClaims, TokenPair, TokenService};
use crate::user::{Role, TenantUser, UserView, normalize_email};

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(email))
}

/// 注册输入
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

impl RegisterInput {
    fn validate(&self, min_password_length: usize) -> AuthResult<()> {
        let mut fields = BTreeMap::new();

        if self.name.trim().is_empty() {
            fields.insert("name".to_string(), "name is required".to_string());
        }

        let email = self.email.trim();
        if email.is_empty() {
            fields.insert("email".to_string(), "email is required".to_string());
        } else if !is_valid_email(email) {
            fields.insert("email".to_string(), "email format is invalid".to_string());
        }

        if self.password.is_empty() {
            fields.insert("password".to_string(), "password is required".to_string());
        } else if self.password.chars().count() < min_password_length {
            fields.insert(
                "password".to_string(),
                format!("password must be at least {min_password_length} characters"),
            );
        }

        if fields.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Validation(fields))
        }
    }
}

/// 登录/注册成功后的会话
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user: UserView,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// 凭证编排服务
#[derive(Clone)]
pub struct CredentialService {
    users: Arc<dyn UserRepository>,
    custodian: KeyCustodian,
    backoff: BackoffGuard,
    tokens: TokenService,
    min_password_length: usize,
}

impl std::fmt::Debug for CredentialService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialService")
            .field("custodian", &self.custodian)
            .field("backoff", &self.backoff)
            .field("tokens", &self.tokens)
            .field("min_password_length", &self.min_password_length)
            .finish_non_exhaustive()
    }
}

impl CredentialService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        custodian: KeyCustodian,
        backoff: BackoffGuard,
        tokens: TokenService,
        min_password_length: usize,
    ) -> Self {
        Self {
            users,
            custodian,
            backoff,
            tokens,
            min_password_length,
        }
    }

    /// 用户仓库
    pub fn users(&self) -> &Arc<dyn UserRepository> {
        &self.users
    }

    /// 注册新用户并签发初始令牌
    ///
    /// 用户写入后若取签名密钥失败，不回滚用户记录；调用方可改用 login 重试。
    pub async fn register(
        &self,
        tenant_id: &str,
        issuer_id: &str,
        input: RegisterInput,
    ) -> AuthResult<AuthSession> {
        input.validate(self.min_password_length)?;
        let email = normalize_email(&input.email);

        if self.users.exists_by_email(tenant_id, &email).await? {
            debug!("Register rejected for tenant {}: email taken", tenant_id);
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password_blocking(input.password).await?;
        let user = TenantUser {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            issuer_id: issuer_id.to_string(),
            name: input.name.trim().to_string(),
            email,
            password_hash,
            role: input.role.unwrap_or_default(),
            is_verified: false,
            token_version: 0,
            created_at: Utc::now(),
            last_login_at: None,
        };

        // 并发注册越过预检查时由唯一索引兜底，同样映射为 EmailTaken
        self.users.create(&user).await?;

        let key = self.custodian.signing_key(tenant_id).await?;
        let tokens = self
            .tokens
            .issue_pair(&user.id, &user.email, user.role, user.token_version, &key)?;

        info!(
            "User registered: tenant={}, user_id={}, role={}",
            tenant_id, user.id, user.role
        );

        Ok(AuthSession {
            user: UserView::from(&user),
            tokens,
        })
    }

    /// 邮箱密码登录
    pub async fn login(&self, tenant_id: &str, email: &str, password: &str) -> AuthResult<AuthSession> {
        let mut fields = BTreeMap::new();
        if email.trim().is_empty() {
            fields.insert("email".to_string(), "email is required".to_string());
        }
        if password.is_empty() {
            fields.insert("password".to_string(), "password is required".to_string());
        }
        if !fields.is_empty() {
            return Err(AuthError::Validation(fields));
        }

        let email = normalize_email(email);

        if let BackoffDecision::Block { retry_after } = self.backoff.check(tenant_id, &email).await? {
            warn!(
                "Login attempt while blocked: tenant={}, retry_after={}s",
                tenant_id, retry_after
            );
            return Err(AuthError::TooManyAttempts { retry_after });
        }

        let Some(mut user) = self.users.get_by_email(tenant_id, &email).await? else {
            verify_dummy_blocking(password.to_string()).await?;
            let failures = self.backoff.record_failure(tenant_id, &email).await?;
            warn!(
                "Login failed for tenant {}: unknown email, failures={}",
                tenant_id, failures
            );
            return Err(AuthError::InvalidCredentials);
        };

        let matched =
            verify_password_blocking(user.password_hash.clone(), password.to_string()).await?;
        if !matched {
            let failures = self.backoff.record_failure(tenant_id, &email).await?;
            warn!(
                "Login failed for tenant {}: user_id={}, failures={}",
                tenant_id, user.id, failures
            );
            return Err(AuthError::InvalidCredentials);
        }

        self.backoff.reset(tenant_id, &email).await?;

        let now = Utc::now();
        match self.users.touch_last_login(tenant_id, &user.id, now).await {
            Ok(()) => user.last_login_at = Some(now),
            Err(e) => warn!(
                "Failed to update last login for tenant {} user {}: {}",
                tenant_id, user.id, e
            ),
        }

        let key = self.custodian.signing_key(tenant_id).await?;
        let tokens = self
            .tokens
            .issue_pair(&user.id, &user.email, user.role, user.token_version, &key)?;

        info!("User logged in: tenant={}, user_id={}", tenant_id, user.id);

        Ok(AuthSession {
            user: UserView::from(&user),
            tokens,
        })
    }

    async fn verify(&self, tenant_id: &str, token: &str) -> AuthResult<TokenClaims> {
        let key = self.custodian.verification_key(tenant_id).await?;
        self.tokens.verify(token, &key)
    }

    /// 刷新令牌
    ///
    /// 刷新令牌只能使用一次：成功后 token_version 递增，旧令牌立即失效。
    pub async fn refresh(&self, tenant_id: &str, refresh_token: &str) -> AuthResult<TokenPair> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::invalid_field(
                "refreshToken",
                "refreshToken is required",
            ));
        }

        let claims = self
            .verify(tenant_id, refresh_token)
            .await
            .map_err(|e| {
                if e.is_token_error() {
                    debug!("Refresh token rejected for tenant {}: {}", tenant_id, e);
                    AuthError::InvalidRefreshToken
                } else {
                    e
                }
            })?;

        if !claims.is_refresh_token() {
            debug!(
                "Access token presented to refresh for tenant {}: user_id={}",
                tenant_id, claims.user_id
            );
            return Err(AuthError::InvalidRefreshToken);
        }

        let user = self
            .users
            .get_by_id(tenant_id, &claims.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if claims.token_version != user.token_version {
            warn!(
                "Stale refresh token for tenant {}: user_id={}, token_version={}, current={}",
                tenant_id, user.id, claims.token_version, user.token_version
            );
            return Err(AuthError::TokenRevoked);
        }

        // 以观察到的版本为条件递增，并发刷新同一令牌只有一个能成功
        let Some(version) = self
            .users
            .increment_token_version(tenant_id, &user.id, Some(claims.token_version))
            .await?
        else {
            warn!(
                "Concurrent refresh lost for tenant {}: user_id={}",
                tenant_id, user.id
            );
            return Err(AuthError::TokenRevoked);
        };

        let key = self.custodian.signing_key(tenant_id).await?;
        let tokens = self
            .tokens
            .issue_pair(&user.id, &user.email, user.role, version, &key)?;

        debug!(
            "Tokens refreshed: tenant={}, user_id={}, token_version={}",
            tenant_id, user.id, version
        );
        Ok(tokens)
    }

    /// 登出：吊销该用户在该租户下的全部令牌
    pub async fn logout(&self, tenant_id: &str, access_token: &str) -> AuthResult<()> {
        let claims = self.verify(tenant_id, access_token).await?;

        let version = self
            .users
            .increment_token_version(tenant_id, &claims.user_id, None)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        info!(
            "User logged out: tenant={}, user_id={}, token_version={}",
            tenant_id, claims.user_id, version
        );
        Ok(())
    }

    /// 校验访问令牌并返回当前用户
    pub async fn authenticate(&self, tenant_id: &str, access_token: &str) -> AuthResult<TenantUser> {
        let claims = self.verify(tenant_id, access_token).await?;

        let user = self
            .users
            .get_by_id(tenant_id, &claims.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if claims.token_version != user.token_version {
            return Err(AuthError::TokenRevoked);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.io"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("al ice@example.com"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn test_register_input_validation() {
        let input = RegisterInput {
            name: " ".into(),
            email: "not-an-email".into(),
            password: "short".into(),
            role: None,
        };
        let Err(AuthError::Validation(fields)) = input.validate(8) else {
            panic!("expected validation error");
        };
        assert_eq!(fields.len(), 3);
        assert!(fields["password"].contains("at least 8"));

        let input = RegisterInput {
            name: "Alice".into(),
            email: " Alice@Example.com ".into(),
            password: "correct horse".into(),
            role: Some(Role::Owner),
        };
        assert!(input.validate(8).is_ok());
    }

    #[test]
    fn test_register_input_missing_fields() {
        let Err(AuthError::Validation(fields)) = RegisterInput::default().validate(8) else {
            panic!("expected validation error");
        };
        assert_eq!(fields["name"], "name is required");
        assert_eq!(fields["email"], "email is required");
        assert_eq!(fields["password"], "password is required");
    }

    #[test]
    fn test_session_json_shape() {
        let user = TenantUser {
            id: "u1".into(),
            tenant_id: "project-0001".into(),
            issuer_id: "provider-0001".into(),
            name: "Alice".into(),
            email: "alice@example.com".into(),
            password_hash: "secret-hash".into(),
            role: Role::Member,
            is_verified: false,
            token_version: 4,
            created_at: Utc::now(),
            last_login_at: None,
        };
        let session = AuthSession {
            user: UserView::from(&user),
            tokens: TokenPair {
                access_token: "a".into(),
                refresh_token: "r".into(),
            },
        };

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["accessToken"], "a");
        assert_eq!(value["refreshToken"], "r");
        assert_eq!(value["user"]["tenantId"], "project-0001");
        assert!(value["user"].get("passwordHash").is_none());
        assert!(value["user"].get("tokenVersion").is_none());
    }
}

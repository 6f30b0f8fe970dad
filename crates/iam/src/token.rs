//! 令牌签发与校验
//!
//! RS256 JWT，header 携带 `kid`。访问令牌包含 email/role，刷新令牌不包含。

use authrix_common::config::{MAX_DURATION_SECS, TokenConfig};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use ks::{SigningKey, VerificationKey};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};
use crate::user::Role;

/// JWT 载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub sub: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub token_version: i64,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    /// 刷新令牌不携带 email / role
    pub fn is_refresh_token(&self) -> bool {
        self.email.is_none() && self.role.is_none()
    }
}

/// 秒数换算为时间戳偏移，超出 i64 时取上限
fn secs_offset(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// 一对令牌
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// 令牌服务
///
/// 只做签名与校验，不访问任何存储。
#[derive(Debug, Clone)]
pub struct TokenService {
    config: TokenConfig,
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    fn sign(&self, claims: &TokenClaims, key: &SigningKey) -> AuthResult<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.key_id.clone());

        jsonwebtoken::encode(&header, claims, &key.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign token: {e}")))
    }

    /// 签发访问令牌
    pub fn issue_access_token(
        &self,
        user_id: &str,
        email: &str,
        role: Role,
        token_version: i64,
        key: &SigningKey,
    ) -> AuthResult<String> {
        let iat = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: user_id.to_string(),
            user_id: user_id.to_string(),
            email: Some(email.to_string()),
            role: Some(role),
            token_version,
            iat,
            exp: iat.saturating_add(secs_offset(self.config.access_ttl_secs)),
        };
        self.sign(&claims, key)
    }

    /// 签发刷新令牌
    pub fn issue_refresh_token(
        &self,
        user_id: &str,
        token_version: i64,
        key: &SigningKey,
    ) -> AuthResult<String> {
        let iat = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: user_id.to_string(),
            user_id: user_id.to_string(),
            email: None,
            role: None,
            token_version,
            iat,
            exp: iat.saturating_add(secs_offset(self.config.refresh_ttl_secs)),
        };
        self.sign(&claims, key)
    }

    /// 签发访问令牌与刷新令牌
    pub fn issue_pair(
        &self,
        user_id: &str,
        email: &str,
        role: Role,
        token_version: i64,
        key: &SigningKey,
    ) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user_id, email, role, token_version, key)?,
            refresh_token: self.issue_refresh_token(user_id, token_version, key)?,
        })
    }

    /// 校验令牌并返回载荷
    pub fn verify(&self, token: &str, key: &VerificationKey) -> AuthResult<TokenClaims> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.config.leeway_secs.min(MAX_DURATION_SECS);
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = jsonwebtoken::decode::<TokenClaims>(token, &key.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::MalformedToken,
            })?;

        let claims = data.claims;
        if claims.iat > Utc::now().timestamp().saturating_add(secs_offset(validation.leeway)) {
            return Err(AuthError::MalformedToken);
        }

        Ok(claims)
    }
}

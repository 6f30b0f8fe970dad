//! IAM 错误定义
//!
//! 凭证流程的失败是封闭集合，HTTP 层按变体映射状态码。

use std::collections::BTreeMap;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use ks::KsError;
use serde_json::json;
use thiserror::Error;

/// IAM 错误类型
#[derive(Error, Debug)]
pub enum AuthError {
    /// 请求参数校验失败，按字段给出原因
    #[error("validation failed: {0:?}")]
    Validation(BTreeMap<String, String>),

    #[error("email already exists in this project")]
    EmailTaken,

    /// 邮箱不存在或密码错误，两者对外不可区分
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("too many login attempts, try again in {retry_after}s")]
    TooManyAttempts { retry_after: u64 },

    #[error("no active signing key for tenant {0}")]
    NoActiveKey(String),

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("envelope decryption failed")]
    DecryptionFailed,

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// 存储的密码哈希格式错误
    #[error("malformed password hash")]
    MalformedHash,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("malformed token")]
    MalformedToken,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("token revoked")]
    TokenRevoked,

    #[error("user not found")]
    UserNotFound,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// IAM 结果类型别名
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// 单字段校验错误
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), message.into());
        Self::Validation(fields)
    }

    /// token 校验类错误
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature | Self::Expired | Self::MalformedToken
        )
    }

    /// HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::EmailTaken => StatusCode::CONFLICT,
            Self::InvalidCredentials
            | Self::InvalidSignature
            | Self::Expired
            | Self::MalformedToken
            | Self::InvalidRefreshToken
            | Self::TokenRevoked => StatusCode::UNAUTHORIZED,
            Self::TooManyAttempts { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::NoActiveKey(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidKeyMaterial(_)
            | Self::DecryptionFailed
            | Self::InvalidEnvelope(_)
            | Self::MalformedHash
            | Self::Storage(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<KsError> for AuthError {
    fn from(err: KsError) -> Self {
        match err {
            KsError::NoActiveKey(tenant) => Self::NoActiveKey(tenant),
            KsError::InvalidKeyMaterial(msg) => Self::InvalidKeyMaterial(msg),
            KsError::DecryptionFailed => Self::DecryptionFailed,
            KsError::InvalidEnvelope(msg) => Self::InvalidEnvelope(msg),
            KsError::Database(e) => Self::Storage(e.to_string()),
            KsError::Crypto(msg) | KsError::Internal(msg) | KsError::Config(msg) => {
                Self::Internal(msg)
            }
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            Self::Validation(fields) => json!({
                "error": "validation failed",
                "code": status.as_u16(),
                "fields": fields,
            }),
            Self::InvalidSignature | Self::MalformedToken => json!({
                "error": "invalid token",
                "code": status.as_u16(),
            }),
            Self::NoActiveKey(tenant) => {
                tracing::error!("No active signing key for tenant {}", tenant);
                json!({
                    "error": "signing key unavailable",
                    "code": status.as_u16(),
                })
            }
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                // 不向客户端暴露内部错误详情
                tracing::error!("Internal error: {:?}", self);
                json!({
                    "error": "internal server error",
                    "code": status.as_u16(),
                })
            }
            _ => json!({
                "error": self.to_string(),
                "code": status.as_u16(),
            }),
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::TooManyAttempts { retry_after } = self
            && let Ok(value) = HeaderValue::from_str(&retry_after.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::invalid_field("email", "required").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::EmailTaken.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AuthError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::TooManyAttempts { retry_after: 30 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AuthError::TokenRevoked.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::UserNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthError::NoActiveKey("t".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AuthError::DecryptionFailed.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_ks_error_conversion() {
        assert!(matches!(
            AuthError::from(KsError::NoActiveKey("tenant".into())),
            AuthError::NoActiveKey(t) if t == "tenant"
        ));
        assert!(matches!(
            AuthError::from(KsError::DecryptionFailed),
            AuthError::DecryptionFailed
        ));
        assert!(matches!(
            AuthError::from(KsError::Config("x".into())),
            AuthError::Internal(_)
        ));
    }

    #[test]
    fn test_too_many_attempts_sets_retry_after() {
        let response = AuthError::TooManyAttempts { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn test_internal_error_is_opaque() {
        let response = AuthError::Storage("disk I/O error at /var/db".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

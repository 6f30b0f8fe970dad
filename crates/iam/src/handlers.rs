//! IAM HTTP Handler
//!
//! 所有 `/iam/*` 请求都必须携带租户头：
//! - `x-project-id`: 租户（项目）ID
//! - `x-provider-id`: 发起请求的 provider ID

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{FromRequestParts, State, rejection::JsonRejection},
    http::{StatusCode, header, request::Parts},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

use crate::error::{AuthError, AuthResult};
use crate::ratelimit::ip_rate_limiter;
use crate::service::{CredentialService, RegisterInput};
use crate::trace::http_trace_layer;
use crate::user::UserView;

/// 租户 ID 请求头
pub const PROJECT_ID_HEADER: &str = "x-project-id";

/// Provider ID 请求头
pub const PROVIDER_ID_HEADER: &str = "x-provider-id";

/// 租户头最小长度
pub const MIN_TENANT_HEADER_LENGTH: usize = 10;

/// IAM 服务状态
#[derive(Clone)]
pub struct IamState {
    pub service: Arc<CredentialService>,
}

impl IamState {
    pub fn new(service: CredentialService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// 请求所属租户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub project_id: String,
    pub provider_id: String,
}

fn tenant_header(parts: &Parts, name: &str) -> Result<String, String> {
    let value = parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    if value.is_empty() {
        Err(format!("{name} header is required"))
    } else if value.chars().count() < MIN_TENANT_HEADER_LENGTH {
        Err(format!(
            "{name} must be at least {MIN_TENANT_HEADER_LENGTH} characters"
        ))
    } else {
        Ok(value.to_string())
    }
}

impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let project = tenant_header(parts, PROJECT_ID_HEADER);
        let provider = tenant_header(parts, PROVIDER_ID_HEADER);

        match (project, provider) {
            (Ok(project_id), Ok(provider_id)) => Ok(Self {
                project_id,
                provider_id,
            }),
            (project, provider) => {
                let mut fields = std::collections::BTreeMap::new();
                if let Err(msg) = project {
                    fields.insert(PROJECT_ID_HEADER.to_string(), msg);
                }
                if let Err(msg) = provider {
                    fields.insert(PROVIDER_ID_HEADER.to_string(), msg);
                }
                Err(AuthError::Validation(fields))
            }
        }
    }
}

/// `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| Self(token.to_string()))
            .ok_or(AuthError::MalformedToken)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: String,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> AuthResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AuthError::invalid_field("body", rejection.body_text()))
}

/// 创建 IAM 路由
///
/// - `/iam/register`、`/iam/login`、`/iam/refresh` 按 IP 限流
/// - `/iam/logout`、`/iam/me` 需要 Bearer 访问令牌
/// - `/health` 健康检查
pub fn create_router(state: IamState, request_timeout: Duration) -> AuthResult<Router> {
    let public = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .layer(ip_rate_limiter()?);

    let authenticated = Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me));

    Ok(Router::new()
        .route("/health", get(health_check))
        .nest("/iam", public.merge(authenticated))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(http_trace_layer())
                .layer(TimeoutLayer::new(request_timeout)),
        ))
}

async fn register(
    State(state): State<IamState>,
    tenant: Tenant,
    body: Result<Json<RegisterInput>, JsonRejection>,
) -> AuthResult<impl IntoResponse> {
    let input = json_body(body)?;
    let session = state
        .service
        .register(&tenant.project_id, &tenant.provider_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn login(
    State(state): State<IamState>,
    tenant: Tenant,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> AuthResult<impl IntoResponse> {
    let request = json_body(body)?;
    let session = state
        .service
        .login(&tenant.project_id, &request.email, &request.password)
        .await?;
    Ok(Json(session))
}

async fn refresh(
    State(state): State<IamState>,
    tenant: Tenant,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> AuthResult<impl IntoResponse> {
    let request = json_body(body)?;
    let tokens = state
        .service
        .refresh(&tenant.project_id, &request.refresh_token)
        .await?;
    Ok(Json(tokens))
}

async fn logout(
    State(state): State<IamState>,
    tenant: Tenant,
    BearerToken(token): BearerToken,
) -> AuthResult<Json<Value>> {
    state.service.logout(&tenant.project_id, &token).await?;
    Ok(Json(json!({ "message": "logged out successfully" })))
}

async fn me(
    State(state): State<IamState>,
    tenant: Tenant,
    BearerToken(token): BearerToken,
) -> AuthResult<Json<Value>> {
    let user = state
        .service
        .authenticate(&tenant.project_id, &token)
        .await?;
    Ok(Json(json!({ "user": UserView::from(&user) })))
}

/// 健康检查端点
async fn health_check() -> Json<Value> {
    Json(json!({
        "service": "iam",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy"
    }))
}

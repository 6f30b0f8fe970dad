//! Tenant IAM - 多租户凭证签发与吊销服务
//!
//! # 功能概述
//!
//! - 注册：按租户创建用户，Argon2id 保存密码，签发初始令牌
//! - 登录：邮箱密码校验，连续失败按指数退避封禁
//! - 刷新：刷新令牌一次有效，成功后旧令牌全部失效
//! - 登出：递增 token_version，吊销该用户的全部令牌
//!
//! # 架构设计
//!
//! ```text
//!        │ POST /iam/{register,login,refresh,logout}, GET /iam/me
//!        ▼
//! ┌──────────────────────────────────────────────┐
//! │  IAM Service                                 │
//! │  ┌────────────┐      ┌────────────────────┐  │
//! │  │  Handlers  │─────▶│ CredentialService  │  │
//! │  └────────────┘      └─────────┬──────────┘  │
//! │        ┌──────────────┬────────┴─────┬─────────────┐
//! │  ┌─────▼──────┐ ┌─────▼──────┐ ┌─────▼──────┐ ┌────▼─────────┐
//! │  │ UserStorage│ │BackoffGuard│ │TokenService│ │ KeyCustodian │
//! │  │(SQLite/PG) │ │(Mem/Redis) │ │  (RS256)   │ │    (KS)      │
//! │  └────────────┘ └────────────┘ └────────────┘ └──────────────┘
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # 令牌
//!
//! 访问令牌与刷新令牌都以租户当前激活的 RSA 私钥签名（RS256，header 带 kid），
//! 载荷中的 `tokenVersion` 必须与用户记录一致才被接受。
//!
//! # 使用示例
//!
//! ```no_run
//! use authrix_common::config::AuthrixConfig;
//! use iam::create_iam_router;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AuthrixConfig::from_file("config.toml")?;
//! let router = create_iam_router(&config).await?;
//! # let _ = router;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod error;
pub mod handlers;
pub mod password;
pub mod ratelimit;
pub mod service;
pub mod storage;
pub mod token;
pub mod trace;
pub mod user;

pub use backoff::{BackoffDecision, BackoffGuard, BackoffStore, create_backoff_store};
pub use error::{AuthError, AuthResult};
pub use handlers::{IamState, create_router};
pub use service::{AuthSession, CredentialService, RegisterInput};
pub use storage::{UserRepository, UserStorage};
pub use token::{TokenClaims, TokenPair, TokenService};
pub use user::{Role, TenantUser, UserView};

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use authrix_common::config::AuthrixConfig;
use axum::Router;
use tracing::info;

/// 根据全局配置构建凭证服务
pub async fn create_credential_service(config: &AuthrixConfig) -> Result<CredentialService> {
    let iam = &config.services.iam;

    let custodian = ks::create_key_custodian(&config.services.ks, &config.sqlite_path)
        .await
        .context("Failed to create key custodian")?;

    let users = UserStorage::from_config(config.iam_storage_config(), &config.sqlite_path)
        .await
        .context("Failed to open user storage")?;
    info!("IAM user storage ready: {}", users.backend_name());

    let store = create_backoff_store(&iam.backoff_store)
        .await
        .context("Failed to create backoff store")?;

    Ok(CredentialService::new(
        Arc::new(users),
        custodian,
        BackoffGuard::new(store, iam.backoff.clone()),
        TokenService::new(iam.token.clone()),
        iam.min_password_length,
    ))
}

/// 创建 IAM 路由器
pub async fn create_iam_router(config: &AuthrixConfig) -> Result<Router> {
    info!("Creating IAM router");

    let service = create_credential_service(config).await?;
    let timeout = Duration::from_secs(config.services.iam.request_timeout_secs);
    let router =
        create_router(IamState::new(service), timeout).context("Failed to create IAM router")?;

    info!("IAM router created successfully");
    Ok(router)
}

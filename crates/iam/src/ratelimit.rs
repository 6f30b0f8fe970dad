//! IAM 限流中间件
//!
//! 只作用于未认证入口（register / login / refresh），按客户端 IP 限流。
//! 与登录退避互补：退避针对单个账号，这里针对单个来源地址。

use axum::body::Body;
use governor::middleware::NoOpMiddleware;
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};

use crate::error::{AuthError, AuthResult};

/// 每秒补充的请求数
pub const REQUESTS_PER_SECOND: u64 = 2;

/// 突发上限
pub const BURST_SIZE: u32 = 100;

/// IP 级别限流层
///
/// SmartIpKeyExtractor 依次读取 x-forwarded-for / x-real-ip / forwarded，
/// 都没有时回退到 `ConnectInfo<SocketAddr>`，因此服务需以
/// `into_make_service_with_connect_info::<SocketAddr>()` 启动。
pub fn ip_rate_limiter() -> AuthResult<GovernorLayer<SmartIpKeyExtractor, NoOpMiddleware, Body>> {
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(REQUESTS_PER_SECOND)
        .burst_size(BURST_SIZE)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .ok_or_else(|| AuthError::Internal("Invalid rate limiter configuration".into()))?;

    Ok(GovernorLayer::new(Arc::new(governor_conf)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_rate_limiter_creation() {
        assert!(ip_rate_limiter().is_ok());
    }
}

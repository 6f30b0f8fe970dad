//! HTTP 服务装配
//!
//! 单一 HTTP 监听，路由由 IAM 提供；关闭信号到达后等待在途请求完成。

use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::AuthrixConfig;

/// 绑定配置中的地址并运行服务直到 `shutdown` 完成
pub async fn serve<F>(config: &AuthrixConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.http_addr().context("Invalid HTTP bind address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;

    serve_with_listener(config, listener, shutdown).await
}

/// 在已绑定的监听器上运行服务
pub async fn serve_with_listener<F>(
    config: &AuthrixConfig,
    listener: TcpListener,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = iam::create_iam_router(config).await?;
    let local_addr = listener
        .local_addr()
        .context("Failed to read listener address")?;

    info!("📡 HTTP 服务器监听在: http://{}", local_addr);
    info!("🔧 可用的API端点:");
    info!("  - http://{}/health", local_addr);
    info!("  - http://{}/iam/register (POST)", local_addr);
    info!("  - http://{}/iam/login (POST)", local_addr);
    info!("  - http://{}/iam/refresh (POST)", local_addr);
    info!("  - http://{}/iam/logout (POST)", local_addr);
    info!("  - http://{}/iam/me (GET)", local_addr);

    // 限流按客户端 IP 取键，需要连接信息
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("HTTP server terminated with error")?;

    info!("🛑 HTTP 服务器已关闭");
    Ok(())
}

//! 运维API: 健康检查、队列统计、手动调度、入队与重排触发、指标导出。

pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;

use std::net::SocketAddr;

use anyhow::Context;
use tracing::info;

pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;
pub use routes::{create_routes, AppState};

/// 启动API服务, 直到停机信号到来
pub async fn serve(
    state: AppState,
    bind_address: SocketAddr,
    cors_enabled: bool,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let router = create_routes(state, cors_enabled);
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("无法绑定API地址 {bind_address}"))?;
    info!("API服务监听于 {bind_address}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("API服务收到停机信号");
        })
        .await
        .context("API服务运行出错")?;
    Ok(())
}

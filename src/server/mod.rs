//! 仪表盘 HTTP 服务
//!
//! 上传表格、轮询任务进度、提交验证码 / OTP、接收短信中继、下载 PDF。

mod handlers;

use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::orchestrator::JobManager;

/// 上传表格的大小上限
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// 所有处理函数共享的状态
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<JobManager>,
}

impl AppState {
    pub fn new(manager: Arc<JobManager>) -> Self {
        Self { manager }
    }
}

/// 构建路由表
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/upload", post(handlers::upload))
        .route("/status/:job_id", get(handlers::status_page))
        .route("/job_info/:job_id", get(handlers::job_info))
        .route("/submit_captcha/:job_id", post(handlers::submit_captcha))
        .route("/submit_otp_mobile/:job_id", post(handlers::submit_otp_mobile))
        .route("/submit_otp_email/:job_id", post(handlers::submit_otp_email))
        .route("/receive_otp", post(handlers::receive_otp))
        .route("/download/:filename", get(handlers::download))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// 在已绑定的监听器上提供服务，Ctrl-C 时停止接收新请求
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("读取监听地址失败")?;
    info!("🌐 仪表盘已就绪: http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP 服务异常退出")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("🛑 收到 Ctrl-C，停止服务");
    }
}

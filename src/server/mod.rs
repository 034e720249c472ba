// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// Web 服务 (Presentation Service)
///
/// ```text
/// GET|POST /            上传表单
/// GET|POST /detections  multipart/x-mixed-replace JPEG 流
/// GET /fps /dcount /fsize  最新一帧的统计值
/// GET /favicon.ico
/// ```
///
/// 每个视频流请求占用一个阻塞线程运行检测流水线, 通过容量为 2 的通道把编码好的
/// JPEG 发给响应体; 客户端断开后发送失败, 流水线随之结束.
pub mod routes;
pub mod session;
pub mod upload;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::DetectConfig;
use crate::models::Model;
use crate::stats::StatsCell;
pub use session::SessionStore;

/// 服务参数
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub detect: DetectConfig,
    /// 上传文件保存目录
    pub uploads_dir: PathBuf,
    /// favicon 等静态文件目录
    pub static_dir: PathBuf,
    pub jpeg_quality: u8,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            detect: DetectConfig::default(),
            uploads_dir: PathBuf::from("static/files"),
            static_dir: PathBuf::from("static"),
            jpeg_quality: 90,
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

/// 每个视频流请求创建一个模型实例
pub trait ModelFactory: Send + Sync {
    fn create(&self, config: &DetectConfig) -> Result<Box<dyn Model>>;
}

impl<F> ModelFactory for F
where
    F: Fn(&DetectConfig) -> Result<Box<dyn Model>> + Send + Sync,
{
    fn create(&self, config: &DetectConfig) -> Result<Box<dyn Model>> {
        self(config)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub sessions: SessionStore,
    pub stats: StatsCell,
    pub models: Arc<dyn ModelFactory>,
}

impl AppState {
    pub fn new(config: ServerConfig, models: Arc<dyn ModelFactory>) -> Self {
        Self {
            config: Arc::new(config),
            sessions: SessionStore::new(),
            stats: StatsCell::new(),
            models,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(routes::index).post(routes::upload))
        .route("/detections", get(routes::detections).post(routes::detections))
        .route("/fps", get(routes::fps))
        .route("/dcount", get(routes::dcount))
        .route("/fsize", get(routes::fsize))
        .route("/favicon.ico", get(routes::favicon))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 绑定地址并运行直到进程退出
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("绑定 {} 失败", addr))?;
    info!("🚀 Web服务已启动: http://{}", addr);
    axum::serve(listener, router(state))
        .await
        .context("Web服务异常退出")?;
    Ok(())
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 垃圾检测 Web 服务
///
/// 直接运行: cargo run --bin server --features onnx --release
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use yolo_webstream::config::DetectConfig;
use yolo_webstream::models::load_model;
use yolo_webstream::server::{serve, AppState, ServerConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Web服务参数
#[derive(Parser, Debug)]
#[command(author, version, about = "YOLO 检测 Web 服务 (上传视频 → MJPEG 流)", long_about = None)]
struct Args {
    /// 监听地址
    #[arg(long, env = "YOLO_BIND", default_value = "127.0.0.1:5000")]
    bind: SocketAddr,

    /// 上传文件目录
    #[arg(long, env = "YOLO_UPLOADS", default_value = "static/files")]
    uploads: PathBuf,

    /// 静态文件目录 (favicon.ico)
    #[arg(long, env = "YOLO_STATIC", default_value = "static")]
    static_dir: PathBuf,

    /// JSON检测配置
    #[arg(long, env = "YOLO_CONFIG")]
    config: Option<PathBuf>,

    /// ONNX模型路径 (覆盖配置文件)
    #[arg(short, long, env = "YOLO_WEIGHTS")]
    weights: Option<PathBuf>,

    /// 视频流 JPEG 质量 (1-100)
    #[arg(long, default_value_t = 90)]
    jpeg_quality: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut detect = match &args.config {
        Some(path) => DetectConfig::load(path),
        None => DetectConfig::default(),
    };
    if let Some(weights) = args.weights {
        detect.weights = weights;
    }
    detect.print_summary();

    let config = ServerConfig {
        detect,
        uploads_dir: args.uploads,
        static_dir: args.static_dir,
        jpeg_quality: args.jpeg_quality,
        ..Default::default()
    };
    info!("📂 上传目录: {}", config.uploads_dir.display());
    let state = AppState::new(config, Arc::new(load_model));
    serve(args.bind, state).await
}

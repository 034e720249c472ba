// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 命令行检测: 图片/目录/视频/摄像头/RTSP/桌面
///
/// cargo run --bin detect --features onnx -- --source data/images
use anyhow::Context;
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use yolo_webstream::models::load_model;
use yolo_webstream::{Args, Pipeline};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = args.detect_config();
    config.print_summary();

    let model = load_model(&config).context("加载模型失败")?;
    let mut pipeline = Pipeline::open(&args.source, &config, model)?;

    let mut total = 0;
    for frame in pipeline.by_ref() {
        let frame = frame?;
        total += frame.detections;
    }
    pipeline.finish();
    info!("✅ 完成: {} 帧, {} 个检测框", pipeline.seen(), total);
    Ok(())
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! HTTP 处理函数

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use bytes::{BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use super::session::{new_session_id, session_cookie, session_id};
use super::upload::store_upload;
use super::AppState;
use crate::pipeline::Pipeline;
use crate::stats::RunStatistics;

const INDEX_TEMPLATE: &str = include_str!("../../templates/index.html");
const STREAM_TEMPLATE: &str = include_str!("../../templates/stream.html");

pub const NO_VIDEO: &str = "No video uploaded";
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// 编码好的帧在通道中的缓冲数
const STREAM_BUFFER: usize = 2;

/// 处理函数的错误: 记录日志并返回 500
pub struct AppError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("❌ {:#}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", self.0)).into_response()
    }
}

/// 上传表单; `filename` 为 Some 时显示视频流和统计值
pub fn render_index(filename: Option<&str>) -> Html<String> {
    let content = match filename {
        Some(name) => STREAM_TEMPLATE.replace("{{filename}}", name),
        None => String::new(),
    };
    Html(INDEX_TEMPLATE.replace("{{content}}", &content))
}

pub async fn index() -> Html<String> {
    render_index(None)
}

pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => {
            debug!("不是文件上传表单: {}", e);
            return Ok(render_index(None).into_response());
        }
    };
    let Some(stored) = store_upload(multipart, &state.config.uploads_dir).await? else {
        debug!("表单中没有文件");
        return Ok(render_index(None).into_response());
    };

    // 只沿用本服务签发过的会话ID
    let id = session_id(&headers)
        .filter(|id| state.sessions.contains(id))
        .unwrap_or_else(new_session_id);
    state.sessions.set_file_path(&id, stored.path.clone());
    info!("🗂️ 会话 {} → {}", id, stored.path.display());

    let mut response = render_index(Some(&stored.filename)).into_response();
    response
        .headers_mut()
        .insert(SET_COOKIE, session_cookie(&id).parse()?);
    Ok(response)
}

pub async fn detections(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let path = session_id(&headers).and_then(|id| state.sessions.file_path(&id));
    let Some(path) = path else {
        return NO_VIDEO.into_response();
    };
    info!("🎥 开始检测: {}", path.display());

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::task::spawn_blocking(move || stream_frames(state, path, tx));

    (
        [(CONTENT_TYPE, STREAM_CONTENT_TYPE)],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}

/// 阻塞线程: 运行流水线, 每帧发布统计值并发送一个 JPEG 分段
fn stream_frames(state: AppState, path: PathBuf, tx: mpsc::Sender<Result<Bytes, io::Error>>) {
    let config = &state.config.detect;
    let model = match state.models.create(config) {
        Ok(model) => model,
        Err(e) => {
            error!("❌ 加载模型失败: {:#}", e);
            return;
        }
    };
    let mut pipeline = match Pipeline::open(&path.to_string_lossy(), config, model) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("❌ {:#}", e);
            return;
        }
    };

    for frame in pipeline.by_ref() {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                error!("❌ 处理帧失败: {:#}", e);
                break;
            }
        };
        state.stats.publish(RunStatistics {
            fps: frame.fps,
            detections: frame.detections,
            frame_height: frame.shape.0,
        });
        let jpeg = match encode_jpeg(&frame.image, state.config.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                warn!("⚠️ JPEG编码失败, 跳过该帧: {:#}", e);
                continue;
            }
        };
        if tx.blocking_send(Ok(multipart_part(&jpeg))).is_err() {
            info!("🔌 客户端已断开: {}", path.display());
            break;
        }
    }
}

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(img)?;
    Ok(buf)
}

/// `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    const HEAD: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    let mut part = BytesMut::with_capacity(HEAD.len() + jpeg.len() + 2);
    part.put_slice(HEAD);
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

pub async fn fps(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "fpsresult": state.stats.snapshot().fps_text() }))
}

pub async fn dcount(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "dcountresult": state.stats.snapshot().detections_text() }))
}

pub async fn fsize(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "fsizeresult": state.stats.snapshot().frame_height_text() }))
}

pub async fn favicon(State(state): State<AppState>) -> Response {
    let path = state.config.static_dir.join("favicon.ico");
    match tokio::fs::read(&path).await {
        Ok(data) => ([(CONTENT_TYPE, "image/vnd.microsoft.icon")], data).into_response(),
        Err(e) => {
            debug!("读取 {} 失败: {}", path.display(), e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_multipart_part_framing() {
        let part = multipart_part(b"JPEG");
        assert_eq!(
            &part[..],
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n".as_slice()
        );
    }

    #[test]
    fn test_encode_jpeg() {
        let img = RgbImage::from_pixel(32, 24, Rgb([10, 200, 30]));
        let jpeg = encode_jpeg(&img, 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn test_render_index() {
        let Html(empty) = render_index(None);
        assert!(empty.contains("name=\"file\""));
        assert!(!empty.contains("/detections"));
        assert!(!empty.contains("{{"));

        let Html(page) = render_index(Some("clip.mp4"));
        assert!(page.contains("clip.mp4"));
        assert!(page.contains("src=\"/detections\""));
        assert!(!page.contains("{{"));
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use image::{Rgb, RgbImage};
use ndarray::Array4;
use tower::ServiceExt;
use yolo_webstream::server::{router, AppState, ServerConfig};
use yolo_webstream::{DetectConfig, Detection, Model};

const BOUNDARY: &str = "X-YOLO-BOUNDARY";

/// 按调用次数返回预设结果
struct ScriptedModel {
    names: Vec<String>,
    script: Vec<Vec<Detection>>,
    calls: usize,
}

impl Model for ScriptedModel {
    fn forward(&mut self, _xs: &Array4<f32>) -> anyhow::Result<Vec<Detection>> {
        let out = self.script.get(self.calls).cloned().unwrap_or_default();
        self.calls += 1;
        Ok(out)
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    fn warmup(&mut self, _shape: (usize, usize, usize, usize)) -> anyhow::Result<()> {
        Ok(())
    }
}

fn app_state(dir: &Path, script: Vec<Vec<Detection>>) -> AppState {
    counted_app_state(dir, script).0
}

/// 同时返回模型创建次数
fn counted_app_state(dir: &Path, script: Vec<Vec<Detection>>) -> (AppState, Arc<AtomicUsize>) {
    let config = ServerConfig {
        detect: DetectConfig {
            imgsz: (64, 64),
            project: dir.join("runs"),
            nosave: true,
            ..Default::default()
        },
        uploads_dir: dir.join("uploads"),
        static_dir: dir.join("static"),
        ..Default::default()
    };
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let factory = move |_: &DetectConfig| -> anyhow::Result<Box<dyn Model>> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedModel {
            names: vec!["cardboard".to_string()],
            script: script.clone(),
            calls: 0,
        }))
    };
    (AppState::new(config, Arc::new(factory)), created)
}

fn app(state: &AppState) -> Router {
    router(state.clone())
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

async fn get_json(state: &AppState, uri: &str) -> serde_json::Value {
    let response = app(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn upload_request(filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        b = BOUNDARY,
        f = filename
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_index_form() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(dir.path(), vec![]);
    let response = app(&state)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("name=\"file\""));
    assert!(!html.contains("/detections"));
}

#[tokio::test]
async fn test_detections_without_upload() {
    let dir = tempfile::tempdir().unwrap();
    let (state, created) = counted_app_state(dir.path(), vec![]);
    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/detections")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "No video uploaded");

    // 未知会话同样视为未上传
    let response = app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/detections")
                .header(header::COOKIE, "session=unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_text(response).await, "No video uploaded");
    // 没有创建模型, 也就没有开始处理
    assert_eq!(created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_initial_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(dir.path(), vec![]);
    assert_eq!(get_json(&state, "/fps").await["fpsresult"], "0");
    assert_eq!(get_json(&state, "/dcount").await["dcountresult"], "0");
    assert_eq!(get_json(&state, "/fsize").await["fsizeresult"], "0");
}

#[tokio::test]
async fn test_upload_sanitizes_filename() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(dir.path(), vec![]);

    let response = app(&state)
        .oneshot(upload_request("../../etc/passwd", b"root:x:0:0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("session="));
    let html = body_text(response).await;
    assert!(html.contains("etc_passwd"));
    assert!(html.contains("src=\"/detections\""));

    let stored = dir.path().join("uploads/etc_passwd");
    assert_eq!(std::fs::read(&stored).unwrap(), b"root:x:0:0");
    assert_eq!(state.sessions.len(), 1);

    // 不支持的格式: 流立即结束, 没有任何分段
    let session = cookie.split(';').next().unwrap().to_string();
    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/detections")
                .header(header::COOKIE, session)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );
    assert_eq!(body_text(response).await, "");
}

#[tokio::test]
async fn test_empty_upload_rerenders_form() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(dir.path(), vec![]);
    let response = app(&state).oneshot(upload_request("", b"")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert!(!body_text(response).await.contains("/detections"));
    assert!(state.sessions.is_empty());
}

#[tokio::test]
async fn test_large_upload_written_intact() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(dir.path(), vec![]);
    let content: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();

    let response = app(&state)
        .oneshot(upload_request("big clip.mp4", &content))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stored = std::fs::read(dir.path().join("uploads/big_clip.mp4")).unwrap();
    assert_eq!(stored.len(), content.len());
    assert!(stored == content);
}

#[tokio::test]
async fn test_non_upload_post_rerenders_form() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(dir.path(), vec![]);

    let requests = [
        Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::empty())
            .unwrap(),
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("submit=Run"))
            .unwrap(),
    ];
    for request in requests {
        let response = app(&state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let html = body_text(response).await;
        assert!(html.contains("name=\"file\""));
        assert!(!html.contains("/detections"));
    }
    assert!(state.sessions.is_empty());
}

#[tokio::test]
async fn test_upload_ignores_unissued_session_id() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(dir.path(), vec![]);

    let mut request = upload_request("clip.mp4", b"data");
    request
        .headers_mut()
        .insert(header::COOKIE, "session=chosen-by-client".parse().unwrap());
    let response = app(&state).oneshot(request).await.unwrap();
    let cookie = response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .to_string();
    let issued = cookie
        .split(';')
        .next()
        .unwrap()
        .trim_start_matches("session=")
        .to_string();
    assert_ne!(issued, "chosen-by-client");
    assert!(!state.sessions.contains("chosen-by-client"));
    assert!(state.sessions.contains(&issued));

    // 已签发的会话ID在再次上传时沿用
    let mut request = upload_request("other.mp4", b"data");
    request.headers_mut().insert(
        header::COOKIE,
        format!("session={}", issued).parse().unwrap(),
    );
    let response = app(&state).oneshot(request).await.unwrap();
    assert_eq!(
        response.headers()[header::SET_COOKIE].to_str().unwrap(),
        cookie
    );
    assert_eq!(state.sessions.len(), 1);
    assert_eq!(
        state.sessions.file_path(&issued),
        Some(dir.path().join("uploads/other.mp4"))
    );
}

#[tokio::test]
async fn test_stats_published_when_jpeg_encoding_fails() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("wide");
    std::fs::create_dir(&images).unwrap();
    // JPEG 宽度上限为 65535
    RgbImage::from_pixel(65536, 1, Rgb([40, 40, 40]))
        .save(images.join("0.png"))
        .unwrap();
    let script = vec![vec![Detection::new(0., 31., 64., 33., 0, 0.9)]];
    let state = app_state(dir.path(), script);
    state.sessions.set_file_path("wide", images);

    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/detections")
                .header(header::COOKIE, "session=wide")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    // 该帧编码失败, 没有分段, 但统计值已更新
    assert_eq!(body_text(response).await, "");
    assert_eq!(get_json(&state, "/dcount").await["dcountresult"], "1");
    assert_eq!(get_json(&state, "/fsize").await["fsizeresult"], "1");
}

#[tokio::test]
async fn test_stream_reports_last_frame() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("frames");
    std::fs::create_dir(&images).unwrap();
    for i in 0..3 {
        RgbImage::from_pixel(64, 48, Rgb([40, 40, 40]))
            .save(images.join(format!("{}.png", i)))
            .unwrap();
    }
    // 只有第二帧有检测结果
    let script = vec![
        vec![],
        vec![Detection::new(8., 16., 40., 40., 0, 0.9)],
        vec![],
    ];
    let state = app_state(dir.path(), script);
    state.sessions.set_file_path("abc", images);

    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/detections")
                .header(header::COOKIE, "session=abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let head = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    let parts = bytes.windows(head.len()).filter(|w| *w == head).count();
    assert_eq!(parts, 3);

    assert_eq!(get_json(&state, "/dcount").await["dcountresult"], "0");
    assert_eq!(get_json(&state, "/fsize").await["fsizeresult"], "48");
    let fps: f64 = get_json(&state, "/fps").await["fpsresult"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(fps > 0.0 && fps.is_finite());
}

#[tokio::test]
async fn test_favicon() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(dir.path(), vec![]);

    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/favicon.ico")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    std::fs::create_dir_all(dir.path().join("static")).unwrap();
    std::fs::write(dir.path().join("static/favicon.ico"), b"\x00\x00\x01\x00").unwrap();
    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/favicon.ico")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "image/vnd.microsoft.icon"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"\x00\x00\x01\x00");
}

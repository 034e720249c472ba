// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 帧输入系统 (Frame Source)
///
/// 把输入描述 (文件/目录/设备号/URL/屏幕区域) 分类后打开成统一的帧迭代器
/// - LoadImages:      图片/视频文件或目录 (有限序列)
/// - LoadStreams:     摄像头/网络流/`.txt` 流列表 (无限序列, `ffmpeg` feature)
/// - LoadScreenshots: 屏幕捕获 (`ffmpeg` feature)
/// - Letterbox:       缩放填充到模型兼容尺寸, 保留原始帧用于绘制
pub mod images;
pub mod letterbox;
pub mod screen;
#[cfg(feature = "ffmpeg")]
pub mod decoder;
#[cfg(feature = "ffmpeg")]
pub mod streams;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::RgbImage;
use ndarray::Array4;
use phf::phf_set;
use tracing::info;

use crate::error::SourceError;

pub use images::LoadImages;
pub use letterbox::{check_img_size, prepare, Letterbox};
pub use screen::{LoadScreenshots, ScreenRegion};
#[cfg(feature = "ffmpeg")]
pub use streams::LoadStreams;

/// 支持的图片后缀
pub static IMG_FORMATS: phf::Set<&'static str> = phf_set! {
    "bmp", "dng", "jpeg", "jpg", "mpo", "png", "tif", "tiff", "webp", "pfm",
};

/// 支持的视频后缀
pub static VID_FORMATS: phf::Set<&'static str> = phf_set! {
    "asf", "avi", "gif", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "ts", "wmv", "webm",
};

const URL_PREFIXES: [&str; 4] = ["rtsp://", "rtmp://", "http://", "https://"];

/// 输入源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// 单张图片
    Image,
    /// 图片/视频文件或目录
    Files,
    /// 摄像头/网络流
    Stream,
    /// 屏幕捕获
    Screenshot,
}

impl SourceKind {
    /// 根据后缀/协议/数字形式分类
    pub fn classify(source: &str) -> Self {
        let lower = source.trim().to_lowercase();
        let suffix = suffix(&lower);
        let is_image = IMG_FORMATS.contains(suffix.as_str());
        let is_file = is_image || VID_FORMATS.contains(suffix.as_str());
        let is_url = is_url(&lower);

        if lower.starts_with("screen") {
            Self::Screenshot
        } else if is_numeric(&lower) || lower.ends_with(".txt") || (is_url && !is_file) {
            Self::Stream
        } else if is_image {
            Self::Image
        } else {
            Self::Files
        }
    }
}

/// 帧的来源模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Image,
    Video,
    Stream,
}

/// 视频捕获参数 (用于打开输出视频)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureInfo {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub frames: Option<u64>,
}

impl Default for CaptureInfo {
    fn default() -> Self {
        Self {
            fps: 30.0,
            width: 0,
            height: 0,
            frames: None,
        }
    }
}

/// 预处理参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoaderOptions {
    pub imgsz: (u32, u32), // (width, height)
    pub stride: u32,
    pub auto: bool,
    pub vid_stride: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            imgsz: (640, 640),
            stride: 32,
            auto: false,
            vid_stride: 1,
        }
    }
}

/// 一帧输入: 原始帧 + 预处理张量
pub struct SourceFrame {
    pub path: String,
    pub image: RgbImage,
    pub tensor: Array4<f32>,
    pub letterbox: Letterbox,
    pub mode: SourceMode,
    pub capture: Option<CaptureInfo>,
    pub description: String,
    pub stream_index: usize,
    pub frame_index: u64,
}

impl SourceFrame {
    pub(crate) fn build(
        image: RgbImage,
        opts: &LoaderOptions,
        mode: SourceMode,
    ) -> anyhow::Result<Self> {
        let (tensor, letterbox) = prepare(&image, opts.imgsz, opts.stride, opts.auto)?;
        Ok(Self {
            path: String::new(),
            image,
            tensor,
            letterbox,
            mode,
            capture: None,
            description: String::new(),
            stream_index: 0,
            frame_index: 0,
        })
    }

    /// (height, width, channels)
    pub fn shape(&self) -> (u32, u32, u32) {
        (self.image.height(), self.image.width(), 3)
    }
}

/// 帧迭代器
pub trait FrameSource: Iterator<Item = anyhow::Result<SourceFrame>> + Send {}

impl<T> FrameSource for T where T: Iterator<Item = anyhow::Result<SourceFrame>> + Send {}

/// 打开输入源; 不支持的后缀/不存在的路径在迭代之前报错
pub fn open(source: &str, opts: LoaderOptions) -> Result<Box<dyn FrameSource>, SourceError> {
    let source = source.trim();
    let kind = SourceKind::classify(source);
    info!("📂 输入源: {} ({:?})", source, kind);

    match kind {
        SourceKind::Screenshot => Ok(Box::new(LoadScreenshots::new(source, opts)?)),
        SourceKind::Stream => open_stream(source, opts),
        SourceKind::Image | SourceKind::Files => {
            let lower = source.to_lowercase();
            let local = if is_url(&lower) {
                download(source, &std::env::temp_dir().join("yolo-webstream"))?
            } else {
                PathBuf::from(source)
            };
            Ok(Box::new(LoadImages::new(&local, opts)?))
        }
    }
}

#[cfg(feature = "ffmpeg")]
fn open_stream(source: &str, opts: LoaderOptions) -> Result<Box<dyn FrameSource>, SourceError> {
    Ok(Box::new(LoadStreams::new(source, opts)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_stream(_source: &str, _opts: LoaderOptions) -> Result<Box<dyn FrameSource>, SourceError> {
    Err(SourceError::FeatureDisabled {
        what: "Camera and stream input",
        feature: "ffmpeg",
    })
}

/// 下载媒体 URL 到本地目录, 返回本地路径
pub fn download(url: &str, dir: &Path) -> Result<PathBuf, SourceError> {
    let download_err = |reason: String| SourceError::Download {
        url: url.to_string(),
        reason,
    };
    let name = url
        .split(['?', '#'])
        .next()
        .and_then(|s| s.rsplit('/').next())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| download_err("URL has no file name".to_string()))?;
    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    if path.is_file() {
        info!("📦 已存在, 跳过下载: {}", path.display());
        return Ok(path);
    }

    info!("⬇️ 下载 {} → {}", url, path.display());
    let response = ureq::get(url)
        .call()
        .map_err(|e| download_err(e.to_string()))?;
    let mut file = fs::File::create(&path)?;
    if let Err(e) = io::copy(&mut response.into_reader(), &mut file) {
        let _ = fs::remove_file(&path);
        return Err(download_err(e.to_string()));
    }
    Ok(path)
}

/// 小写后缀 (不含点)
pub fn suffix(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub fn is_url(source: &str) -> bool {
    let lower = source.to_lowercase();
    URL_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn is_numeric(source: &str) -> bool {
    !source.is_empty() && source.chars().all(|c| c.is_ascii_digit())
}

pub(crate) fn format_list(set: &phf::Set<&'static str>) -> String {
    let mut formats: Vec<&str> = set.iter().copied().collect();
    formats.sort_unstable();
    formats.join(" ")
}

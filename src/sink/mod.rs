// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 输出 (Output Sink)
//!
//! - 图片源: 写到运行目录, 目标已存在时追加数字后缀, 不覆盖
//! - 视频/流: 每路一个视频写入器, 首帧时打开, 输出路径变化时重新打开
//! - `save_txt`: YOLO 格式标签写到 `labels/`
pub mod video;

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::DetectConfig;
use crate::detection::Detection;
use crate::input::{SourceFrame, SourceMode};
pub use video::VideoWriter;

/// 默认输出帧率
pub const DEFAULT_FPS: f64 = 30.0;

/// 路径已存在时递增: runs/detect/exp → exp2, exp3, ...
///
/// 文件按 `stem{n}.suffix` 递增; `mkdir` 为 true 时创建目录
pub fn increment_path(path: &Path, exist_ok: bool, mkdir: bool) -> Result<PathBuf> {
    let mut path = path.to_path_buf();
    if path.exists() && !exist_ok {
        let (base, suffix) = if path.is_file() {
            let suffix = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            (path.with_extension(""), suffix)
        } else {
            (path.clone(), String::new())
        };
        for n in 2.. {
            let candidate = PathBuf::from(format!("{}{}{}", base.display(), n, suffix));
            if !candidate.exists() {
                path = candidate;
                break;
            }
        }
    }
    if mkdir {
        fs::create_dir_all(&path)
            .with_context(|| format!("创建目录 {} 失败", path.display()))?;
    }
    Ok(path)
}

/// 一路视频输出; `writer` 为 None 表示打开失败, 该路不再输出
struct WriterSlot {
    path: PathBuf,
    writer: Option<VideoWriter>,
}

pub struct OutputSink {
    save_dir: PathBuf,
    save_media: bool,
    save_txt: bool,
    save_conf: bool,
    ffmpeg: String,
    writers: HashMap<usize, WriterSlot>,
}

impl OutputSink {
    /// 创建递增的运行目录
    pub fn new(config: &DetectConfig) -> Result<Self> {
        let save_dir = increment_path(&config.project.join(&config.name), config.exist_ok, true)?;
        if config.save_txt {
            fs::create_dir_all(save_dir.join("labels"))?;
        }
        info!("📁 结果保存到 {}", save_dir.display());
        Ok(Self {
            save_dir,
            save_media: !config.nosave,
            save_txt: config.save_txt,
            save_conf: config.save_conf,
            ffmpeg: video::ffmpeg_bin(),
            writers: HashMap::new(),
        })
    }

    /// 替换视频编码使用的 ffmpeg 可执行文件
    pub fn with_ffmpeg(mut self, bin: impl Into<String>) -> Self {
        self.ffmpeg = bin.into();
        self
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// 保存已绘制的帧 (以及标签)
    pub fn write(&mut self, frame: &SourceFrame, detections: &[Detection]) -> Result<()> {
        let name = Path::new(&frame.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("stream{}", frame.stream_index));

        if self.save_txt {
            self.write_labels(frame, &name, detections)?;
        }
        if !self.save_media {
            return Ok(());
        }

        match frame.mode {
            SourceMode::Image => {
                let target = self.save_dir.join(&name);
                let target = increment_path(&target, false, false)?;
                if let Err(e) = frame.image.save(&target) {
                    warn!("⚠️ 保存图片 {} 失败: {}", target.display(), e);
                }
            }
            SourceMode::Video | SourceMode::Stream => {
                let target = self.save_dir.join(&name).with_extension("mp4");
                self.write_video(frame, target);
            }
        }
        Ok(())
    }

    fn write_video(&mut self, frame: &SourceFrame, target: PathBuf) {
        let slot = self
            .writers
            .entry(frame.stream_index)
            .or_insert_with(|| WriterSlot {
                path: PathBuf::new(),
                writer: None,
            });

        if slot.path != target {
            // 释放上一个写入器
            if let Some(mut old) = slot.writer.take() {
                if let Err(e) = old.finish() {
                    warn!("⚠️ {:#}", e);
                }
            }
            let (fps, size) = match frame.capture {
                Some(c) if c.width > 0 && c.height > 0 => (c.fps, (c.width, c.height)),
                Some(c) => (c.fps, frame.image.dimensions()),
                None => (DEFAULT_FPS, frame.image.dimensions()),
            };
            slot.path = target;
            slot.writer = match VideoWriter::open_with(&self.ffmpeg, &slot.path, fps, size) {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!("⚠️ 打开视频输出 {} 失败, 该路不再保存: {:#}", slot.path.display(), e);
                    None
                }
            };
        }

        if let Some(writer) = slot.writer.as_mut() {
            if let Err(e) = writer.write(&frame.image) {
                warn!("⚠️ 写入视频 {} 失败, 该路不再保存: {:#}", slot.path.display(), e);
                slot.writer = None;
            }
        }
    }

    /// `cls cx cy w h [conf]`, 坐标按原始帧尺寸归一化
    fn write_labels(&self, frame: &SourceFrame, name: &str, detections: &[Detection]) -> Result<()> {
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        let file = match frame.mode {
            SourceMode::Image => format!("{}.txt", stem),
            _ => format!("{}_{}.txt", stem, frame.frame_index),
        };
        let path = self.save_dir.join("labels").join(file);
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("打开标签文件 {} 失败", path.display()))?;

        let (w, h) = frame.image.dimensions();
        for d in detections {
            let mut line = d.class_id.to_string();
            for v in d.xywhn(w, h) {
                line.push(' ');
                line.push_str(&format_g(v));
            }
            if self.save_conf {
                line.push(' ');
                line.push_str(&format_g(d.confidence));
            }
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }

    /// 关闭所有视频写入器
    pub fn finish(&mut self) {
        for (_, mut slot) in self.writers.drain() {
            if let Some(mut writer) = slot.writer.take() {
                match writer.finish() {
                    Ok(()) => info!(
                        "💾 视频已保存: {} ({}帧)",
                        writer.path().display(),
                        writer.frames()
                    ),
                    Err(e) => warn!("⚠️ {:#}", e),
                }
            }
        }
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        self.finish();
    }
}

/// 6位小数, 去掉末尾的 0
fn format_g(v: f32) -> String {
    let s = format!("{:.6}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

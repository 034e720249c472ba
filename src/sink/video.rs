// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 视频写入: 原始 RGB 帧通过管道写给 ffmpeg 子进程编码 (MPEG-4)
//!
//! ffmpeg 可执行文件可通过环境变量 `FFMPEG_BIN` 指定

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use image::RgbImage;
use tracing::{debug, info};

use crate::input::letterbox::resize;

pub const FFMPEG_BIN_ENV: &str = "FFMPEG_BIN";

pub fn ffmpeg_bin() -> String {
    std::env::var(FFMPEG_BIN_ENV).unwrap_or_else(|_| "ffmpeg".to_string())
}

pub struct VideoWriter {
    path: PathBuf,
    size: (u32, u32),
    child: Child,
    stdin: Option<ChildStdin>,
    frames: u64,
}

impl VideoWriter {
    /// 启动编码进程
    pub fn open(path: &Path, fps: f64, size: (u32, u32)) -> Result<Self> {
        Self::open_with(&ffmpeg_bin(), path, fps, size)
    }

    /// 使用指定的 ffmpeg 可执行文件
    pub fn open_with(bin: &str, path: &Path, fps: f64, size: (u32, u32)) -> Result<Self> {
        let (w, h) = size;
        if w == 0 || h == 0 {
            bail!("无效的视频尺寸 {}x{}", w, h);
        }
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };

        let mut cmd = Command::new(bin);
        cmd.args(["-y", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", w, h)])
            .args(["-r", &format!("{:.3}", fps)])
            .args(["-i", "-"])
            // yuv420p 需要偶数宽高
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .args(["-c:v", "mpeg4", "-q:v", "5", "-pix_fmt", "yuv420p"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("启动 {} 失败", bin))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("无法获取 ffmpeg 标准输入"))?;

        info!(
            "🎬 视频输出: {} ({}x{} @ {:.1}fps)",
            path.display(),
            w,
            h,
            fps
        );
        Ok(Self {
            path: path.to_path_buf(),
            size,
            child,
            stdin: Some(stdin),
            frames: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// 写入一帧, 尺寸不一致时先缩放到输出尺寸
    pub fn write(&mut self, img: &RgbImage) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("视频 {} 已关闭", self.path.display()))?;
        if img.dimensions() == self.size {
            stdin.write_all(img.as_raw())?;
        } else {
            let scaled = resize(img, self.size.0, self.size.1)?;
            stdin.write_all(scaled.as_raw())?;
        }
        self.frames += 1;
        Ok(())
    }

    /// 关闭输入并等待编码结束
    pub fn finish(&mut self) -> Result<()> {
        let Some(stdin) = self.stdin.take() else {
            return Ok(());
        };
        drop(stdin);
        let status = self.child.wait()?;
        if !status.success() {
            bail!("ffmpeg 编码 {} 失败: {}", self.path.display(), status);
        }
        debug!("视频已保存: {} ({}帧)", self.path.display(), self.frames);
        Ok(())
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            debug!("关闭视频写入失败: {:#}", e);
        }
    }
}

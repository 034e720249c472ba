// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 图片/视频文件加载: 单个文件或目录 (按文件名排序)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::{
    format_list, suffix, LoaderOptions, SourceFrame, SourceMode, IMG_FORMATS, VID_FORMATS,
};
use crate::error::SourceError;

#[cfg(feature = "ffmpeg")]
use super::decoder::{InputSpec, VideoReader};
#[cfg(feature = "ffmpeg")]
use super::CaptureInfo;

/// 文件加载器
pub struct LoadImages {
    files: Vec<PathBuf>,
    video_flag: Vec<bool>,
    nf: usize,
    count: usize,
    opts: LoaderOptions,
    #[cfg(feature = "ffmpeg")]
    video: Option<OpenVideo>,
}

#[cfg(feature = "ffmpeg")]
struct OpenVideo {
    reader: VideoReader,
    frame: u64,
}

impl LoadImages {
    pub fn new(path: &Path, opts: LoaderOptions) -> Result<Self, SourceError> {
        let candidates = if path.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(path)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect();
            entries.sort();
            entries
        } else if path.is_file() {
            let ext = suffix(&path.to_string_lossy());
            if !IMG_FORMATS.contains(ext.as_str()) && !VID_FORMATS.contains(ext.as_str()) {
                return Err(SourceError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    suffix: ext,
                });
            }
            vec![path.to_path_buf()]
        } else {
            return Err(SourceError::NotFound(path.to_path_buf()));
        };

        let mut images = vec![];
        let mut videos = vec![];
        for file in candidates {
            let ext = suffix(&file.to_string_lossy());
            if IMG_FORMATS.contains(ext.as_str()) {
                images.push(file);
            } else if VID_FORMATS.contains(ext.as_str()) {
                videos.push(file);
            }
        }
        if images.is_empty() && videos.is_empty() {
            return Err(SourceError::NoMedia {
                path: path.to_path_buf(),
                images: format_list(&IMG_FORMATS),
                videos: format_list(&VID_FORMATS),
            });
        }
        if !videos.is_empty() && !cfg!(feature = "ffmpeg") {
            return Err(SourceError::FeatureDisabled {
                what: "Video file input",
                feature: "ffmpeg",
            });
        }

        let video_flag = [vec![false; images.len()], vec![true; videos.len()]].concat();
        let files = [images, videos].concat();
        debug!("找到 {} 个文件", files.len());
        Ok(Self {
            nf: files.len(),
            files,
            video_flag,
            count: 0,
            opts,
            #[cfg(feature = "ffmpeg")]
            video: None,
        })
    }

    pub fn len(&self) -> usize {
        self.nf
    }

    pub fn is_empty(&self) -> bool {
        self.nf == 0
    }

    fn read_image(&mut self) -> Result<SourceFrame> {
        let path = &self.files[self.count];
        self.count += 1;
        let image = image::open(path)
            .with_context(|| format!("Image Not Found {}", path.display()))?
            .to_rgb8();
        let mut frame = SourceFrame::build(image, &self.opts, SourceMode::Image)?;
        frame.path = path.to_string_lossy().into_owned();
        frame.description = format!("image {}/{} {}: ", self.count, self.nf, frame.path);
        Ok(frame)
    }

    #[cfg(feature = "ffmpeg")]
    fn read_video(&mut self) -> Option<Result<SourceFrame>> {
        let path = self.files[self.count].clone();
        if self.video.is_none() {
            match VideoReader::open(InputSpec::file(&path.to_string_lossy())) {
                Ok(reader) => self.video = Some(OpenVideo { reader, frame: 0 }),
                Err(e) => {
                    self.count += 1;
                    return Some(Err(e.into()));
                }
            }
        }
        let video = self.video.as_mut()?;

        // 跳帧: 读 vid_stride 帧, 保留最后一帧
        let mut image = None;
        for _ in 0..self.opts.vid_stride.max(1) {
            match video.reader.read() {
                Some(frame) => {
                    video.frame += 1;
                    image = Some(frame);
                }
                None => {
                    image = None;
                    break;
                }
            }
        }

        let Some(image) = image else {
            // 当前视频结束, 切换到下一个文件
            self.video = None;
            self.count += 1;
            return self.next();
        };

        let info = CaptureInfo {
            width: image.width(),
            height: image.height(),
            ..video.reader.info()
        };
        let total = info
            .frames
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());
        let index = video.frame;
        let (count, nf) = (self.count + 1, self.nf);
        let built = SourceFrame::build(image, &self.opts, SourceMode::Video).map(|mut f| {
            f.path = path.to_string_lossy().into_owned();
            f.capture = Some(info);
            f.frame_index = index;
            f.description = format!("video {}/{} ({}/{}) {}: ", count, nf, index, total, f.path);
            f
        });
        Some(built)
    }

    #[cfg(not(feature = "ffmpeg"))]
    fn read_video(&mut self) -> Option<Result<SourceFrame>> {
        // 构造时已拒绝视频文件
        self.count = self.nf;
        None
    }
}

impl Iterator for LoadImages {
    type Item = Result<SourceFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.count >= self.nf {
            return None;
        }
        if self.video_flag[self.count] {
            self.read_video()
        } else {
            Some(self.read_image())
        }
    }
}

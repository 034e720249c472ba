// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 摄像头/网络流加载: 单个源或 `.txt` 流列表, 多路时轮询输出

use std::fs;

use anyhow::Result;
use tracing::{info, warn};

use super::decoder::{InputSpec, VideoReader};
use super::{CaptureInfo, LoaderOptions, SourceFrame, SourceMode};
use crate::error::SourceError;

struct Stream {
    source: String,
    reader: VideoReader,
    frame: u64,
    alive: bool,
}

/// 流加载器 (无限序列, 所有流断开后结束)
pub struct LoadStreams {
    streams: Vec<Stream>,
    cursor: usize,
    opts: LoaderOptions,
}

impl LoadStreams {
    pub fn new(source: &str, opts: LoaderOptions) -> Result<Self, SourceError> {
        let sources: Vec<String> = if source.to_lowercase().ends_with(".txt") {
            fs::read_to_string(source)
                .map_err(|_| SourceError::NotFound(source.into()))?
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()
        } else {
            vec![source.to_string()]
        };
        if sources.is_empty() {
            return Err(SourceError::open(source, "no streams listed"));
        }

        let total = sources.len();
        let mut streams = Vec::with_capacity(total);
        for (i, s) in sources.into_iter().enumerate() {
            let spec = match s.parse::<usize>() {
                Ok(index) => InputSpec::camera(index),
                Err(_) => InputSpec::stream(&s),
            };
            let reader = VideoReader::open(spec)?;
            let info = reader.info();
            info!(
                "{}/{}: {}... Success ✅ ({}x{} at {:.2} FPS)",
                i + 1,
                total,
                s,
                info.width,
                info.height,
                info.fps
            );
            streams.push(Stream {
                source: s,
                reader,
                frame: 0,
                alive: true,
            });
        }

        Ok(Self {
            streams,
            cursor: 0,
            opts,
        })
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl Iterator for LoadStreams {
    type Item = Result<SourceFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.streams.len();
        for _ in 0..n {
            let index = self.cursor % n;
            self.cursor = (self.cursor + 1) % n;
            let stream = &mut self.streams[index];
            if !stream.alive {
                continue;
            }

            let mut image = None;
            for _ in 0..self.opts.vid_stride.max(1) {
                match stream.reader.read() {
                    Some(frame) => {
                        stream.frame += 1;
                        image = Some(frame);
                    }
                    None => {
                        image = None;
                        break;
                    }
                }
            }
            let Some(image) = image else {
                warn!("⚠️ 视频流无响应, 请检查连接: {}", stream.source);
                stream.alive = false;
                continue;
            };

            let capture = CaptureInfo {
                width: image.width(),
                height: image.height(),
                ..stream.reader.info()
            };
            let (path, frame_index) = (stream.source.clone(), stream.frame);
            let built = SourceFrame::build(image, &self.opts, SourceMode::Stream).map(|mut f| {
                f.path = path;
                f.capture = Some(capture);
                f.stream_index = index;
                f.frame_index = frame_index;
                f.description = format!("{}: ", index);
                f
            });
            return Some(built);
        }
        None
    }
}

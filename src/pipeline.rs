// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测流水线 (Orchestration)
//!
//! 输入源 → 检测器 → 绘制/统计 → 输出, 以迭代器形式逐帧产出结果

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::{debug, info};

use crate::config::DetectConfig;
use crate::detection::{ClassCatalog, Detection, Detector};
use crate::input::{self, check_img_size, FrameSource, LoaderOptions};
use crate::models::Model;
use crate::renderer::{Annotator, LabelFont};
use crate::sink::OutputSink;
use crate::stats::{FpsMeter, Profile};

/// 一帧处理结果
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// 已绘制检测框的原始分辨率帧
    pub image: RgbImage,
    pub fps: f64,
    /// (height, width, channels)
    pub shape: (u32, u32, u32),
    /// 实际绘制的检测框数量
    pub detections: usize,
    pub boxes: Vec<Detection>,
    pub description: String,
}

pub struct Pipeline {
    source: Box<dyn FrameSource>,
    detector: Detector,
    annotator: Annotator,
    sink: Option<OutputSink>,
    fps: FpsMeter,
    dt: [Profile; 3], // 预处理/推理/后处理
    seen: u64,
    finished: bool,
}

impl Pipeline {
    /// 打开输入源并预热模型; 输入源错误在这里直接返回
    pub fn open(source: &str, config: &DetectConfig, model: Box<dyn Model>) -> Result<Self> {
        let mut detector = Detector::new(model);
        let stride = detector.stride();
        let imgsz = check_img_size(detector.input_size(config.imgsz), stride);

        let sink = if config.nosave && !config.save_txt {
            None
        } else {
            Some(OutputSink::new(config)?)
        };

        let opts = LoaderOptions {
            imgsz,
            stride,
            auto: config.auto,
            vid_stride: config.vid_stride.max(1),
        };
        let source = input::open(source, opts).with_context(|| format!("打开输入源 {} 失败", source))?;

        detector.warmup(imgsz)?;

        let annotator = Annotator::new(
            ClassCatalog::default(),
            LabelFont::load(config.font.as_deref(), config.line_thickness),
            config.line_thickness,
        );

        Ok(Self {
            source,
            detector,
            annotator,
            sink,
            fps: FpsMeter::new(),
            dt: Default::default(),
            seen: 0,
            finished: false,
        })
    }

    pub fn save_dir(&self) -> Option<&Path> {
        self.sink.as_ref().map(|s| s.save_dir())
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    fn step(&mut self) -> Option<Result<ProcessedFrame>> {
        self.dt[0].start();
        let frame = self.source.next()?;
        self.dt[0].stop();
        let mut frame = match frame {
            Ok(frame) => frame,
            Err(e) => return Some(Err(e)),
        };
        self.seen += 1;

        self.dt[1].start();
        let boxes = match self.detector.detect(&frame.tensor, &frame.letterbox) {
            Ok(boxes) => boxes,
            Err(e) => return Some(Err(e.context("推理失败"))),
        };
        self.dt[1].stop();

        self.dt[2].start();
        let detections = self.annotator.annotate(&mut frame.image, &boxes);
        let fps = self.fps.tick(Instant::now());
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.write(&frame, &boxes) {
                return Some(Err(e));
            }
        }
        self.dt[2].stop();

        debug!(
            "{}{}x{} {}{:.1}ms",
            frame.description,
            frame.letterbox.shape.1,
            frame.letterbox.shape.0,
            if boxes.is_empty() {
                "(no detections), ".to_string()
            } else {
                self.detector.summary(&boxes)
            },
            self.dt[1].mean_ms()
        );

        let shape = frame.shape();
        Some(Ok(ProcessedFrame {
            image: frame.image,
            fps,
            shape,
            detections,
            boxes,
            description: frame.description,
        }))
    }

    /// 打印耗时统计并关闭输出
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.seen > 0 {
            info!(
                "⏱️ Speed: {:.1}ms pre-process, {:.1}ms inference+NMS, {:.1}ms post-process per image ({} frames)",
                self.dt[0].mean_ms(),
                self.dt[1].mean_ms(),
                self.dt[2].mean_ms(),
                self.seen
            );
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.finish();
            info!("💾 Results saved to {}", sink.save_dir().display());
        }
    }
}

impl Iterator for Pipeline {
    type Item = Result<ProcessedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self.step();
        if item.is_none() {
            self.finish();
        }
        item
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use ndarray::Array4;

    /// 按调用次数返回预设结果
    struct ScriptedModel {
        names: Vec<String>,
        script: Vec<Vec<Detection>>,
        calls: usize,
    }

    impl Model for ScriptedModel {
        fn forward(&mut self, _xs: &Array4<f32>) -> Result<Vec<Detection>> {
            let out = self.script.get(self.calls).cloned().unwrap_or_default();
            self.calls += 1;
            Ok(out)
        }

        fn names(&self) -> &[String] {
            &self.names
        }

        // 预热不消耗脚本
        fn warmup(&mut self, _shape: (usize, usize, usize, usize)) -> Result<()> {
            Ok(())
        }
    }

    fn setup(frames: usize) -> (tempfile::TempDir, DetectConfig) {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir(&images).unwrap();
        for i in 0..frames {
            RgbImage::from_pixel(64, 48, Rgb([40, 40, 40]))
                .save(images.join(format!("{}.png", i)))
                .unwrap();
        }
        let config = DetectConfig {
            imgsz: (64, 64),
            project: dir.path().join("runs"),
            ..Default::default()
        };
        (dir, config)
    }

    #[test]
    fn test_pipeline_counts_per_frame() {
        let (dir, config) = setup(3);
        // letterbox: 64x48 → 64x64, 上下各填充 8
        let script = vec![
            vec![],
            vec![
                Detection::new(8., 16., 40., 40., 0, 0.9),
                Detection::new(8., 16., 40., 40., 42, 0.9),
            ],
            vec![],
        ];
        let model = ScriptedModel {
            names: vec!["cardboard".into()],
            script,
            calls: 0,
        };
        let source = dir.path().join("images");
        let mut pipeline =
            Pipeline::open(source.to_str().unwrap(), &config, Box::new(model)).unwrap();
        let frames: Vec<ProcessedFrame> = pipeline.by_ref().map(|f| f.unwrap()).collect();

        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames.iter().map(|f| f.detections).collect::<Vec<_>>(),
            vec![0, 1, 0]
        );
        assert_eq!(frames[1].boxes[0], Detection::new(8., 8., 40., 32., 0, 0.9));
        assert_eq!(frames[0].shape, (48, 64, 3));
        assert_eq!(frames[0].fps, 0.0);
        assert!(frames[2].fps > 0.0 && frames[2].fps.is_finite());
        assert_eq!(pipeline.seen(), 3);

        let save_dir = dir.path().join("runs/exp");
        assert_eq!(pipeline.save_dir(), Some(save_dir.as_path()));
        for i in 0..3 {
            assert!(save_dir.join(format!("{}.png", i)).is_file());
        }
    }

    #[test]
    fn test_missing_source_is_fatal() {
        let (dir, config) = setup(0);
        let model = ScriptedModel {
            names: vec![],
            script: vec![],
            calls: 0,
        };
        let missing = dir.path().join("nope");
        assert!(Pipeline::open(missing.to_str().unwrap(), &config, Box::new(model)).is_err());
    }
}

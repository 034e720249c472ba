// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLO 检测模型 (ONNX Runtime)
// 支持两种输出布局:
//   - YOLOv8/v9: [batch, 4 + nc, anchors]
//   - YOLOv5:    [batch, anchors, 5 + nc] (含 objectness)

use anyhow::{Context, Result};
use ndarray::{Array4, ArrayView2, Axis, Ix3};
use tracing::info;

use crate::config::DetectConfig;
use crate::detection::Detection;
use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};

use super::{non_max_suppression, Model, NmsConfig};

const CXYWH_OFFSET: usize = 4;

/// YOLO 完整模型结构
pub struct YOLO {
    engine: OrtBackend,
    names: Vec<String>,
    stride: u32,
    nms: NmsConfig,
    half: bool,
}

impl YOLO {
    /// 从配置创建模型
    pub fn new(config: &DetectConfig) -> Result<Self> {
        let ep = match config.cuda_device() {
            Some(id) => OrtEP::CUDA(id),
            None => OrtEP::CPU,
        };
        let engine = OrtBackend::build(OrtConfig {
            f: config.weights.clone(),
            ep,
            image_size: config.imgsz,
        })
        .context("Failed to build ONNX Runtime session")?;

        let names = engine
            .names()
            .unwrap_or_else(|| vec!["Unknown".to_string()]);
        let stride = engine.stride().unwrap_or(32);

        Ok(Self {
            engine,
            names,
            stride,
            nms: config.nms(),
            half: config.half,
        })
    }

    /// 输出解码: 每行一个anchor
    fn decode(&self, preds: ArrayView2<f32>) -> Vec<Detection> {
        // 统一成 [anchors, channels]
        let preds = if preds.shape()[0] < preds.shape()[1] {
            preds.reversed_axes()
        } else {
            preds
        };
        let channels = preds.shape()[1];
        let nc = self.names.len();
        let has_objectness = nc > 1 && channels == CXYWH_OFFSET + 1 + nc;
        let cls_offset = if has_objectness {
            CXYWH_OFFSET + 1
        } else {
            CXYWH_OFFSET
        };
        if channels <= cls_offset {
            return vec![];
        }

        let mut ys = Vec::new();
        for pred in preds.axis_iter(Axis(0)) {
            let objectness = if has_objectness { pred[CXYWH_OFFSET] } else { 1.0 };
            let (id, confidence) = pred
                .iter()
                .skip(cls_offset)
                .enumerate()
                .fold((0, f32::MIN), |max, (i, &x)| if x > max.1 { (i, x) } else { max });
            let confidence = confidence * objectness;
            if confidence < self.nms.conf_thres {
                continue;
            }
            ys.push(Detection::from_cxcywh(
                pred[0], pred[1], pred[2], pred[3], id, confidence,
            ));
        }
        ys
    }

    pub fn engine(&self) -> &OrtBackend {
        &self.engine
    }

    pub fn nms(&self) -> &NmsConfig {
        &self.nms
    }
}

impl Model for YOLO {
    fn forward(&mut self, xs: &Array4<f32>) -> Result<Vec<Detection>> {
        let ys = self.engine.run(xs)?;
        let ys = ys
            .into_dimensionality::<Ix3>()
            .context("Unexpected output shape, expected [batch, channels, anchors]")?;
        let preds = ys.index_axis(Axis(0), 0);
        let candidates = self.decode(preds);
        Ok(non_max_suppression(candidates, &self.nms))
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    fn stride(&self) -> u32 {
        self.stride
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        if self.engine.is_width_dynamic() || self.engine.is_height_dynamic() {
            None
        } else {
            Some((self.engine.width(), self.engine.height()))
        }
    }

    fn summary(&self) {
        info!(
            "\nSummary:\n\
            > EP: {:?}{}\n\
            > Height: {} ({}), Width: {} ({})\n\
            > nc: {}, stride: {}, half: {}\n\
            > conf: {}, iou: {}, max_det: {}, agnostic: {}",
            self.engine.ep(),
            if let OrtEP::CPU = self.engine.ep() {
                ""
            } else {
                " (May still fall back to CPU)"
            },
            self.engine.height(),
            if self.engine.is_height_dynamic() {
                "Dynamic"
            } else {
                "Const"
            },
            self.engine.width(),
            if self.engine.is_width_dynamic() {
                "Dynamic"
            } else {
                "Const"
            },
            self.names.len(),
            self.stride,
            self.half,
            self.nms.conf_thres,
            self.nms.iou_thres,
            self.nms.max_det,
            self.nms.agnostic,
        );
    }
}

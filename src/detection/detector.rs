// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测器 (Detector)
//! 职责: 预处理张量 → 外部模型推理+NMS → 坐标还原到原始帧

use std::collections::BTreeMap;

use anyhow::Result;
use ndarray::Array4;
use tracing::info;

use super::types::Detection;
use crate::input::Letterbox;
use crate::models::Model;

pub struct Detector {
    model: Box<dyn Model>,
}

impl Detector {
    pub fn new(model: Box<dyn Model>) -> Self {
        Self { model }
    }

    pub fn stride(&self) -> u32 {
        self.model.stride()
    }

    pub fn names(&self) -> &[String] {
        self.model.names()
    }

    /// 模型固定输入尺寸优先, 否则使用配置的尺寸
    pub fn input_size(&self, configured: (u32, u32)) -> (u32, u32) {
        self.model.input_size().unwrap_or(configured)
    }

    /// 预热 (batch=1)
    pub fn warmup(&mut self, imgsz: (u32, u32)) -> Result<()> {
        let (w, h) = imgsz;
        self.model.warmup((1, 3, h as usize, w as usize))?;
        info!("🔥 模型预热完成 ({}x{})", w, h);
        Ok(())
    }

    /// 单帧检测, 返回原始帧坐标系下的检测框 (已取整)
    pub fn detect(&mut self, xs: &Array4<f32>, letterbox: &Letterbox) -> Result<Vec<Detection>> {
        let ys = self.model.forward(xs)?;
        Ok(ys.into_iter().map(|d| letterbox.scale_box(d)).collect())
    }

    /// 按类别统计: "2 cardboards, 1 glass, "
    pub fn summary(&self, detections: &[Detection]) -> String {
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for d in detections {
            *counts.entry(d.class_id).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(id, n)| {
                let name = self
                    .names()
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| format!("class{}", id));
                format!("{} {}{}, ", n, name, if n > 1 { "s" } else { "" })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedModel {
        names: Vec<String>,
        detections: Vec<Detection>,
    }

    impl Model for FixedModel {
        fn forward(&mut self, _xs: &Array4<f32>) -> Result<Vec<Detection>> {
            Ok(self.detections.clone())
        }

        fn names(&self) -> &[String] {
            &self.names
        }
    }

    fn detector(detections: Vec<Detection>) -> Detector {
        Detector::new(Box::new(FixedModel {
            names: vec!["cardboard".into(), "clothes".into()],
            detections,
        }))
    }

    #[test]
    fn test_detect_rescales_to_original() {
        // 200x100 → 640x640: gain 3.2, 上下各填充 160
        let letterbox = Letterbox::compute((200, 100), (640, 640), 32, false);
        let mut det = detector(vec![Detection::new(32., 192., 160., 320., 0, 0.9)]);
        let xs = Array4::zeros((1, 3, 640, 640));
        let ys = det.detect(&xs, &letterbox).unwrap();
        assert_eq!(ys, vec![Detection::new(10., 10., 50., 50., 0, 0.9)]);
    }

    #[test]
    fn test_summary() {
        let det = detector(vec![]);
        let ds = vec![
            Detection::new(0., 0., 1., 1., 1, 0.5),
            Detection::new(0., 0., 1., 1., 0, 0.5),
            Detection::new(0., 0., 1., 1., 0, 0.5),
            Detection::new(0., 0., 1., 1., 7, 0.5),
        ];
        assert_eq!(det.summary(&ds), "2 cardboards, 1 clothes, 1 class7, ");
        assert_eq!(det.summary(&[]), "");
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 模型统一接口
///
/// # 架构说明
///
/// 检测模型本身 (网络结构、权重加载、推理、NMS) 属于外部推理框架,
/// 这里只约定稳定的调用边界:
///
/// ```text
/// NCHW 张量 (0-1归一化, letterbox尺寸)
///          ↓
///     Model::forward  (推理 + NMS)
///          ↓
/// Vec<Detection>  (letterbox坐标系)
/// ```
///
/// 坐标还原到原始帧由 `detection::Detector` 完成。
///
/// ## 实现
/// - **YOLO** (`onnx` feature): ONNX Runtime 后端, 文件 `yolo.rs`
use anyhow::Result;
use ndarray::Array4;

use crate::config::DetectConfig;
use crate::detection::Detection;

#[cfg(feature = "onnx")]
pub mod yolo;

#[cfg(feature = "onnx")]
pub use yolo::YOLO;

/// 统一的检测模型接口
pub trait Model: Send {
    /// 推理 + NMS
    ///
    /// # Arguments
    /// * `xs` - NCHW格式, 0-1归一化的输入张量
    ///
    /// # Returns
    /// * `Vec<Detection>` - 输入张量坐标系下的检测框
    fn forward(&mut self, xs: &Array4<f32>) -> Result<Vec<Detection>>;

    /// 类别名称 (模型元数据)
    fn names(&self) -> &[String];

    /// 最大下采样倍数
    fn stride(&self) -> u32 {
        32
    }

    /// 模型固定输入尺寸 (width, height), 动态输入返回 None
    fn input_size(&self) -> Option<(u32, u32)> {
        None
    }

    /// 预热: 用全零张量跑一次推理
    fn warmup(&mut self, shape: (usize, usize, usize, usize)) -> Result<()> {
        let xs = Array4::<f32>::zeros(shape);
        self.forward(&xs).map(|_| ())
    }

    /// 打印模型信息
    fn summary(&self) {}
}

/// NMS参数
#[derive(Clone, Debug, PartialEq)]
pub struct NmsConfig {
    pub conf_thres: f32,
    pub iou_thres: f32,
    pub classes: Option<Vec<usize>>,
    pub agnostic: bool,
    pub max_det: usize,
}

impl Default for NmsConfig {
    fn default() -> Self {
        Self {
            conf_thres: 0.25,
            iou_thres: 0.45,
            classes: None,
            agnostic: false,
            max_det: 1000,
        }
    }
}

/// 非极大值抑制
///
/// 置信度过滤 → 类别过滤 → 按置信度降序贪心保留; 非 agnostic 时只抑制同类框
pub fn non_max_suppression(xs: Vec<Detection>, config: &NmsConfig) -> Vec<Detection> {
    let mut xs: Vec<Detection> = xs
        .into_iter()
        .filter(|d| d.confidence >= config.conf_thres)
        .filter(|d| match &config.classes {
            Some(classes) => classes.contains(&d.class_id),
            None => true,
        })
        .collect();
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        if current_index >= config.max_det {
            break;
        }
        let mut drop = false;
        for prev_index in 0..current_index {
            if !config.agnostic && xs[prev_index].class_id != xs[index].class_id {
                continue;
            }
            if xs[prev_index].iou(&xs[index]) > config.iou_thres {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
    xs
}

/// 按配置加载检测模型
#[cfg(feature = "onnx")]
pub fn load_model(config: &DetectConfig) -> Result<Box<dyn Model>> {
    let model = YOLO::new(config)?;
    model.summary();
    Ok(Box::new(model))
}

/// 按配置加载检测模型
#[cfg(not(feature = "onnx"))]
pub fn load_model(config: &DetectConfig) -> Result<Box<dyn Model>> {
    anyhow::bail!(
        "Cannot load {}: built without the `onnx` feature",
        config.weights.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, class_id: usize, confidence: f32) -> Detection {
        Detection::new(x1, 0., x1 + 10., 10., class_id, confidence)
    }

    #[test]
    fn test_nms_suppresses_overlaps() {
        let xs = vec![det(0., 0, 0.8), det(1., 0, 0.9), det(50., 0, 0.7)];
        let ys = non_max_suppression(xs, &NmsConfig::default());
        assert_eq!(ys.len(), 2);
        assert_eq!(ys[0].confidence, 0.9);
        assert_eq!(ys[1].confidence, 0.7);
    }

    #[test]
    fn test_nms_class_aware_and_agnostic() {
        let xs = vec![det(0., 0, 0.9), det(1., 1, 0.8)];
        assert_eq!(non_max_suppression(xs.clone(), &NmsConfig::default()).len(), 2);

        let agnostic = NmsConfig {
            agnostic: true,
            ..Default::default()
        };
        assert_eq!(non_max_suppression(xs, &agnostic).len(), 1);
    }

    #[test]
    fn test_nms_filters() {
        let xs = vec![det(0., 0, 0.9), det(20., 1, 0.8), det(40., 2, 0.1), det(60., 1, 0.7)];
        let config = NmsConfig {
            classes: Some(vec![1]),
            max_det: 1,
            ..Default::default()
        };
        let ys = non_max_suppression(xs, &config);
        assert_eq!(ys, vec![det(20., 1, 0.8)]);
    }
}

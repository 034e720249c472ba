// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测系统 (Detection System)
///
/// - Detector:     外部模型适配 (推理 + 坐标还原 + 统计字符串)
/// - ClassCatalog: 类别名称与显示颜色
/// - Detection:    检测框
pub mod catalog;
pub mod detector;
pub mod types;

pub use catalog::ClassCatalog;
pub use detector::Detector;
pub use types::Detection;

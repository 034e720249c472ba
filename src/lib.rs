// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 检测配置参数
pub mod detection; // 检测结果与模型适配
pub mod error; // 输入源错误
pub mod input; // 输入源 (图片/视频/摄像头/RTSP/桌面)
pub mod models; // 模型接口与具体实现
pub mod pipeline; // 逐帧处理流水线
pub mod renderer; // 检测框绘制
pub mod server; // Web服务
pub mod sink; // 结果保存
pub mod stats; // 帧率/检测数统计

#[cfg(feature = "onnx")]
pub mod ort_backend;

pub use crate::config::{Args, DetectConfig};
pub use crate::detection::{ClassCatalog, Detection, Detector};
pub use crate::error::SourceError;
pub use crate::models::Model;
pub use crate::pipeline::{Pipeline, ProcessedFrame};
pub use crate::stats::{RunStatistics, StatsCell};
#[cfg(feature = "onnx")]
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};

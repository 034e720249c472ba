// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测配置 - 通过JSON文件或命令行调整参数

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::NmsConfig;

/// 检测运行参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    // === 模型 ===
    pub weights: PathBuf, // ONNX模型路径
    pub imgsz: (u32, u32), // 推理尺寸 (width, height)
    pub device: String,    // cpu / cuda / cuda:1
    pub half: bool,        // FP16推理

    // === NMS ===
    pub conf_thres: f32,
    pub iou_thres: f32,
    pub classes: Option<Vec<usize>>, // 类别过滤
    pub agnostic_nms: bool,
    pub max_det: usize,

    // === 输入 ===
    pub vid_stride: usize, // 视频跳帧间隔
    pub auto: bool,        // 最小填充letterbox (动态输入尺寸模型)

    // === 输出 ===
    pub project: PathBuf,
    pub name: String,
    pub exist_ok: bool,
    pub nosave: bool,
    pub save_txt: bool,
    pub save_conf: bool,
    pub line_thickness: u32,
    pub font: Option<PathBuf>, // 标签字体 (TTF/OTF), 未设置时使用内置点阵字体
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            weights: PathBuf::from("weights/yolov9-e.onnx"),
            imgsz: (640, 640),
            device: String::from("cpu"),
            half: false,

            conf_thres: 0.25,
            iou_thres: 0.45,
            classes: None,
            agnostic_nms: false,
            max_det: 1000,

            vid_stride: 1,
            auto: false,

            project: PathBuf::from("runs/detect"),
            name: String::from("exp"),
            exist_ok: false,
            nosave: false,
            save_txt: false,
            save_conf: false,
            line_thickness: 3,
            font: None,
        }
    }
}

impl DetectConfig {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写出默认配置, 解析失败时退回默认值
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {:#}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json).with_context(|| format!("写入 {} 失败", path.display()))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn nms(&self) -> NmsConfig {
        NmsConfig {
            conf_thres: self.conf_thres,
            iou_thres: self.iou_thres,
            classes: self.classes.clone(),
            agnostic: self.agnostic_nms,
            max_det: self.max_det,
        }
    }

    /// CUDA设备号, `cpu` 返回 None
    ///
    /// 接受 `cuda`, `cuda:1`, `0` 三种写法
    pub fn cuda_device(&self) -> Option<i32> {
        let device = self.device.trim().to_lowercase();
        if device.is_empty() || device == "cpu" {
            return None;
        }
        let id = device.strip_prefix("cuda").unwrap_or(device.as_str());
        let id = id.trim_start_matches(':');
        if id.is_empty() {
            return Some(0);
        }
        id.split(',').next().and_then(|s| s.trim().parse().ok())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️ 当前检测配置:");
        info!("  模型: {}", self.weights.display());
        info!("  推理尺寸: {}x{}", self.imgsz.0, self.imgsz.1);
        info!(
            "  置信度/IOU: {:.2} / {:.2}, 最大检测数: {}",
            self.conf_thres, self.iou_thres, self.max_det
        );
        info!("  设备: {} (half: {})", self.device, self.half);
        info!("  输出目录: {}/{}", self.project.display(), self.name);
    }
}

/// 命令行检测参数
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "YOLO 目标检测 (图片/视频/摄像头/RTSP/桌面)", long_about = None)]
pub struct Args {
    /// 输入源: 文件/目录/URL/摄像头序号/`screen`
    #[arg(short, long, default_value = "data/images")]
    pub source: String,

    /// JSON配置文件
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// ONNX模型路径
    #[arg(short, long)]
    pub weights: Option<PathBuf>,

    /// 推理尺寸 (正方形)
    #[arg(long)]
    pub imgsz: Option<u32>,

    /// 置信度阈值
    #[arg(long)]
    pub conf: Option<f32>,

    /// NMS IOU阈值
    #[arg(long)]
    pub iou: Option<f32>,

    /// 只保留这些类别
    #[arg(long, value_delimiter = ',')]
    pub classes: Option<Vec<usize>>,

    /// 推理设备: cpu / cuda:0
    #[arg(long)]
    pub device: Option<String>,

    /// 视频跳帧间隔
    #[arg(long)]
    pub vid_stride: Option<usize>,

    /// 输出到 project/name
    #[arg(long)]
    pub name: Option<String>,

    /// 允许复用已有输出目录
    #[arg(long)]
    pub exist_ok: bool,

    /// 保存YOLO格式标签
    #[arg(long)]
    pub save_txt: bool,

    /// 不保存图片/视频
    #[arg(long)]
    pub nosave: bool,
}

impl Args {
    /// 配置文件 + 命令行覆盖
    pub fn detect_config(&self) -> DetectConfig {
        let mut config = match &self.config {
            Some(path) => DetectConfig::load(path),
            None => DetectConfig::default(),
        };
        if let Some(weights) = &self.weights {
            config.weights = weights.clone();
        }
        if let Some(size) = self.imgsz {
            config.imgsz = (size, size);
        }
        if let Some(conf) = self.conf {
            config.conf_thres = conf;
        }
        if let Some(iou) = self.iou {
            config.iou_thres = iou;
        }
        if self.classes.is_some() {
            config.classes = self.classes.clone();
        }
        if let Some(device) = &self.device {
            config.device = device.clone();
        }
        if let Some(stride) = self.vid_stride {
            config.vid_stride = stride;
        }
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        config.exist_ok |= self.exist_ok;
        config.save_txt |= self.save_txt;
        config.nosave |= self.nosave;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = DetectConfig::default();
        assert_eq!(config.imgsz, (640, 640));
        assert_eq!(config.max_det, 1000);
        assert_eq!(config.vid_stride, 1);
        assert_eq!(config.name, "exp");
    }

    #[test]
    fn test_cuda_device() {
        let mut config = DetectConfig::default();
        assert_eq!(config.cuda_device(), None);
        config.device = "cuda".into();
        assert_eq!(config.cuda_device(), Some(0));
        config.device = "cuda:1".into();
        assert_eq!(config.cuda_device(), Some(1));
        config.device = "2".into();
        assert_eq!(config.cuda_device(), Some(2));
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detect.json");
        let config = DetectConfig::load(&path);
        assert_eq!(config, DetectConfig::default());
        assert!(path.exists());

        let mut changed = config.clone();
        changed.conf_thres = 0.5;
        changed.classes = Some(vec![0, 3]);
        changed.save(&path).unwrap();
        assert_eq!(DetectConfig::load(&path), changed);
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "detect", "--source", "0", "--conf", "0.4", "--imgsz", "320", "--classes", "1,2",
        ]);
        let config = args.detect_config();
        assert_eq!(config.conf_thres, 0.4);
        assert_eq!(config.imgsz, (320, 320));
        assert_eq!(config.classes, Some(vec![1, 2]));
        assert_eq!(args.source, "0");
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! ONNX Runtime 推理引擎封装
//!
//! 只负责: 创建会话、读取模型元数据、执行前向推理

use std::path::PathBuf;

use anyhow::{Context, Result};
use ndarray::{Array4, ArrayD};
use once_cell::sync::Lazy;
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use regex::Regex;
use tracing::{info, warn};

/// Ultralytics导出的类别元数据: `{0: 'person', 1: 'bicycle'}`
static NAMES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(\d+):\s*['"]([^'"]*)['"]"#).unwrap());

/// 执行设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
}

#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
    pub image_size: (u32, u32), // (width, height), 动态输入时使用
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    width: u32,
    height: u32,
    width_dynamic: bool,
    height_dynamic: bool,
    names: Option<Vec<String>>,
    stride: Option<u32>,
}

impl OrtBackend {
    pub fn build(args: OrtConfig) -> Result<Self> {
        let mut builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
        if let OrtEP::CUDA(device_id) = args.ep {
            builder = builder.with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()])?;
        }
        let session = builder
            .commit_from_file(&args.f)
            .with_context(|| format!("加载模型失败: {}", args.f.display()))?;

        // 输入形状 NCHW, 动态维度为 -1
        let dims: Vec<i64> = match session.inputs.first().map(|input| &input.input_type) {
            Some(ValueType::Tensor { dimensions, .. }) => dimensions.clone(),
            _ => vec![],
        };
        let dim = |i: usize| dims.get(i).copied().filter(|d| *d > 0);
        let (height, height_dynamic) = match dim(2) {
            Some(h) => (h as u32, false),
            None => (args.image_size.1, true),
        };
        let (width, width_dynamic) = match dim(3) {
            Some(w) => (w as u32, false),
            None => (args.image_size.0, true),
        };

        // 元数据
        let (names, stride) = match session.metadata() {
            Ok(metadata) => {
                let names = metadata
                    .custom("names")
                    .ok()
                    .flatten()
                    .map(|s| parse_names(&s))
                    .filter(|names| !names.is_empty());
                let stride = metadata
                    .custom("stride")
                    .ok()
                    .flatten()
                    .and_then(|s| s.trim().parse().ok());
                (names, stride)
            }
            Err(e) => {
                warn!("⚠️ 读取模型元数据失败: {}", e);
                (None, None)
            }
        };

        info!(
            "✅ ONNX模型加载成功: {} ({}x{}, {:?})",
            args.f.display(),
            width,
            height,
            args.ep
        );

        Ok(Self {
            session,
            ep: args.ep,
            width,
            height,
            width_dynamic,
            height_dynamic,
            names,
            stride,
        })
    }

    /// 前向推理, 返回第一个输出
    pub fn run(&mut self, xs: &Array4<f32>) -> Result<ArrayD<f32>> {
        let input = Tensor::from_array(xs.clone())?;
        let outputs = self.session.run(ort::inputs![input]?)?;
        let ys = outputs[0].try_extract_tensor::<f32>()?.into_owned();
        Ok(ys)
    }

    pub fn ep(&self) -> OrtEP {
        self.ep
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_width_dynamic(&self) -> bool {
        self.width_dynamic
    }

    pub fn is_height_dynamic(&self) -> bool {
        self.height_dynamic
    }

    pub fn names(&self) -> Option<Vec<String>> {
        self.names.clone()
    }

    pub fn stride(&self) -> Option<u32> {
        self.stride
    }
}

/// 解析 `{0: 'person', 1: 'bicycle'}` 形式的类别表
pub fn parse_names(s: &str) -> Vec<String> {
    let mut pairs: Vec<(usize, String)> = NAMES_RE
        .captures_iter(s)
        .filter_map(|cap| Some((cap[1].parse().ok()?, cap[2].to_string())))
        .collect();
    pairs.sort_by_key(|(id, _)| *id);
    pairs.into_iter().map(|(_, name)| name).collect()
}

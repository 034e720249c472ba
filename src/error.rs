// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 输入源错误
//!
//! 输入源在开始迭代之前完成校验, 以下错误均视为致命错误直接返回给调用方

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{0} does not exist")]
    NotFound(PathBuf),

    #[error("No images or videos found in {path}. Supported formats are:\nimages: {images}\nvideos: {videos}")]
    NoMedia {
        path: PathBuf,
        images: String,
        videos: String,
    },

    #[error("Unsupported file suffix `{suffix}` for {path}")]
    UnsupportedFormat { path: PathBuf, suffix: String },

    #[error("Invalid screen source `{0}`, expected `screen [index] [left top width height]`")]
    InvalidScreen(String),

    #[error("Failed to open {source_name}: {reason}")]
    Open { source_name: String, reason: String },

    #[error("Failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("{what} requires the `{feature}` feature")]
    FeatureDisabled {
        what: &'static str,
        feature: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn open<S: Into<String>, R: ToString>(source_name: S, reason: R) -> Self {
        Self::Open {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}

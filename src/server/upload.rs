// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 上传文件处理: 文件名清洗 + 落盘

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use axum::extract::Multipart;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

/// 表单中的文件字段名
pub const FILE_FIELD: &str = "file";

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap());

const WINDOWS_DEVICE_FILES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// 把客户端提供的文件名变成安全的单层文件名
///
/// 路径分隔符当作空白, 空白折叠为 `_`, 只保留 `[A-Za-z0-9_.-]`,
/// 去掉首尾的 `.` 和 `_`. 结果可能为空.
///
/// `../../etc/passwd` → `etc_passwd`
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_CHARS.replace_all(&joined, "");
    let name = cleaned.trim_matches(|c| c == '.' || c == '_').to_string();

    let stem = name.split('.').next().unwrap_or_default().to_ascii_uppercase();
    if WINDOWS_DEVICE_FILES.contains(&stem.as_str()) {
        return format!("_{}", name);
    }
    name
}

/// 一次上传的结果
#[derive(Debug, Clone, PartialEq)]
pub struct StoredUpload {
    pub filename: String,
    pub path: PathBuf,
}

/// 读取表单中的 `file` 字段并写入上传目录
///
/// 没有文件字段或文件内容为空时返回 None
pub async fn store_upload(mut multipart: Multipart, dir: &Path) -> Result<Option<StoredUpload>> {
    while let Some(mut field) = multipart.next_field().await.context("读取上传表单失败")? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let original = field.file_name().unwrap_or_default().to_string();
        if original.is_empty() {
            return Ok(None);
        }
        // 空文件不落盘
        let Some(first) = field.chunk().await.context("读取上传文件失败")? else {
            return Ok(None);
        };

        let mut filename = secure_filename(&original);
        if filename.is_empty() {
            filename = format!("upload_{}", Uuid::new_v4().simple());
        }
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("创建上传目录 {} 失败", dir.display()))?;
        let path = dir.join(&filename);
        let mut file = File::create(&path)
            .await
            .with_context(|| format!("创建上传文件 {} 失败", path.display()))?;

        let mut size = first.len();
        file.write_all(&first).await?;
        while let Some(chunk) = field.chunk().await.context("读取上传文件失败")? {
            size += chunk.len();
            file.write_all(&chunk).await?;
        }
        file.flush()
            .await
            .with_context(|| format!("保存上传文件 {} 失败", path.display()))?;
        info!("📥 已上传 {} → {} ({} bytes)", original, path.display(), size);
        return Ok(Some(StoredUpload { filename, path }));
    }
    Ok(None)
}

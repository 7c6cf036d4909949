//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `ImageSource` 表示外部来源语义（本地文件 / 远程 URL）
//! - `RawImageData` 表示已加载但未解码的字节
//! - `CroppedImage` 表示最终交给保存流程的方形图片
//!
//! 字节统一使用 `bytes::Bytes`，会话快照与缓存命中时克隆只增加引用计数。

use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::CropError;

/// 用户在文件选择器中选中的本地文件。
#[derive(Debug, Clone)]
pub struct LocalFile {
    /// 原始文件名（含扩展名）。
    pub name: String,
    /// 文件内容。
    pub bytes: Bytes,
    /// 最后修改时间（Unix 毫秒）。
    pub last_modified: i64,
    /// 选择器声明的 MIME 类型；为空时在加载阶段按文件签名推断。
    pub mime_type: Option<String>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>, last_modified: i64) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            last_modified,
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// 字节大小。
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// 从磁盘读取文件，模拟文件选择器给出的 `File` 对象。
    ///
    /// 文件名取路径最后一段，修改时间取 metadata，MIME 通过文件签名推断。
    pub fn from_path(path: &Path, max_file_size: u64) -> Result<Self, CropError> {
        log::info!("📁 开始读取本地图片 - 路径: {}", path.display());

        if !path.exists() {
            return Err(CropError::FileSystem(format!(
                "文件不存在：{}",
                path.display()
            )));
        }

        let metadata = std::fs::metadata(path)
            .map_err(|e| CropError::FileSystem(format!("无法读取文件信息：{}", e)))?;

        if metadata.len() > max_file_size {
            return Err(CropError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = std::fs::read(path)
            .map_err(|e| CropError::FileSystem(format!("无法读取图片文件：{}", e)))?;

        let last_modified = metadata
            .modified()
            .map(|time| DateTime::<Utc>::from(time).timestamp_millis())
            .unwrap_or(0);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project-image".to_string());

        let mime_type = infer::get(&bytes).map(|kind| kind.mime_type().to_string());

        Ok(Self {
            name,
            bytes: Bytes::from(bytes),
            last_modified,
            mime_type,
        })
    }
}

/// 裁剪输入来源。
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// 本地选中的文件。
    File(LocalFile),
    /// 已存储的远程地址（也接受 `data:image/...;base64,` 形式）。
    Url(String),
}

impl ImageSource {
    /// 来源标识，参与缓存签名。
    ///
    /// 文件：`名称|大小|修改时间`；URL：原样使用。
    pub fn identity(&self) -> String {
        match self {
            Self::File(file) => format!("{}|{}|{}", file.name, file.size(), file.last_modified),
            Self::Url(url) => url.clone(),
        }
    }

    pub(crate) fn hint(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Url(url) if url.trim_start().starts_with("data:") => "data-url",
            Self::Url(_) => "url",
        }
    }
}

/// 加载阶段输出：原始字节、原始名称与 MIME。
pub(crate) struct RawImageData {
    pub(crate) bytes: Bytes,
    /// 用于推导输出文件名的原始名称。
    pub(crate) name: String,
    /// 来源 MIME（可能不在安全输出集合中，编码阶段再归一化）。
    pub(crate) mime_type: String,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 光栅化输出：方形图片文件。
#[derive(Debug, Clone)]
pub struct CroppedImage {
    /// 输出文件名，例如 `cover-square.jpg`。
    pub name: String,
    /// 输出 MIME 类型。
    pub mime_type: &'static str,
    /// 编码后的文件字节。
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
}

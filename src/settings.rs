//! 设置文件模块
//!
//! # 设计思路
//!
//! `CropConfig` 中一部分参数允许用户通过 JSON 设置文件调整（超时、体积上限、
//! 重采样档位、JPEG 质量等），其余保持生产默认值。
//!
//! # 实现思路
//!
//! - `CropSettings` 使用 `serde(default)`，缺失字段回落到默认配置。
//! - 应用前统一校验取值范围，非法值整体拒绝，不做部分应用。
//! - 文件不存在时返回 `None`，由调用方决定是否使用默认值。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crop::{CropConfig, ResampleProfile};
use crate::error::AppError;

const MIN_MAX_DECODED_BYTES: u64 = 8 * 1024 * 1024;
const MIN_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// 可由用户调整的裁剪参数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropSettings {
    /// 重采样档位：`quality` / `balanced` / `speed`。
    pub profile: String,
    pub allow_private_network: bool,
    pub max_file_size: u64,
    pub download_timeout: u64,
    pub connect_timeout: u64,
    pub stream_first_byte_timeout_ms: u64,
    pub stream_chunk_timeout_ms: u64,
    pub max_decoded_bytes: u64,
    pub jpeg_quality: u8,
}

impl Default for CropSettings {
    fn default() -> Self {
        Self::from_config(&CropConfig::default())
    }
}

impl CropSettings {
    /// 从当前配置导出设置（用于保存）。
    pub fn from_config(config: &CropConfig) -> Self {
        Self {
            profile: config.infer_resample_profile().as_str().to_string(),
            allow_private_network: config.allow_private_network,
            max_file_size: config.max_file_size,
            download_timeout: config.download_timeout,
            connect_timeout: config.connect_timeout,
            stream_first_byte_timeout_ms: config.stream_first_byte_timeout_ms,
            stream_chunk_timeout_ms: config.stream_chunk_timeout_ms,
            max_decoded_bytes: config.max_decoded_bytes,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// 校验取值范围。
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_decoded_bytes < MIN_MAX_DECODED_BYTES {
            return Err(AppError::Config("max_decoded_bytes 不能小于 8MB".to_string()));
        }
        if self.max_file_size < MIN_MAX_FILE_SIZE {
            return Err(AppError::Config("max_file_size 不能小于 1MB".to_string()));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(AppError::Config("connect_timeout 必须在 1~120 秒之间".to_string()));
        }
        if !(1..=300).contains(&self.download_timeout) {
            return Err(AppError::Config("download_timeout 必须在 1~300 秒之间".to_string()));
        }
        if !(500..=120_000).contains(&self.stream_first_byte_timeout_ms) {
            return Err(AppError::Config(
                "stream_first_byte_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if !(500..=120_000).contains(&self.stream_chunk_timeout_ms) {
            return Err(AppError::Config(
                "stream_chunk_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(AppError::Config("jpeg_quality 必须在 1~100 之间".to_string()));
        }
        ResampleProfile::parse(&self.profile)?;
        Ok(())
    }

    /// 在 `base` 基础上应用设置，返回新配置。
    pub fn apply_to(&self, base: &CropConfig) -> Result<CropConfig, AppError> {
        self.validate()?;
        let profile = ResampleProfile::parse(&self.profile)?;

        let mut config = base.clone();
        config.allow_private_network = self.allow_private_network;
        config.max_file_size = self.max_file_size;
        config.download_timeout = self.download_timeout;
        config.connect_timeout = self.connect_timeout;
        config.stream_first_byte_timeout_ms = self.stream_first_byte_timeout_ms;
        config.stream_chunk_timeout_ms = self.stream_chunk_timeout_ms;
        config.max_decoded_bytes = self.max_decoded_bytes;
        config.jpeg_quality = self.jpeg_quality;
        config.apply_resample_profile(profile);

        Ok(config)
    }
}

/// 读取设置文件；文件不存在时返回 `Ok(None)`。
pub fn load_settings(path: &Path) -> Result<Option<CropSettings>, AppError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    let parsed = serde_json::from_str::<CropSettings>(&content)
        .map_err(|e| AppError::Config(format!("解析设置文件失败: {}", e)))?;

    parsed.validate()?;
    Ok(Some(parsed))
}

/// 保存设置文件，父目录不存在时自动创建。
pub fn save_settings(path: &Path, settings: &CropSettings) -> Result<(), AppError> {
    settings.validate()?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Storage(format!("创建设置目录失败: {}", e)))?;
        }
    }

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| AppError::Config(format!("序列化设置失败: {}", e)))?;

    fs::write(path, content)?;
    Ok(())
}

/// 按设置文件生成配置；未提供路径或文件不存在时使用默认配置。
pub fn load_config(path: Option<&Path>) -> Result<CropConfig, AppError> {
    let base = CropConfig::default();
    let Some(path) = path else {
        return Ok(base);
    };

    match load_settings(path)? {
        Some(settings) => {
            log::info!("⚙️ 已加载设置文件：{}", path.display());
            settings.apply_to(&base)
        }
        None => {
            log::warn!("⚠️ 设置文件不存在，使用默认配置：{}", path.display());
            Ok(base)
        }
    }
}

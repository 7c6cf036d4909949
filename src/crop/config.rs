//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `CropConfig`，保证运行时行为可观测、可调整、可测试。
//! 其中重采样档位（quality / balanced / speed）作为高层语义，映射到放大时使用的滤镜。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的平衡配置。
//! - `ResampleProfile` 负责档位字符串解析与反向输出。
//! - `apply_resample_profile` 将档位转换为具体滤镜。
//! - `infer_resample_profile` 用于从当前配置反推档位。

use image::imageops::FilterType;

use super::CropError;

/// JPEG 输出默认质量（对应画布导出时的 0.92）。
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

/// 裁剪处理配置。
///
/// 字段覆盖了下载、解码与编码三个阶段。
#[derive(Debug, Clone)]
pub struct CropConfig {
    /// 下载/读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 网络下载超时时间（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 下载首包超时时间（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 下载分块读取超时时间（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 是否允许访问内网或本地地址（默认关闭）。
    pub allow_private_network: bool,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// JPEG 编码质量（1~100）。
    pub jpeg_quality: u8,
    /// 放大裁剪区域时使用的滤镜。
    pub resize_filter: FilterType,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            max_redirects: 5,
            allow_private_network: false,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            resize_filter: FilterType::Triangle,
        }
    }
}

/// 重采样档位。
///
/// - `Quality`：放大时尽量平滑
/// - `Balanced`：质量与速度平衡
/// - `Speed`：最近邻，速度优先
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleProfile {
    Quality,
    Balanced,
    Speed,
}

impl ResampleProfile {
    /// 从外部字符串解析档位。
    ///
    /// # 示例
    /// ```rust
    /// use asap_crop::crop::ResampleProfile;
    ///
    /// let p = ResampleProfile::parse("Balanced")?;
    /// assert_eq!(p.as_str(), "balanced");
    /// # Ok::<(), asap_crop::crop::CropError>(())
    /// ```
    pub fn parse(profile: &str) -> Result<Self, CropError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(CropError::InvalidFormat(format!(
                "未知重采样档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }
}

impl CropConfig {
    /// 基于当前滤镜反推档位。
    pub(crate) fn infer_resample_profile(&self) -> ResampleProfile {
        match self.resize_filter {
            FilterType::Nearest => ResampleProfile::Speed,
            FilterType::CatmullRom | FilterType::Lanczos3 | FilterType::Gaussian => {
                ResampleProfile::Quality
            }
            FilterType::Triangle => ResampleProfile::Balanced,
        }
    }

    pub(crate) fn apply_resample_profile(&mut self, profile: ResampleProfile) {
        self.resize_filter = match profile {
            ResampleProfile::Quality => FilterType::CatmullRom,
            ResampleProfile::Balanced => FilterType::Triangle,
            ResampleProfile::Speed => FilterType::Nearest,
        };
    }
}

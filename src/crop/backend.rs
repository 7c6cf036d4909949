//! # 光栅化能力接口
//!
//! ## 设计思路
//!
//! 几何约定（采样哪一块、输出多大）由 `geometry` 决定，
//! 真正的“解码 / 绘制 / 编码”通过 `RasterBackend` 抽象，
//! 便于替换成其他图像库，也便于测试中统计调用次数。
//!
//! 默认实现见 `pipeline::ImageCrateBackend`。

use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};

use super::geometry::CropRect;
use super::naming::OutputFormat;
use super::{CropConfig, CropError};

/// 解码、方形裁剪绘制与编码三项能力。
///
/// 实现需满足：
/// - `decode` 失败返回 `CropError::Decode` 或 `CropError::ResourceLimit`
/// - `draw_square_crop` 输出恒为 `rect.square_size` 见方
/// - `draw_square_crop` / `encode` 失败返回 `CropError::Rasterization`
pub trait RasterBackend: Send + Sync {
    fn decode(&self, bytes: &[u8], config: &CropConfig) -> Result<DynamicImage, CropError>;

    fn draw_square_crop(
        &self,
        image: &DynamicImage,
        rect: &CropRect,
        filter: FilterType,
    ) -> Result<RgbaImage, CropError>;

    fn encode(
        &self,
        image: RgbaImage,
        format: OutputFormat,
        jpeg_quality: u8,
    ) -> Result<Vec<u8>, CropError>;
}

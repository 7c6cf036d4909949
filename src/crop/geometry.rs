//! 方形裁剪几何计算。
//!
//! 输入为源图尺寸、裁剪位置与缩放，输出源图中要采样的正方形区域
//! 以及输出画布边长。计算只依赖整数像素与四舍五入，结果确定。

use super::CropError;
use super::state::{CropPosition, ZoomFactor};

/// 一次光栅化所需的全部几何量。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    /// 输出边长：源图最短边（缩放 1 时可得到的最大方形）。
    pub square_size: u32,
    /// 当前缩放下实际采样的源区域边长，至少 1 像素。
    pub source_side: u32,
    pub overflow_x: u32,
    pub overflow_y: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl CropRect {
    /// 计算采样区域。
    ///
    /// 宽或高为 0 的位图无法裁剪，返回 `CropError::Decode`。
    pub fn compute(
        width: u32,
        height: u32,
        position: CropPosition,
        zoom: ZoomFactor,
    ) -> Result<Self, CropError> {
        if width == 0 || height == 0 {
            return Err(CropError::Decode(format!(
                "图片缺少有效尺寸：{}x{}",
                width, height
            )));
        }

        let square_size = width.min(height);
        let source_side = ((square_size as f64 / zoom.value()).round() as u32).max(1);

        let overflow_x = width.saturating_sub(source_side);
        let overflow_y = height.saturating_sub(source_side);

        let offset_x = Self::offset_for(overflow_x, position.x_percent);
        let offset_y = Self::offset_for(overflow_y, position.y_percent);

        Ok(Self {
            square_size,
            source_side,
            overflow_x,
            overflow_y,
            offset_x,
            offset_y,
        })
    }

    fn offset_for(overflow: u32, percent: f64) -> u32 {
        let raw = (overflow as f64 * percent / 100.0).round();
        (raw.max(0.0) as u32).min(overflow)
    }

    /// 缩放为 1 时采样区域与输出等大，无需重采样。
    pub fn is_identity_scale(&self) -> bool {
        self.source_side == self.square_size
    }
}

//! # 解码与绘制流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → 方形裁剪 → 编码字节”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 按像素/内存上限快速拒绝
//! 3. 完整解码，并按 EXIF 方向摆正
//! 4. 截取采样区域，必要时用 `fast_image_resize` 放大到输出边长
//! 5. 按输出格式编码（JPEG 使用固定质量）

use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{
    DynamicImage, GenericImageView, ImageBuffer, ImageDecoder, ImageReader, Rgba, RgbaImage,
};
use std::io::Cursor;

use super::backend::RasterBackend;
use super::geometry::CropRect;
use super::naming::OutputFormat;
use super::{CropConfig, CropError};

/// 基于 `image` + `fast_image_resize` 的默认光栅化实现。
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateBackend;

impl RasterBackend for ImageCrateBackend {
    fn decode(&self, bytes: &[u8], config: &CropConfig) -> Result<DynamicImage, CropError> {
        let mut decoder = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CropError::Decode(format!("无法识别图片格式：{}", e)))?
            .into_decoder()
            .map_err(|e| CropError::Decode(format!("无法读取图片头信息：{}", e)))?;

        let (header_width, header_height) = decoder.dimensions();
        Self::validate_pixel_limits(config, header_width, header_height)?;
        Self::validate_decoded_memory_limits(config, header_width, header_height)?;

        let orientation = decoder.orientation().unwrap_or_else(|e| {
            log::debug!("📷 读取 EXIF 方向失败，按原始方向处理：{}", e);
            Orientation::NoTransforms
        });

        let mut decoded = DynamicImage::from_decoder(decoder)
            .map_err(|e| CropError::Decode(format!("图片解码失败：{}", e)))?;
        // 与浏览器一致，按 EXIF 方向摆正后再参与几何计算。
        decoded.apply_orientation(orientation);

        let (width, height) = decoded.dimensions();
        Self::validate_pixel_limits(config, width, height)?;
        Self::validate_decoded_memory_limits(config, width, height)?;

        Ok(decoded)
    }

    fn draw_square_crop(
        &self,
        image: &DynamicImage,
        rect: &CropRect,
        filter: FilterType,
    ) -> Result<RgbaImage, CropError> {
        let (width, height) = image.dimensions();
        let fits_x = rect.offset_x.checked_add(rect.source_side).is_some_and(|end| end <= width);
        let fits_y = rect.offset_y.checked_add(rect.source_side).is_some_and(|end| end <= height);
        if !fits_x || !fits_y {
            return Err(CropError::Rasterization(format!(
                "采样区域越界：({}, {}) 边长 {}，图片 {}x{}",
                rect.offset_x, rect.offset_y, rect.source_side, width, height
            )));
        }

        let region = image
            .crop_imm(rect.offset_x, rect.offset_y, rect.source_side, rect.source_side)
            .to_rgba8();

        if rect.is_identity_scale() {
            return Ok(region);
        }

        match Self::resize_with_fast_image_resize(&region, rect.square_size, filter) {
            Ok(resized) => Ok(resized),
            Err(err) => {
                log::warn!(
                    "⚠️ fast_image_resize 放大失败，回退 image::imageops::resize：{}",
                    err
                );
                Ok(image::imageops::resize(
                    &region,
                    rect.square_size,
                    rect.square_size,
                    filter,
                ))
            }
        }
    }

    fn encode(
        &self,
        image: RgbaImage,
        format: OutputFormat,
        jpeg_quality: u8,
    ) -> Result<Vec<u8>, CropError> {
        let mut cursor = Cursor::new(Vec::new());

        match format {
            OutputFormat::Jpeg => {
                // JPEG 不支持透明通道，先丢弃 alpha。
                let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
                JpegEncoder::new_with_quality(&mut cursor, jpeg_quality)
                    .encode_image(&rgb)
                    .map_err(|e| CropError::Rasterization(format!("JPEG 编码失败：{}", e)))?;
            }
            OutputFormat::Png | OutputFormat::WebP => {
                DynamicImage::ImageRgba8(image)
                    .write_to(&mut cursor, format.image_format())
                    .map_err(|e| {
                        CropError::Rasterization(format!(
                            "{} 编码失败：{}",
                            format.mime_type(),
                            e
                        ))
                    })?;
            }
        }

        let bytes = cursor.into_inner();
        if bytes.is_empty() {
            return Err(CropError::Rasterization("编码结果为空".to_string()));
        }

        Ok(bytes)
    }
}

impl ImageCrateBackend {
    fn validate_pixel_limits(
        config: &CropConfig,
        width: u32,
        height: u32,
    ) -> Result<(), CropError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| CropError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > config.max_decoded_pixels {
            return Err(CropError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, config.max_decoded_pixels
            )));
        }

        Ok(())
    }

    fn validate_decoded_memory_limits(
        config: &CropConfig,
        width: u32,
        height: u32,
    ) -> Result<(), CropError> {
        let estimated = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| CropError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > config.max_decoded_bytes {
            return Err(CropError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }

    fn resize_with_fast_image_resize(
        region: &RgbaImage,
        target_side: u32,
        filter: FilterType,
    ) -> Result<RgbaImage, CropError> {
        let (src_width, src_height) = region.dimensions();

        let src_image = fr::images::ImageRef::new(
            src_width,
            src_height,
            region.as_raw(),
            fr::PixelType::U8x4,
        )
        .map_err(|e| CropError::Rasterization(format!("构建源图像缓冲失败：{}", e)))?;

        let mut dst_image = fr::images::Image::new(target_side, target_side, fr::PixelType::U8x4);

        let mut resizer = fr::Resizer::new();
        let options = fr::ResizeOptions::new().resize_alg(Self::to_fast_alg(filter));

        resizer
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| CropError::Rasterization(format!("fast_image_resize 执行失败：{}", e)))?;

        ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(target_side, target_side, dst_image.into_vec())
            .ok_or_else(|| {
                CropError::Rasterization("fast_image_resize 输出缓冲长度异常".to_string())
            })
    }

    fn to_fast_alg(filter: FilterType) -> fr::ResizeAlg {
        match filter {
            FilterType::Nearest => fr::ResizeAlg::Nearest,
            FilterType::Triangle => fr::ResizeAlg::Convolution(fr::FilterType::Bilinear),
            FilterType::CatmullRom => fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom),
            FilterType::Gaussian => fr::ResizeAlg::Convolution(fr::FilterType::Mitchell),
            FilterType::Lanczos3 => fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3),
        }
    }
}

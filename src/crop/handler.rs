//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `CropHandler` 只负责流程编排与配置管理，不持有任何会话状态。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 按来源加载原始字节
//! 3. 解码并计算采样区域
//! 4. 绘制方形裁剪并编码
//! 5. 推导输出文件名
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<CropConfig>>` 支持运行时动态切档。
//! - 单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 记录 `load/decode/draw/encode/total` 阶段耗时，便于性能诊断。

use std::sync::{Arc, RwLock};
use std::time::Instant;

use image::GenericImageView;

use super::backend::RasterBackend;
use super::geometry::CropRect;
use super::naming::{OutputFormat, build_cropped_file_name};
use super::pipeline::ImageCrateBackend;
use super::source::CroppedImage;
use super::state::{CropPosition, ZoomFactor};
use super::{CropConfig, CropError, ImageSource, ResampleProfile};

/// 裁剪光栅化处理器。
pub struct CropHandler {
    pub(super) config: Arc<RwLock<CropConfig>>,
    backend: Arc<dyn RasterBackend>,
}

impl CropHandler {
    /// 使用默认光栅化实现创建处理器。
    ///
    /// # 示例
    /// ```rust
    /// use asap_crop::crop::{CropConfig, CropHandler};
    ///
    /// let handler = CropHandler::new(CropConfig::default())?;
    /// # Ok::<(), asap_crop::crop::CropError>(())
    /// ```
    pub fn new(config: CropConfig) -> Result<Self, CropError> {
        Self::with_backend(config, Arc::new(ImageCrateBackend))
    }

    /// 注入自定义光栅化实现。
    pub fn with_backend(
        config: CropConfig,
        backend: Arc<dyn RasterBackend>,
    ) -> Result<Self, CropError> {
        Self::validate_jpeg_quality(config.jpeg_quality)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            backend,
        })
    }

    fn validate_jpeg_quality(quality: u8) -> Result<(), CropError> {
        if !(1..=100).contains(&quality) {
            return Err(CropError::InvalidFormat(format!(
                "jpeg_quality 必须在 1~100 之间：{}",
                quality
            )));
        }
        Ok(())
    }

    /// 获取配置快照。
    pub fn config_snapshot(&self) -> Result<CropConfig, CropError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| CropError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 整体替换配置（设置文件加载后使用）。
    pub fn replace_config(&self, next: CropConfig) -> Result<(), CropError> {
        Self::validate_jpeg_quality(next.jpeg_quality)?;
        let mut config = self
            .config
            .write()
            .map_err(|_| CropError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        *config = next;
        Ok(())
    }

    /// 设置重采样档位。
    pub fn set_resample_profile(&self, profile: ResampleProfile) -> Result<(), CropError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| CropError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        config.apply_resample_profile(profile);

        log::info!(
            "⚙️ 已切换重采样档位：{:?}（filter={:?}）",
            profile,
            config.resize_filter
        );

        Ok(())
    }

    pub fn get_resample_profile(&self) -> Result<ResampleProfile, CropError> {
        let config = self
            .config
            .read()
            .map_err(|_| CropError::ResourceLimit("配置读取锁已中毒".to_string()))?;
        Ok(config.infer_resample_profile())
    }

    /// 处理主入口：按当前裁剪状态生成方形图片。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use asap_crop::crop::{CropConfig, CropHandler, CropPosition, ImageSource, ZoomFactor};
    ///
    /// # async fn demo() -> Result<(), asap_crop::crop::CropError> {
    /// let handler = CropHandler::new(CropConfig::default())?;
    /// let cropped = handler
    ///     .rasterize(
    ///         &ImageSource::Url("https://cdn.example.com/p/cover.jpg".into()),
    ///         CropPosition::CENTER,
    ///         ZoomFactor::new(1.5),
    ///     )
    ///     .await?;
    /// assert_eq!(cropped.width, cropped.height);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn rasterize(
        &self,
        source: &ImageSource,
        position: CropPosition,
        zoom: ZoomFactor,
    ) -> Result<CroppedImage, CropError> {
        let config = self.config_snapshot()?;
        let total_start = Instant::now();

        let load_start = Instant::now();
        let raw = self.load_source(source, &config).await?;
        let load_elapsed = load_start.elapsed();

        // 解码结果只在本作用域内存活，任何提前返回都会释放像素缓冲。
        let decode_start = Instant::now();
        let decoded = self.backend.decode(&raw.bytes, &config)?;
        let decode_elapsed = decode_start.elapsed();

        let (width, height) = decoded.dimensions();
        let rect = CropRect::compute(width, height, position, zoom)?;

        let draw_start = Instant::now();
        let square = self
            .backend
            .draw_square_crop(&decoded, &rect, config.resize_filter)?;
        drop(decoded);
        let draw_elapsed = draw_start.elapsed();

        let (out_width, out_height) = square.dimensions();
        if out_width != rect.square_size || out_height != rect.square_size {
            return Err(CropError::Rasterization(format!(
                "绘制结果尺寸异常：{}x{}（期望 {}x{}）",
                out_width, out_height, rect.square_size, rect.square_size
            )));
        }

        let format = OutputFormat::from_source_mime(Some(&raw.mime_type));
        let encode_start = Instant::now();
        let bytes = self.backend.encode(square, format, config.jpeg_quality)?;
        let encode_elapsed = encode_start.elapsed();

        let name = build_cropped_file_name(&raw.name, format);

        log::info!(
            "✅ 裁剪完成 - 来源: {} 原始尺寸: {}x{} 采样: {}px@({}, {}) 输出: {} {}x{} \
             load={}ms decode={}ms draw={}ms encode={}ms total={}ms",
            raw.source_hint,
            width,
            height,
            rect.source_side,
            rect.offset_x,
            rect.offset_y,
            name,
            rect.square_size,
            rect.square_size,
            load_elapsed.as_millis(),
            decode_elapsed.as_millis(),
            draw_elapsed.as_millis(),
            encode_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(CroppedImage {
            name,
            mime_type: format.mime_type(),
            bytes: bytes.into(),
            width: rect.square_size,
            height: rect.square_size,
        })
    }
}

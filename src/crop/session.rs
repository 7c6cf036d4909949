//! # 会话层（单张图片的裁剪交互）
//!
//! ## 设计思路
//!
//! `CropSession` 承载一次“选图 → 拖拽/缩放 → 提交”的全部状态：
//! 来源、裁剪状态、拖拽会话与单槽缓存。缓存是实例字段而非全局变量，
//! 生命周期为“首次光栅化时创建，签名变化时替换，来源清空时清除”。
//!
//! ## 实现思路
//!
//! - 交互更新全部是同步的 `&mut self` 调用，不会挂起。
//! - 提交时先生成 `RasterRequest` 快照（含签名与来源代数），
//!   光栅化完成后再由 `finish_rasterization` 校验快照是否仍然有效：
//!   来源或裁剪状态已变化则丢弃结果，不写缓存。
//! - 光栅化失败不阻塞提交：记录日志后回退为原始来源。

use super::drag::{DragSession, Viewport, apply_drag_delta};
use super::state::{CropPosition, CropState, DEFAULT_ZOOM, ZoomFactor, parse_zoom_input};
use super::{CropError, CropHandler, CroppedImage, ImageSource};

/// 单槽缓存条目。
#[derive(Debug, Clone)]
pub struct CropCacheEntry {
    pub signature: String,
    pub output: CroppedImage,
}

/// 提交前的光栅化请求快照。
#[derive(Debug, Clone)]
pub struct RasterRequest {
    pub source: ImageSource,
    pub position: CropPosition,
    pub zoom: ZoomFactor,
    pub signature: String,
    generation: u64,
}

/// 提交计划：无需处理、命中缓存、或需要光栅化。
#[derive(Debug, Clone)]
pub enum SubmitPlan {
    NoImage,
    Cached(CroppedImage),
    Render(RasterRequest),
}

/// 交给保存流程的结果。
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// 当前没有选中图片。
    NoImage,
    /// 方形裁剪结果（新生成或命中缓存）。
    Cropped(CroppedImage),
    /// 光栅化失败，回退为原始来源。
    Original(ImageSource),
    /// 结果到达时状态已变化，已丢弃。
    Discarded,
}

/// 签名：来源标识 + 百分比与缩放（各保留 3 位小数）。
pub fn build_signature(source: &ImageSource, position: CropPosition, zoom: ZoomFactor) -> String {
    format!(
        "{}|{:.3}|{:.3}|{:.3}",
        source.identity(),
        position.x_percent,
        position.y_percent,
        zoom.value()
    )
}

/// 单张图片的裁剪会话。
#[derive(Debug, Default)]
pub struct CropSession {
    source: Option<ImageSource>,
    state: CropState,
    drag: DragSession,
    cache: Option<CropCacheEntry>,
    /// 每次更换/清空来源时递增，用于识别过期的光栅化结果。
    generation: u64,
}

impl CropSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> Option<&ImageSource> {
        self.source.as_ref()
    }

    pub fn position(&self) -> CropPosition {
        self.state.position()
    }

    pub fn zoom(&self) -> ZoomFactor {
        self.state.zoom()
    }

    pub fn drag_state(&self) -> DragSession {
        self.drag
    }

    pub fn cache_entry(&self) -> Option<&CropCacheEntry> {
        self.cache.as_ref()
    }

    /// 选中新来源：无条件回到 `Idle`、中心点、无缩放，并清空缓存。
    pub fn select_source(&mut self, source: ImageSource) {
        log::debug!("🖼️ 选中新图片来源：{}", source.hint());
        self.source = Some(source);
        self.reset_interaction();
    }

    /// 清空来源（例如移除预览图）。
    pub fn clear_source(&mut self) {
        self.source = None;
        self.reset_interaction();
    }

    fn reset_interaction(&mut self) {
        self.state.reset();
        self.drag.reset();
        self.cache = None;
        self.generation = self.generation.wrapping_add(1);
    }

    fn invalidate_cache(&mut self) {
        if self.cache.take().is_some() {
            log::debug!("🧹 裁剪状态变化，缓存已失效");
        }
    }

    /// 直接设置裁剪位置（例如从已保存的项目恢复）。
    pub fn set_crop_position(&mut self, x_percent: f64, y_percent: f64) {
        if self.state.set_crop_position(x_percent, y_percent) {
            self.invalidate_cache();
        }
    }

    /// 设置缩放，返回夹紧后的值是否变化。
    pub fn set_zoom(&mut self, candidate: f64) -> bool {
        let changed = self.state.set_zoom(candidate);
        if changed {
            self.invalidate_cache();
        }
        changed
    }

    /// 放大一档；没有来源时忽略。
    pub fn zoom_in(&mut self) -> bool {
        if self.source.is_none() {
            return false;
        }
        let changed = self.state.zoom_in();
        if changed {
            self.invalidate_cache();
        }
        changed
    }

    /// 缩小一档；没有来源时忽略。
    pub fn zoom_out(&mut self) -> bool {
        if self.source.is_none() {
            return false;
        }
        let changed = self.state.zoom_out();
        if changed {
            self.invalidate_cache();
        }
        changed
    }

    /// 提交缩放输入框的文本，返回应回显的文本。
    ///
    /// 没有来源时回显默认缩放；文本无法解析时保持当前缩放。
    pub fn commit_zoom_input(&mut self, raw: &str) -> String {
        if self.source.is_none() {
            return format!("{:.2}", DEFAULT_ZOOM);
        }

        if let Some(value) = parse_zoom_input(raw) {
            self.set_zoom(value);
        }
        self.zoom_display()
    }

    /// 缩放输入框显示文本（两位小数）。
    pub fn zoom_display(&self) -> String {
        format!("{:.2}", self.state.zoom().value())
    }

    pub fn can_zoom_in(&self) -> bool {
        self.source.is_some() && !self.state.at_max_zoom()
    }

    pub fn can_zoom_out(&self) -> bool {
        self.source.is_some() && !self.state.at_min_zoom()
    }

    /// 指针在预览区按下；没有来源时忽略。
    pub fn pointer_down(&mut self, pointer_id: i64, x: f64, y: f64) -> bool {
        if self.source.is_none() {
            return false;
        }
        self.drag.begin(pointer_id, x, y);
        true
    }

    /// 指针移动，返回裁剪位置是否发生变化。
    ///
    /// 视口未测量时只推进拖拽坐标，不修改位置。
    pub fn pointer_move(&mut self, pointer_id: i64, x: f64, y: f64, viewport: Viewport) -> bool {
        if self.source.is_none() {
            return false;
        }

        let Some((delta_x, delta_y)) = self.drag.advance(pointer_id, x, y) else {
            return false;
        };

        let Some(next) =
            apply_drag_delta(self.state.position(), delta_x, delta_y, viewport, self.state.zoom())
        else {
            log::debug!("📐 视口尚未测量，跳过本次拖拽更新");
            return false;
        };

        let changed = self.state.set_crop_position(next.x_percent, next.y_percent);
        if changed {
            self.invalidate_cache();
        }
        changed
    }

    /// 指针抬起。
    pub fn pointer_up(&mut self, pointer_id: i64) -> bool {
        self.drag.end(pointer_id)
    }

    /// 指针取消（例如系统手势打断），行为与抬起一致。
    pub fn pointer_cancel(&mut self, pointer_id: i64) -> bool {
        self.drag.end(pointer_id)
    }

    /// 当前状态的缓存签名；没有来源时为 `None`。
    pub fn signature(&self) -> Option<String> {
        self.source
            .as_ref()
            .map(|source| build_signature(source, self.state.position(), self.state.zoom()))
    }

    /// 生成提交计划：命中缓存时直接返回结果，否则给出光栅化请求快照。
    pub fn plan_submit(&self) -> SubmitPlan {
        let Some(source) = self.source.as_ref() else {
            return SubmitPlan::NoImage;
        };

        let position = self.state.position();
        let zoom = self.state.zoom();
        let signature = build_signature(source, position, zoom);

        if let Some(entry) = self.cache.as_ref() {
            if entry.signature == signature {
                log::debug!("♻️ 命中裁剪缓存");
                return SubmitPlan::Cached(entry.output.clone());
            }
        }

        SubmitPlan::Render(RasterRequest {
            source: source.clone(),
            position,
            zoom,
            signature,
            generation: self.generation,
        })
    }

    /// 请求快照是否仍与当前会话一致。
    pub fn is_current(&self, request: &RasterRequest) -> bool {
        request.generation == self.generation
            && self.signature().as_deref() == Some(request.signature.as_str())
    }

    /// 接收光栅化结果。
    ///
    /// - 快照已过期（来源或裁剪状态已变化）：无论成败都丢弃，不写缓存
    /// - 成功：写入缓存并返回裁剪结果
    /// - 失败：回退为原始来源
    pub fn finish_rasterization(
        &mut self,
        request: RasterRequest,
        result: Result<CroppedImage, CropError>,
    ) -> SubmitOutcome {
        if !self.is_current(&request) {
            log::info!(
                "🗑️ 裁剪结果已过期（来源或裁剪状态已变化），丢弃 - 成功: {}",
                result.is_ok()
            );
            return SubmitOutcome::Discarded;
        }

        match result {
            Ok(output) => {
                self.cache = Some(CropCacheEntry {
                    signature: request.signature,
                    output: output.clone(),
                });
                SubmitOutcome::Cropped(output)
            }
            Err(err) => {
                log::warn!(
                    "⚠️ 裁剪失败，回退为原始图片 - stage={} code={}：{}",
                    err.stage(),
                    err.code(),
                    err
                );
                SubmitOutcome::Original(request.source)
            }
        }
    }

    /// 提交入口：命中缓存直接返回，否则光栅化一次并写入缓存。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use asap_crop::crop::{CropConfig, CropHandler, CropSession, ImageSource, SubmitOutcome};
    ///
    /// # async fn demo() -> Result<(), asap_crop::crop::CropError> {
    /// let handler = CropHandler::new(CropConfig::default())?;
    /// let mut session = CropSession::new();
    /// session.select_source(ImageSource::Url("https://cdn.example.com/p/cover.png".into()));
    /// session.set_zoom(2.0);
    ///
    /// match session.prepare_for_submit(&handler).await {
    ///     SubmitOutcome::Cropped(image) => {
    ///         println!("{} ({} bytes)", image.name, image.bytes.len())
    ///     }
    ///     SubmitOutcome::Original(_) => println!("使用原图"),
    ///     SubmitOutcome::NoImage | SubmitOutcome::Discarded => {}
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn prepare_for_submit(&mut self, handler: &CropHandler) -> SubmitOutcome {
        match self.plan_submit() {
            SubmitPlan::NoImage => SubmitOutcome::NoImage,
            SubmitPlan::Cached(output) => SubmitOutcome::Cropped(output),
            SubmitPlan::Render(request) => {
                let result = handler
                    .rasterize(&request.source, request.position, request.zoom)
                    .await;
                self.finish_rasterization(request, result)
            }
        }
    }
}

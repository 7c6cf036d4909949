//! # 方形裁剪模块（crop）
//!
//! ## 设计思路
//!
//! 项目封面需要是正方形。用户在预览区拖拽、缩放选定区域，提交时再按同一组参数
//! 把原图光栅化成方形文件。模块按职责拆分：
//!
//! - `state`：裁剪位置（百分比）与缩放倍数，所有写入都经过夹紧
//! - `drag`：拖拽状态机与“像素位移 → 百分比位移”映射
//! - `geometry`：由图片尺寸、位置、缩放计算采样区域
//! - `backend` / `pipeline`：解码、绘制、编码能力及其默认实现
//! - `loader`：本地文件 / 远程 URL / data URL 加载与安全校验
//! - `handler`：统一编排一次光栅化
//! - `session`：单张图片的交互状态与单槽缓存
//! - `naming`：输出格式与文件名推导
//! - `config/error/source`：配置、错误、输入输出数据模型
//!
//! ## 实现思路
//!
//! 交互更新都是同步的纯计算；只有提交时的光栅化是异步的。
//! 会话在提交时生成请求快照，结果回来后再校验快照是否过期。
//!
//! ## 调用链
//!
//! ```text
//! 指针/缩放事件
//!    ↓
//! session.rs（状态更新 + 缓存失效）
//!    ↓ 提交
//! session.rs（缓存命中？）
//!    ↓ 未命中
//! handler.rs（统一编排 + 阶段耗时日志）
//!    ├─ loader.rs（来源加载 + URL/体积安全校验）
//!    ├─ geometry.rs（采样区域）
//!    └─ pipeline.rs（解码 + 像素限制 + 绘制 + 编码）
//!    ↓
//! SubmitOutcome（裁剪结果 / 原图回退）
//! ```

mod backend;
mod config;
mod drag;
mod error;
mod geometry;
mod handler;
mod loader;
mod naming;
mod pipeline;
mod session;
mod source;
mod state;

pub use backend::RasterBackend;
pub use config::{CropConfig, DEFAULT_JPEG_QUALITY, ResampleProfile};
pub use drag::{DragSession, Viewport, apply_drag_delta};
pub use error::CropError;
pub use geometry::CropRect;
pub use handler::CropHandler;
pub use naming::{
    CROPPED_NAME_SUFFIX, OutputFormat, build_cropped_file_name, extension_for_mime,
    infer_name_from_url, normalize_mime,
};
pub use pipeline::ImageCrateBackend;
pub use session::{
    CropCacheEntry, CropSession, RasterRequest, SubmitOutcome, SubmitPlan, build_signature,
};
pub use source::{CroppedImage, ImageSource, LocalFile};
pub use state::{
    CropPosition, CropState, DEFAULT_ZOOM, MAX_ZOOM, MIN_ZOOM, ZOOM_STEP, ZoomFactor,
    clamp_percent, clamp_zoom, parse_zoom_input,
};

//! # 拖拽映射模块
//!
//! 把指针在预览区域内的像素位移换算成裁剪中心的百分比调整。
//!
//! # 设计思路
//!
//! - 映射函数纯函数化：输入为位移、视口尺寸、缩放，输出新位置，便于测试。
//! - 拖拽会话显式建模为 `Idle` / `Dragging` 两态，由指针 ID 绑定，
//!   抬起或取消时丢弃，不依赖闭包里的可变状态。
//! - 视口尚未测量（宽或高为 0）时整次更新跳过，避免除零污染状态。

use super::state::{CropPosition, ZoomFactor};

/// 预览视口尺寸（像素），由布局系统提供。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// 宽高均为正的有限值才视为已完成测量。
    pub fn is_measured(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// 将一次拖拽位移应用到裁剪位置。
///
/// 平移语义：图片跟随指针移动，裁剪窗口不动，因此向右拖动会露出左侧内容，
/// 即百分比做减法。缩放越大，同样的位移对应的百分比越小。
///
/// 视口未测量时返回 `None`，调用方应保持原状态不变。
pub fn apply_drag_delta(
    position: CropPosition,
    delta_x: f64,
    delta_y: f64,
    viewport: Viewport,
    zoom: ZoomFactor,
) -> Option<CropPosition> {
    if !viewport.is_measured() {
        return None;
    }

    let scale = 100.0 / zoom.value();
    let delta_percent_x = (delta_x / viewport.width) * scale;
    let delta_percent_y = (delta_y / viewport.height) * scale;

    Some(CropPosition::new(
        position.x_percent - delta_percent_x,
        position.y_percent - delta_percent_y,
    ))
}

/// 单次交互的拖拽会话。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DragSession {
    #[default]
    Idle,
    Dragging {
        pointer_id: i64,
        last_x: f64,
        last_y: f64,
    },
}

impl DragSession {
    pub fn is_dragging(&self) -> bool {
        matches!(self, Self::Dragging { .. })
    }

    /// 指针按下：进入拖拽态并记录起点。已有拖拽时以新指针覆盖。
    pub fn begin(&mut self, pointer_id: i64, x: f64, y: f64) {
        *self = Self::Dragging {
            pointer_id,
            last_x: x,
            last_y: y,
        };
    }

    /// 指针移动：返回自上次采样以来的位移。
    ///
    /// 非当前指针、或位移为零时返回 `None`；位移为零时不更新上次坐标。
    pub fn advance(&mut self, pointer_id: i64, x: f64, y: f64) -> Option<(f64, f64)> {
        let Self::Dragging {
            pointer_id: active,
            last_x,
            last_y,
        } = self
        else {
            return None;
        };

        if *active != pointer_id {
            return None;
        }

        let delta_x = x - *last_x;
        let delta_y = y - *last_y;
        if delta_x == 0.0 && delta_y == 0.0 {
            return None;
        }

        *last_x = x;
        *last_y = y;
        Some((delta_x, delta_y))
    }

    /// 指针抬起或取消：仅当 ID 匹配时回到 `Idle`，返回是否结束了拖拽。
    pub fn end(&mut self, pointer_id: i64) -> bool {
        match self {
            Self::Dragging { pointer_id: active, .. } if *active == pointer_id => {
                *self = Self::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::Idle;
    }
}

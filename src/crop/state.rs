//! # 裁剪状态模型
//!
//! ## 设计思路
//!
//! 状态只有两部分：归一化裁剪中心（百分比）与缩放倍数。
//! 所有输入都“清洗”而不是“拒绝”：越界值被夹紧，NaN 回到中心点，
//! 因此这里没有任何错误分支。
//!
//! ## 实现思路
//!
//! - `CropPosition` / `ZoomFactor` 构造即夹紧，持有值天然满足不变量。
//! - `CropState` 的更新方法返回“是否真的变化”，会话层据此决定是否让缓存失效。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 10.0;
pub const DEFAULT_ZOOM: f64 = 1.0;
/// 放大/缩小按钮每次调整的步长。
pub const ZOOM_STEP: f64 = 0.15;
/// 判断“已到边界”时使用的容差，避免浮点累加误差导致按钮状态抖动。
const ZOOM_BOUND_EPSILON: f64 = 0.001;
const CENTER_PERCENT: f64 = 50.0;

/// 与 `parseFloat` 一致：只取开头的数字部分。
static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").expect("zoom input pattern is valid")
});

/// 夹紧百分比到 `[0, 100]`，NaN 视为中心点 50。
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return CENTER_PERCENT;
    }
    value.clamp(0.0, 100.0)
}

/// 夹紧缩放到 `[MIN_ZOOM, MAX_ZOOM]`，非有限值回到默认缩放。
pub fn clamp_zoom(value: f64) -> f64 {
    if !value.is_finite() {
        return DEFAULT_ZOOM;
    }
    value.clamp(MIN_ZOOM, MAX_ZOOM)
}

/// 解析用户输入的缩放文本，无法解析时返回 `None`。
pub fn parse_zoom_input(raw: &str) -> Option<f64> {
    let matched = LEADING_NUMBER.find(raw.trim_start())?;
    matched.as_str().parse::<f64>().ok()
}

/// 裁剪中心位置（百分比）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "PartialCropPosition")]
pub struct CropPosition {
    pub x_percent: f64,
    pub y_percent: f64,
}

/// 反序列化入口：字段缺失视为未定义，统一落到中心点。
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartialCropPosition {
    x_percent: Option<f64>,
    y_percent: Option<f64>,
}

impl From<PartialCropPosition> for CropPosition {
    fn from(raw: PartialCropPosition) -> Self {
        Self::new(
            raw.x_percent.unwrap_or(f64::NAN),
            raw.y_percent.unwrap_or(f64::NAN),
        )
    }
}

impl CropPosition {
    pub const CENTER: Self = Self {
        x_percent: CENTER_PERCENT,
        y_percent: CENTER_PERCENT,
    };

    pub fn new(x_percent: f64, y_percent: f64) -> Self {
        Self {
            x_percent: clamp_percent(x_percent),
            y_percent: clamp_percent(y_percent),
        }
    }
}

impl Default for CropPosition {
    fn default() -> Self {
        Self::CENTER
    }
}

/// 缩放倍数，恒在 `[1.0, 10.0]`。
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ZoomFactor(f64);

impl ZoomFactor {
    pub fn new(value: f64) -> Self {
        Self(clamp_zoom(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for ZoomFactor {
    fn default() -> Self {
        Self(DEFAULT_ZOOM)
    }
}

/// 当前裁剪视图：中心位置 + 缩放。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CropState {
    position: CropPosition,
    zoom: ZoomFactor,
}

impl CropState {
    pub fn position(&self) -> CropPosition {
        self.position
    }

    pub fn zoom(&self) -> ZoomFactor {
        self.zoom
    }

    /// 整体替换位置（先夹紧），返回值表示是否发生变化。
    pub fn set_crop_position(&mut self, x_percent: f64, y_percent: f64) -> bool {
        let next = CropPosition::new(x_percent, y_percent);
        let changed = next != self.position;
        self.position = next;
        changed
    }

    /// 设置缩放（先夹紧），返回值表示夹紧后的值是否与之前不同。
    pub fn set_zoom(&mut self, candidate: f64) -> bool {
        let next = ZoomFactor::new(candidate);
        let changed = next != self.zoom;
        self.zoom = next;
        changed
    }

    pub fn zoom_in(&mut self) -> bool {
        self.set_zoom(self.zoom.value() + ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.set_zoom(self.zoom.value() - ZOOM_STEP)
    }

    pub fn at_max_zoom(&self) -> bool {
        self.zoom.value() >= MAX_ZOOM - ZOOM_BOUND_EPSILON
    }

    pub fn at_min_zoom(&self) -> bool {
        self.zoom.value() <= MIN_ZOOM + ZOOM_BOUND_EPSILON
    }

    /// 回到新图片的初始状态：中心点、无缩放。
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_percent_handles_nan_and_bounds() {
        assert_eq!(clamp_percent(f64::NAN), 50.0);
        assert_eq!(clamp_percent(-12.0), 0.0);
        assert_eq!(clamp_percent(140.0), 100.0);
        assert_eq!(clamp_percent(f64::INFINITY), 100.0);
        assert_eq!(clamp_percent(33.3), 33.3);
    }

    #[test]
    fn clamp_zoom_handles_non_finite() {
        assert_eq!(clamp_zoom(f64::NAN), 1.0);
        assert_eq!(clamp_zoom(f64::INFINITY), 1.0);
        assert_eq!(clamp_zoom(0.2), 1.0);
        assert_eq!(clamp_zoom(25.0), 10.0);
        assert_eq!(clamp_zoom(2.5), 2.5);
    }

    #[test]
    fn set_zoom_reports_change_only_after_clamping() {
        let mut state = CropState::default();
        assert!(!state.set_zoom(0.5), "clamps to 1.0 which equals the current zoom");
        assert!(state.set_zoom(3.0));
        assert!(!state.set_zoom(3.0));
        assert!(state.set_zoom(50.0));
        assert!(!state.set_zoom(11.0));
        assert_eq!(state.zoom().value(), MAX_ZOOM);
    }

    #[test]
    fn zoom_steps_stop_at_bounds() {
        let mut state = CropState::default();
        assert!(state.at_min_zoom());
        assert!(!state.zoom_out());

        for _ in 0..100 {
            state.zoom_in();
        }
        assert!(state.at_max_zoom());
        assert_eq!(state.zoom().value(), MAX_ZOOM);

        assert!(state.zoom_out());
        assert!((state.zoom().value() - (MAX_ZOOM - ZOOM_STEP)).abs() < 1e-9);
    }

    #[test]
    fn parse_zoom_input_takes_leading_number() {
        assert_eq!(parse_zoom_input("2.5"), Some(2.5));
        assert_eq!(parse_zoom_input("  3x"), Some(3.0));
        assert_eq!(parse_zoom_input(".5"), Some(0.5));
        assert_eq!(parse_zoom_input("abc"), None);
        assert_eq!(parse_zoom_input(""), None);
    }

    #[test]
    fn crop_position_deserializes_with_sanitizing() {
        let position: CropPosition =
            serde_json::from_str(r#"{"xPercent": 140, "yPercent": -3}"#).expect("parse position");
        assert_eq!(position, CropPosition::new(100.0, 0.0));

        let missing: CropPosition = serde_json::from_str("{}").expect("parse empty position");
        assert_eq!(missing, CropPosition::CENTER);

        let json = serde_json::to_string(&CropPosition::new(10.0, 20.0)).expect("serialize");
        assert_eq!(json, r#"{"xPercent":10.0,"yPercent":20.0}"#);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut state = CropState::default();
        state.set_crop_position(10.0, 90.0);
        state.set_zoom(4.0);
        state.reset();
        assert_eq!(state.position(), CropPosition::CENTER);
        assert_eq!(state.zoom().value(), DEFAULT_ZOOM);
    }
}

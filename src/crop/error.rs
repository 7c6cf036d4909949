//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载裁剪链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 所有错误都是“可恢复”的：会话层捕获后回退为提交原始图片，不会阻塞保存流程。

/// 裁剪链路统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("获取图片失败：{0}")]
    Fetch(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("绘制/编码错误：{0}")]
    Rasterization(String),
}

impl CropError {
    /// 稳定错误码，供调用方做分支展示或上报。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "E_FETCH",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::FileSystem(_) => "E_FILE_SYSTEM",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::Decode(_) => "E_DECODE",
            Self::Rasterization(_) => "E_RASTERIZE",
        }
    }

    /// 出错所在阶段：`fetch` / `decode` / `rasterize`。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Fetch(_) | Self::Timeout(_) | Self::InvalidFormat(_) | Self::FileSystem(_) => {
                "fetch"
            }
            Self::ResourceLimit(_) | Self::Decode(_) => "decode",
            Self::Rasterization(_) => "rasterize",
        }
    }
}

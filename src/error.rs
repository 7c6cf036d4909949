//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义应用级统一的 `AppError` 枚举，裁剪引擎之外的设置、存储与 CLI
//! 均返回 `Result<T, AppError>`，调用方通过 `Serialize` 获得可读的错误信息。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `CropError` 与 `std::io::Error` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，便于 `--json` 输出。

use serde::Serialize;

use crate::crop::CropError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 裁剪流水线错误（加载 / 解码 / 光栅化）
    #[error("{0}")]
    Crop(#[from] CropError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 存储目录不可用或写入失败
    #[error("存储目录不可用: {0}")]
    Storage(String),

    /// 设置文件无效
    #[error("设置无效: {0}")]
    Config(String),
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_errors_keep_their_message() {
        let err: AppError = CropError::Decode("坏图".to_string()).into();
        assert_eq!(err.to_string(), CropError::Decode("坏图".to_string()).to_string());
    }

    #[test]
    fn serializes_as_plain_string() {
        let err = AppError::Storage("磁盘已满".to_string());
        let json = serde_json::to_string(&err).expect("serialize error");
        assert_eq!(json, "\"存储目录不可用: 磁盘已满\"");
    }
}

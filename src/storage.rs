//! 项目图片存储模块
//!
//! # 设计思路
//!
//! 提交后的项目图片（方形裁剪结果或回退的原图）按所有者分目录落盘，
//! 布局为 `{base}/projects/{owner}/{id}.{ext}`，目录不存在时自动创建。
//!
//! # 实现思路
//!
//! - `id` 使用本地时间戳（精确到纳秒），扩展名取原文件名最后一段，没有时为 `dat`。
//! - 写入使用 `create_new`，不覆盖已有文件；同名冲突时追加序号。
//! - 所有可能失败的操作均返回 `Result`，不使用 `expect()` / `unwrap()`。

use chrono::Local;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::AppError;

const FALLBACK_EXTENSION: &str = "dat";
const MAX_NAME_ATTEMPTS: u32 = 16;

/// 存储目录信息
#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub path: String,
    pub total_size: u64,
    pub file_count: u64,
}

/// 取文件名最后一个 `.` 之后的部分作为扩展名。
///
/// ```rust
/// use asap_crop::storage::extract_file_extension;
///
/// assert_eq!(extract_file_extension("cover-square.jpg"), "jpg");
/// assert_eq!(extract_file_extension("README"), "dat");
/// ```
pub fn extract_file_extension(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext,
        _ => FALLBACK_EXTENSION,
    }
}

fn validate_owner(owner: &str) -> Result<(), AppError> {
    let trimmed = owner.trim();
    if trimmed.is_empty() {
        return Err(AppError::Storage("所有者标识不能为空".to_string()));
    }
    if trimmed == "." || trimmed == ".." || trimmed.contains(['/', '\\']) {
        return Err(AppError::Storage(format!("所有者标识非法: {}", owner)));
    }
    Ok(())
}

/// 获取所有者的项目图片目录（`{base}/projects/{owner}`），不存在时自动创建。
pub fn get_images_dir(base: &Path, owner: &str) -> Result<PathBuf, AppError> {
    validate_owner(owner)?;

    let dir = base.join("projects").join(owner.trim());
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::Storage(format!("创建图片目录 '{}' 失败: {}", dir.display(), e))
        })?;
    }
    Ok(dir)
}

/// 写入新建文件；失败时删除已创建的文件，不留下截断的内容。
fn write_or_remove(path: &Path, mut writer: impl Write, bytes: &[u8]) -> Result<(), AppError> {
    let result = writer.write_all(bytes).and_then(|_| writer.flush());
    drop(writer);
    if let Err(err) = result {
        if let Err(remove_err) = fs::remove_file(path) {
            log::warn!("⚠️ 清理未写完的文件失败: {} - {}", path.display(), remove_err);
        }
        return Err(AppError::Io(err));
    }
    Ok(())
}

/// 保存一张项目图片，返回写入的完整路径。
pub fn store_project_image(
    base: &Path,
    owner: &str,
    file_name: &str,
    bytes: &[u8],
) -> Result<PathBuf, AppError> {
    let dir = get_images_dir(base, owner)?;
    let extension = extract_file_extension(file_name);
    let id = Local::now().format("%Y%m%d%H%M%S%f").to_string();

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let stored_name = if attempt == 0 {
            format!("{}.{}", id, extension)
        } else {
            format!("{}-{}.{}", id, attempt, extension)
        };
        let path = dir.join(&stored_name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                write_or_remove(&path, file, bytes)?;
                log::info!(
                    "💾 项目图片已保存 - 原名: {} 路径: {} 大小: {} bytes",
                    file_name,
                    path.display(),
                    bytes.len()
                );
                return Ok(path);
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(AppError::Io(err)),
        }
    }

    Err(AppError::Storage(format!("无法为 '{}' 生成唯一文件名", file_name)))
}

/// 获取图片存储目录信息（路径 + 占用大小 + 文件数）
pub fn get_images_dir_info(base: &Path, owner: &str) -> Result<StorageInfo, AppError> {
    let dir = get_images_dir(base, owner)?;
    let mut total_size: u64 = 0;
    let mut file_count: u64 = 0;

    if let Ok(entries) = fs::read_dir(&dir) {
        for entry in entries.flatten() {
            if let Ok(metadata) = entry.metadata() {
                if metadata.is_file() {
                    total_size += metadata.len();
                    file_count += 1;
                }
            }
        }
    }

    Ok(StorageInfo {
        path: dir.to_string_lossy().to_string(),
        total_size,
        file_count,
    })
}

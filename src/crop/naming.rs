//! # 输出格式与文件命名
//!
//! ## 设计思路
//!
//! 输出格式只在“安全集合”（PNG / JPEG / WEBP）内保留源格式，其余一律落到 PNG。
//! 文件名去掉最后一个扩展名，追加 `-square` 后缀（已存在则不重复），
//! 再接上与输出格式一致的扩展名。

use image::ImageFormat;
use once_cell::sync::Lazy;
use regex::Regex;

/// 裁剪输出文件名后缀。
pub const CROPPED_NAME_SUFFIX: &str = "-square";
/// 无法从 URL 推断名称时使用的基础名。
const FALLBACK_BASE_NAME: &str = "project-image";

static TRAILING_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.[^/.]+$").expect("extension pattern is valid"));

/// 输出编码格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    WebP,
}

impl OutputFormat {
    /// 根据源 MIME 选择输出格式；`image/jpg` 视为 `image/jpeg`，未知类型回退 PNG。
    pub fn from_source_mime(mime_type: Option<&str>) -> Self {
        let Some(raw) = mime_type else {
            return Self::Png;
        };

        match normalize_mime(raw).as_str() {
            "image/jpeg" => Self::Jpeg,
            "image/webp" => Self::WebP,
            _ => Self::Png,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    pub(crate) fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::WebP => ImageFormat::WebP,
        }
    }
}

/// 小写化并去掉参数部分（`; charset=...`），`image/jpg` 归一为 `image/jpeg`。
pub fn normalize_mime(raw: &str) -> String {
    let base = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if base == "image/jpg" {
        return "image/jpeg".to_string();
    }
    base
}

/// MIME 对应的扩展名，未知类型按 PNG 处理。
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match normalize_mime(mime_type).as_str() {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// 构造裁剪后的文件名。
///
/// ```rust
/// use asap_crop::crop::{build_cropped_file_name, OutputFormat};
///
/// assert_eq!(build_cropped_file_name("cover.jpeg", OutputFormat::Jpeg), "cover-square.jpg");
/// assert_eq!(build_cropped_file_name("cover-square.png", OutputFormat::Png), "cover-square.png");
/// ```
pub fn build_cropped_file_name(original_name: &str, format: OutputFormat) -> String {
    let base = TRAILING_EXTENSION.replace(original_name, "");
    let suffix = if base.ends_with(CROPPED_NAME_SUFFIX) {
        ""
    } else {
        CROPPED_NAME_SUFFIX
    };
    format!("{}{}.{}", base, suffix, format.extension())
}

/// 从 URL 推断原始文件名（含扩展名），用于远程来源。
///
/// 取去掉查询串后的最后一段路径；没有扩展名时按源 MIME 补齐；
/// 空段或 data URL 使用 `project-image`。
pub fn infer_name_from_url(url: &str, source_mime: &str) -> String {
    let extension = extension_for_mime(source_mime);

    if url.trim_start().starts_with("data:") {
        return format!("{}.{}", FALLBACK_BASE_NAME, extension);
    }

    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let last_segment = without_query
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(FALLBACK_BASE_NAME);

    if last_segment.contains('.') {
        last_segment.to_string()
    } else {
        format!("{}.{}", last_segment, extension)
    }
}

//! # ASAP 项目封面裁剪引擎：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              调用方（项目表单 / asap-crop CLI）            │
//! │                                                          │
//! │  选图 ── 拖拽 ── 缩放 ── 提交                              │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ CropSession (&mut self) / SubmitOutcome
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            引擎 (Rust)                            │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  ├─ crop ─────── 裁剪状态 + 单槽缓存 + 光栅化              │
//! │  │   ├─ session   交互状态机 / 过期结果丢弃               │
//! │  │   ├─ handler   加载·解码·绘制·编码编排                 │
//! │  │   └─ loader    文件 / URL / data URL 加载与安全校验     │
//! │  │                                                       │
//! │  ├─ settings          JSON 设置文件 ↔ CropConfig          │
//! │  └─ storage           项目图片落盘 (返回 Result)          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，CLI 与存储层的返回类型 |
//! | [`crop`] | 裁剪位置/缩放模型、拖拽映射、方形光栅化与缓存 |
//! | [`settings`] | 可调参数的读取、校验与保存 |
//! | [`storage`] | 项目图片存储目录的获取、写入与统计 |

pub mod error;
pub mod crop;
pub mod settings;
pub mod storage;

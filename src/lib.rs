//! # 衣橱虚拟试穿 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  宿主 UI（上传 / 选择单品 / 下载）         │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ Result<T, AppError> + TryOnEvent
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            后端 (Rust)                           │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  ├─ catalog ──── CatalogSource 注入的服装目录             │
//! │  │                                                       │
//! │  └─ tryon ────── 试穿服务 + 绘制表面状态机                │
//! │      ├─ loader / pipeline   图片加载·解码                 │
//! │      ├─ compositor          叠加矩形·alpha 混合           │
//! │      └─ export              PNG/JPEG 导出                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，服务层接口的返回类型 |
//! | [`catalog`] | 目录单品、分类、`CatalogSource` 注入接口与内存目录 |
//! | [`tryon`] | 底图加载、服装叠加、重置、导出与 UI 通知 |

pub mod error;
pub mod catalog;
pub mod tryon;

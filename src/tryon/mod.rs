//! # 虚拟试穿模块（tryon）
//!
//! ## 设计思路
//!
//! 把“上传照片 → 叠加服装 → 重置 → 导出”拆成按职责分层的子模块，
//! 状态与画面只由 `TryOnSession` 持有，其余模块均为无状态函数或可注入组件。
//!
//! - `service`：面向 UI 的入口，组合目录、会话与通知
//! - `session`：绘制表面状态机（忙碌标志、过期结果保护、超时）
//! - `compositor`：叠加矩形计算与 alpha 混合
//! - `loader`：Data URI / URL / 本地文件加载与安全校验
//! - `pipeline`：解码、像素限制、叠加图重采样
//! - `export`：画面编码与落盘
//! - `events`：成功/失败通知与忙碌指示
//! - `config/error/source/surface`：配置、错误、中间数据模型、像素缓冲
//!
//! ## 新同事快速上手
//!
//! ```text
//! 宿主 UI
//!    ↓
//! service.rs（目录查找 + 通知 + 选中单品）
//!    ↓
//! session.rs（状态迁移 + 忙碌守卫 + 过期丢弃）
//!    ├─ compositor.rs::prepare_surface（重绘底图）
//!    ├─ loader.rs（加载叠加图，挂起点）
//!    │    └─ pipeline.rs（解码 + 像素限制）
//!    ├─ compositor.rs::apply_overlay（重采样 + 混合）
//!    └─ export.rs（编码 PNG/JPEG）
//!    ↓
//! events.rs（tryon-status / tryon-processing）
//! ```

mod compositor;
mod config;
mod error;
mod events;
mod export;
mod loader;
mod pipeline;
mod service;
mod session;
mod source;
mod surface;

pub use compositor::{OverlayPlacement, apply_overlay, blend_over, prepare_surface};
pub use config::{ExportFormat, OverlayFilter, OverlayLayout, TryOnConfig, TryOnPerformanceProfile};
pub use error::{LoadError, TryOnError};
pub use events::{
    ChannelEmitter, EventEmitter, LogEmitter, NotificationStatus, TRYON_PROCESSING_EVENT,
    TRYON_STATUS_EVENT, TryOnAction, TryOnEvent, TryOnNotification,
};
pub use export::ExportedImage;
pub use loader::{HttpImageLoader, ImageLoader};
pub use service::TryOnService;
pub use session::{ProcessingObserver, TryOnSession};
pub use source::{ImageLocator, SourceImage, UploadedImage};
pub use surface::{DrawingSurface, SurfaceState};

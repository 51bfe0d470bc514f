//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 分两层承载试穿链路中的错误：
//! - `LoadError`：图片加载/解码阶段的底层错误（网络、超时、格式、资源限制）
//! - `TryOnError`：状态机边界的业务错误，由调用方决定提示文案
//!
//! 两者都通过 `thiserror` 保持人类可读，同时暴露稳定的 `code()` / `stage()`
//! 供 UI 层按分支匹配。

use super::surface::SurfaceState;

/// 图片加载统一错误类型。
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("网络错误：{0}")]
    Network(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),
}

impl LoadError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::Decode(_) => "E_DECODE",
            Self::FileSystem(_) => "E_FILE",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// 试穿状态机错误类型。
///
/// 所有错误都在 `TryOnSession` 边界被恢复，画面保持在最后一次有效帧。
#[derive(Debug, Clone, thiserror::Error)]
pub enum TryOnError {
    /// 上传的底图无法识别或解码，状态不发生迁移。
    #[error("上传图片无效：{0}")]
    Decode(#[source] LoadError),

    /// 服装图片加载失败，画面退化为仅显示底图。
    #[error("服装图片加载失败：{0}")]
    Load(#[source] LoadError),

    #[error("导出失败：{0}")]
    Export(String),

    #[error("当前状态 {state} 不允许执行 {operation}")]
    InvalidTransition {
        operation: &'static str,
        state: SurfaceState,
    },

    #[error("正在应用服装，请稍候再试")]
    Busy,

    /// 加载完成时底图已被替换或清空，结果被丢弃。
    #[error("试穿会话已变更，已丢弃过期的加载结果")]
    Stale,

    #[error("内部错误：{0}")]
    Internal(String),
}

impl TryOnError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "E_DECODE",
            Self::Load(inner) if inner.is_timeout() => "E_TIMEOUT",
            Self::Load(_) => "E_LOAD",
            Self::Export(_) => "E_EXPORT",
            Self::InvalidTransition { .. } => "E_INVALID_TRANSITION",
            Self::Busy => "E_BUSY",
            Self::Stale => "E_STALE",
            Self::Internal(_) => "E_INTERNAL",
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Decode(_) => "upload",
            Self::Load(_) => "overlay",
            Self::Export(_) => "export",
            Self::InvalidTransition { .. } | Self::Busy | Self::Stale => "state",
            Self::Internal(_) => "internal",
        }
    }

    pub(crate) fn invalid(operation: &'static str, state: SurfaceState) -> Self {
        Self::InvalidTransition { operation, state }
    }

    pub(crate) fn poisoned() -> Self {
        Self::Internal("试穿会话锁已中毒".to_string())
    }
}

impl From<TryOnError> for String {
    fn from(error: TryOnError) -> Self {
        error.to_string()
    }
}

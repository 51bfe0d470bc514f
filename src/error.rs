//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义面向宿主 UI 的统一 `AppError`，服务层所有接口统一返回 `Result<T, AppError>`，
//! 宿主通过 `Serialize` 获得可直接展示的错误文本。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `TryOnError` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串。

use serde::Serialize;

use crate::tryon::TryOnError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 试穿链路错误（上传 / 叠加 / 重置 / 导出）
    #[error("{0}")]
    TryOn(#[from] TryOnError),

    /// 目录查询或解析失败
    #[error("目录错误: {0}")]
    Catalog(String),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 配置无效
    #[error("配置错误: {0}")]
    Config(String),
}

impl AppError {
    /// 稳定错误码，供宿主按分支匹配。
    pub fn code(&self) -> &'static str {
        match self {
            Self::TryOn(err) => err.code(),
            Self::Catalog(_) => "E_CATALOG",
            Self::Io(_) => "E_IO",
            Self::Config(_) => "E_CONFIG",
        }
    }
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
    fn serializes_as_display_string() {
        let err = AppError::from(TryOnError::Busy);
        assert_eq!(err.code(), "E_BUSY");
        assert_eq!(
            serde_json::to_string(&err).expect("serialize failed"),
            format!("\"{}\"", TryOnError::Busy)
        );
    }
}

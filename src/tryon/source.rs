//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `ImageLocator` 表示图片定位符语义（Data URI / URL / 本地文件）
//! - `UploadedImage` 表示用户选择的本地文件，转换为内嵌 Data URI 后作为底图定位符
//! - `RawImageData` 表示已加载但未解码的字节
//! - `SourceImage` 表示解码完成、不可变的 RGBA 栅格

use base64::{Engine as _, engine::general_purpose};
use image::RgbaImage;

use super::LoadError;

/// 图片定位符。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocator {
    /// 网络地址来源。
    Url(String),
    /// 内嵌数据（Data URI 或纯 Base64 字符串）。
    Embedded(String),
    /// 本地文件路径来源。
    FilePath(String),
}

impl ImageLocator {
    /// 按前缀识别定位符类型。
    pub fn parse(locator: &str) -> Result<Self, LoadError> {
        let trimmed = locator.trim();
        if trimmed.is_empty() {
            return Err(LoadError::InvalidFormat("图片定位符为空".to_string()));
        }

        let lower = trimmed.get(..8).unwrap_or(trimmed).to_ascii_lowercase();
        if lower.starts_with("data:") {
            return Ok(Self::Embedded(trimmed.to_string()));
        }
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(Self::Url(trimmed.to_string()));
        }
        if let Some(path) = trimmed.strip_prefix("file://") {
            return Ok(Self::FilePath(path.to_string()));
        }
        if let Some((scheme, _)) = trimmed.split_once("://") {
            if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
                return Err(LoadError::InvalidFormat(format!("不支持的定位符协议：{}", scheme)));
            }
        }

        Ok(Self::FilePath(trimmed.to_string()))
    }

    pub(crate) fn source_hint(&self) -> &'static str {
        match self {
            Self::Url(_) => "url",
            Self::Embedded(_) => "embedded",
            Self::FilePath(_) => "file",
        }
    }
}

/// 用户上传的本地图片文件。
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// 通过文件签名识别 MIME 类型，非图片直接拒绝。
    pub fn mime_type(&self) -> Result<&'static str, LoadError> {
        if self.bytes.is_empty() {
            return Err(LoadError::InvalidFormat(format!("上传文件为空：{}", self.file_name)));
        }

        let kind = infer::get(&self.bytes)
            .ok_or_else(|| LoadError::InvalidFormat(format!("无法识别文件类型：{}", self.file_name)))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(LoadError::InvalidFormat(format!(
                "上传文件不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(kind.mime_type())
    }

    /// 转换为内嵌 Data URI 定位符。
    pub fn to_data_uri(&self) -> Result<String, LoadError> {
        let mime = self.mime_type()?;
        Ok(format!(
            "data:{};base64,{}",
            mime,
            general_purpose::STANDARD.encode(&self.bytes)
        ))
    }
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    pub(crate) bytes: Vec<u8>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 解码完成的栅格图片。
///
/// 解码后不可变；底图由会话通过 `Arc` 持有，与绘制表面分离保存。
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    pixels: RgbaImage,
}

impl SourceImage {
    pub fn from_rgba(pixels: RgbaImage) -> Result<Self, LoadError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(LoadError::Decode("图片尺寸为空".to_string()));
        }
        Ok(Self { pixels })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

//! # 配置模块
//!
//! ## 设计思路
//!
//! 将试穿链路所有“可调策略”集中到 `TryOnConfig`：加载限制、超时、叠加布局、
//! 重采样滤镜与导出格式。性能档位（quality / balanced / speed）作为高层语义，
//! 映射到底层重采样滤镜。
//!
//! ## 实现思路
//!
//! - `Default` 提供与原始试穿效果一致的参数（宽度 60%、顶部 15%、不透明度 0.85）。
//! - 通过 `serde(default)` 支持从 JSON 设置文件部分覆盖。
//! - `validate` 在构建会话前拒绝明显无效的组合。

use std::fs;
use std::path::Path;
use std::time::Duration;

use image::ImageFormat;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::LoadError;

/// 叠加位置启发式参数。
///
/// 固定比例，不依赖任何服装或人体检测。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayLayout {
    /// 叠加宽度占底图宽度的比例。
    pub width_ratio: f64,
    /// 叠加顶边距占底图高度的比例（上半身区域）。
    pub top_ratio: f64,
    /// 叠加绘制时的全局不透明度。
    pub opacity: f32,
}

impl Default for OverlayLayout {
    fn default() -> Self {
        Self {
            width_ratio: 0.6,
            top_ratio: 0.15,
            opacity: 0.85,
        }
    }
}

/// 叠加图缩放滤镜。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayFilter {
    Nearest,
    Bilinear,
    CatmullRom,
    Lanczos3,
}

impl OverlayFilter {
    pub(crate) fn to_image_filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }

    pub(crate) fn to_fast_filter(self) -> fast_image_resize::FilterType {
        match self {
            Self::Nearest => fast_image_resize::FilterType::Box,
            Self::Bilinear => fast_image_resize::FilterType::Bilinear,
            Self::CatmullRom => fast_image_resize::FilterType::CatmullRom,
            Self::Lanczos3 => fast_image_resize::FilterType::Lanczos3,
        }
    }
}

/// 导出编码格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    Jpeg,
}

impl ExportFormat {
    pub(crate) fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// 试穿处理配置。
///
/// 字段覆盖了加载、解码、叠加与导出四个阶段。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TryOnConfig {
    /// 读取原始字节时允许的最大体积（字节）。
    pub max_file_size: u64,
    /// 单次图片加载（含解码）的总超时时间（毫秒），避免忙碌状态无限期占用。
    pub load_timeout_ms: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 下载首包超时时间（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 下载分块读取超时时间（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 是否允许访问内网或本地地址（默认关闭）。
    pub allow_private_network: bool,
    /// 是否解析主机名并校验解析结果（默认开启）。
    ///
    /// 开启后可防止“公网域名 -> 内网IP”绕过策略。
    pub resolve_dns_for_url_safety: bool,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    pub layout: OverlayLayout,
    pub resize_filter: OverlayFilter,
    pub export_format: ExportFormat,
    /// 导出文件名。
    pub export_file_name: String,
}

impl Default for TryOnConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            load_timeout_ms: 30_000,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            max_redirects: 5,
            allow_private_network: false,
            resolve_dns_for_url_safety: true,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            layout: OverlayLayout::default(),
            resize_filter: OverlayFilter::Bilinear,
            export_format: ExportFormat::Png,
            export_file_name: "virtual-tryon.png".to_string(),
        }
    }
}

/// 试穿性能档位（面向产品/用户语义）。
///
/// - `Quality`：尽量保真
/// - `Balanced`：质量与性能平衡
/// - `Speed`：优先合成速度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryOnPerformanceProfile {
    Quality,
    Balanced,
    Speed,
}

impl TryOnPerformanceProfile {
    /// 从外部字符串解析档位。
    pub fn parse(profile: &str) -> Result<Self, LoadError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(LoadError::InvalidFormat(format!(
                "未知性能档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }
}

impl TryOnConfig {
    /// 从 JSON 文本解析配置，缺省字段使用默认值。
    pub fn from_json_str(json: &str) -> Result<Self, LoadError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LoadError::InvalidFormat(format!("解析试穿配置失败：{}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从设置文件读取配置。
    ///
    /// 文件不存在时回退到默认配置；文件存在但内容无效时返回错误。
    pub fn load_from_path(path: &Path) -> Result<Self, LoadError> {
        if !path.exists() {
            log::debug!("⚙️ 试穿配置文件不存在，使用默认配置 - 路径: {}", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| LoadError::FileSystem(format!("读取试穿配置失败：{}", e)))?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        let layout = &self.layout;
        if !(layout.width_ratio > 0.0 && layout.width_ratio <= 1.0) {
            return Err(LoadError::InvalidFormat("layout.width_ratio 必须在 (0, 1] 之间".to_string()));
        }
        if !(0.0..1.0).contains(&layout.top_ratio) {
            return Err(LoadError::InvalidFormat("layout.top_ratio 必须在 [0, 1) 之间".to_string()));
        }
        if !(0.0..=1.0).contains(&layout.opacity) {
            return Err(LoadError::InvalidFormat("layout.opacity 必须在 [0, 1] 之间".to_string()));
        }
        if !(100..=600_000).contains(&self.load_timeout_ms) {
            return Err(LoadError::InvalidFormat("load_timeout_ms 必须在 100~600000 毫秒之间".to_string()));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(LoadError::InvalidFormat("connect_timeout 必须在 1~120 秒之间".to_string()));
        }
        if self.export_file_name.trim().is_empty() {
            return Err(LoadError::InvalidFormat("export_file_name 不能为空".to_string()));
        }
        Ok(())
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// 应用指定性能档位到重采样滤镜。
    pub fn apply_performance_profile(&mut self, profile: TryOnPerformanceProfile) {
        self.resize_filter = match profile {
            TryOnPerformanceProfile::Quality => OverlayFilter::Lanczos3,
            TryOnPerformanceProfile::Balanced => OverlayFilter::Bilinear,
            TryOnPerformanceProfile::Speed => OverlayFilter::Nearest,
        };
    }

    /// 基于当前滤镜反推性能档位。
    pub fn infer_performance_profile(&self) -> TryOnPerformanceProfile {
        match self.resize_filter {
            OverlayFilter::Lanczos3 | OverlayFilter::CatmullRom => TryOnPerformanceProfile::Quality,
            OverlayFilter::Bilinear => TryOnPerformanceProfile::Balanced,
            OverlayFilter::Nearest => TryOnPerformanceProfile::Speed,
        }
    }
}

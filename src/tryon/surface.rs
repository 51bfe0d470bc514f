//! # 绘制表面模块
//!
//! `DrawingSurface` 持有唯一的输出像素缓冲，只保存当前渲染帧，不保留历史。
//! 表面尺寸始终与最近一次加载的底图一致。

use std::fmt;

use image::RgbaImage;
use serde::Serialize;

use super::source::SourceImage;

/// 表面生命周期状态。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceState {
    #[default]
    Empty,
    BaseLoaded,
    Composited,
}

impl SurfaceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::BaseLoaded => "base_loaded",
            Self::Composited => "composited",
        }
    }

    /// 是否存在可导出的像素内容。
    pub fn has_content(self) -> bool {
        !matches!(self, Self::Empty)
    }
}

impl fmt::Display for SurfaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub struct DrawingSurface {
    pixels: Option<RgbaImage>,
}

impl DrawingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_none()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.pixels.as_ref().map(|p| p.dimensions())
    }

    pub fn pixels(&self) -> Option<&RgbaImage> {
        self.pixels.as_ref()
    }

    pub(crate) fn pixels_mut(&mut self) -> Option<&mut RgbaImage> {
        self.pixels.as_mut()
    }

    /// 调整为底图尺寸并完整不透明地重绘底图，覆盖之前的任何合成结果。
    pub fn draw_base(&mut self, base: &SourceImage) {
        match self.pixels.as_mut() {
            Some(pixels) if pixels.dimensions() == base.dimensions() => {
                pixels.copy_from_slice(base.pixels().as_raw());
            }
            _ => self.pixels = Some(base.pixels().clone()),
        }
    }

    pub fn clear(&mut self) {
        self.pixels = None;
    }
}

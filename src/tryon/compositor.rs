//! # 叠加合成模块
//!
//! ## 设计思路
//!
//! 合成分两步，中间是叠加图的异步加载（挂起点，由 `session` 编排）：
//! 1. `prepare_surface`：表面调整为底图尺寸并不透明重绘底图，清除之前的叠加
//! 2. `apply_overlay`：计算叠加矩形，与表面求交后只重采样可见部分，按全局不透明度混合
//!
//! 叠加矩形可以远大于底图（极窄极高的服装图），表面之外的部分不分配任何像素。
//!
//! 叠加位置是固定启发式（宽度 60%、水平居中、顶部 15%），不做任何服装或人体检测。
//! 不透明度只作为参数传入混合函数，不会残留到后续绘制。

use image::{Rgba, RgbaImage};
use serde::Serialize;

use super::TryOnConfig;
use super::config::OverlayLayout;
use super::pipeline::{SourceRegion, resample_region};
use super::source::SourceImage;
use super::surface::DrawingSurface;

/// 叠加矩形（底图坐标系，单位像素，允许小数）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverlayPlacement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl OverlayPlacement {
    /// 按布局比例计算叠加矩形，高度保持叠加图原始宽高比。
    ///
    /// 任一尺寸为 0 时返回 `None`。
    pub fn compute(
        base_width: u32,
        base_height: u32,
        overlay_width: u32,
        overlay_height: u32,
        layout: &OverlayLayout,
    ) -> Option<Self> {
        if base_width == 0 || base_height == 0 || overlay_width == 0 || overlay_height == 0 {
            return None;
        }

        let base_width = base_width as f64;
        let width = base_width * layout.width_ratio;
        let height = width * (overlay_height as f64 / overlay_width as f64);

        Some(Self {
            x: (base_width - width) / 2.0,
            y: base_height as f64 * layout.top_ratio,
            width,
            height,
        })
    }

    /// 取整后的像素矩形 `(x, y, width, height)`，宽高至少为 1。
    pub fn pixel_rect(&self) -> (i64, i64, u64, u64) {
        (
            self.x.round() as i64,
            self.y.round() as i64,
            (self.width.round() as u64).max(1),
            (self.height.round() as u64).max(1),
        )
    }

    /// 像素矩形与 `surface_width x surface_height` 表面的交集，
    /// 以及它在 `overlay_width x overlay_height` 叠加图上对应的源窗口。
    ///
    /// 完全落在表面之外时返回 `None`。
    fn visible_window(
        &self,
        surface_width: u32,
        surface_height: u32,
        overlay_width: u32,
        overlay_height: u32,
    ) -> Option<VisibleWindow> {
        let (x, y, width, height) = self.pixel_rect();
        let (x, y, width, height) = (x as f64, y as f64, width as f64, height as f64);

        let left = x.max(0.0);
        let top = y.max(0.0);
        let right = (x + width).min(surface_width as f64);
        let bottom = (y + height).min(surface_height as f64);
        if right <= left || bottom <= top {
            return None;
        }

        let scale_x = overlay_width as f64 / width;
        let scale_y = overlay_height as f64 / height;

        Some(VisibleWindow {
            x: left as u32,
            y: top as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
            source: SourceRegion {
                left: (left - x) * scale_x,
                top: (top - y) * scale_y,
                width: (right - left) * scale_x,
                height: (bottom - top) * scale_y,
            },
        })
    }
}

/// 叠加矩形在表面内的可见部分（表面坐标）及其源窗口。
#[derive(Debug, Clone, Copy, PartialEq)]
struct VisibleWindow {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    source: SourceRegion,
}

/// 合成第一步：重绘底图，保证任意时刻最多只有一层叠加可见。
pub fn prepare_surface(surface: &mut DrawingSurface, base: &SourceImage) {
    surface.draw_base(base);
}

/// 合成第二步：将叠加图混合到表面上，返回实际使用的叠加矩形。
///
/// 调用前必须已通过 `prepare_surface` 绘制同一张底图。
pub fn apply_overlay(
    surface: &mut DrawingSurface,
    base: &SourceImage,
    overlay: &SourceImage,
    config: &TryOnConfig,
) -> Option<OverlayPlacement> {
    let placement = OverlayPlacement::compute(
        base.width(),
        base.height(),
        overlay.width(),
        overlay.height(),
        &config.layout,
    )?;

    let pixels = surface.pixels_mut()?;
    let Some(window) =
        placement.visible_window(pixels.width(), pixels.height(), overlay.width(), overlay.height())
    else {
        log::debug!("🎨 叠加矩形完全位于画面之外，跳过绘制");
        return Some(placement);
    };

    let resized = resample_region(
        overlay.pixels(),
        window.source,
        window.width,
        window.height,
        config.resize_filter,
    );
    blend_over(pixels, &resized, window.x as i64, window.y as i64, config.layout.opacity);

    log::debug!(
        "🎨 叠加完成 - 底图: {}x{} 叠加矩形: {:?} 可见区域: ({}, {}, {}x{}) opacity={}",
        base.width(),
        base.height(),
        placement.pixel_rect(),
        window.x,
        window.y,
        window.width,
        window.height,
        config.layout.opacity
    );

    Some(placement)
}

/// 以 source-over 方式将 `src` 混合到 `dst` 的 `(x, y)` 位置，超出部分裁剪。
pub fn blend_over(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64, opacity: f32) {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity == 0.0 {
        return;
    }

    let (dst_width, dst_height) = (dst.width() as i64, dst.height() as i64);
    let (src_width, src_height) = (src.width() as i64, src.height() as i64);

    let start_x = x.max(0);
    let start_y = y.max(0);
    let end_x = (x + src_width).min(dst_width);
    let end_y = (y + src_height).min(dst_height);

    for dy in start_y..end_y {
        for dx in start_x..end_x {
            let src_px = src.get_pixel((dx - x) as u32, (dy - y) as u32);
            let dst_px = dst.get_pixel_mut(dx as u32, dy as u32);
            *dst_px = blend_pixel(*dst_px, *src_px, opacity);
        }
    }
}

fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let src_alpha = src[3] as f32 / 255.0 * opacity;
    if src_alpha <= 0.0 {
        return dst;
    }

    let dst_alpha = dst[3] as f32 / 255.0;
    let out_alpha = src_alpha + dst_alpha * (1.0 - src_alpha);
    if out_alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |i: usize| {
        let value = (src[i] as f32 * src_alpha + dst[i] as f32 * dst_alpha * (1.0 - src_alpha))
            / out_alpha;
        value.round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

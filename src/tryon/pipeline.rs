//! # 解码与重采样流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → RGBA”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 按像素上限与内存上限快速拒绝
//! 3. 完整解码并转换 RGBA，校验字节长度一致性
//! 4. 叠加前只重采样可见窗口（`fast_image_resize` 裁剪框，失败回退 `image`）

use std::io::Cursor;

use fast_image_resize as fr;
use image::{ImageBuffer, ImageReader, Rgba, RgbaImage};

use super::config::OverlayFilter;
use super::source::{RawImageData, SourceImage};
use super::{LoadError, TryOnConfig};

/// 将原始字节解码为不可变的 `SourceImage`。
pub(crate) fn decode_source_image(
    raw: RawImageData,
    config: &TryOnConfig,
) -> Result<SourceImage, LoadError> {
    image::guess_format(&raw.bytes)
        .map_err(|e| LoadError::InvalidFormat(format!("不支持的图片格式：{}", e)))?;

    let (header_width, header_height) = inspect_dimensions_from_memory(&raw.bytes)?;
    validate_pixel_limits(config, header_width, header_height)?;
    validate_decoded_memory_limits(config, header_width, header_height)?;

    let decoded = image::load_from_memory(&raw.bytes)
        .map_err(|e| LoadError::Decode(format!("图片解码失败：{}", e)))?;

    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    validate_pixel_limits(config, width, height)?;

    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| LoadError::ResourceLimit("图片尺寸导致内存溢出风险".to_string()))?;

    if rgba.as_raw().len() != expected_len {
        return Err(LoadError::Decode("解码后像素数据长度异常".to_string()));
    }

    log::info!(
        "✅ 图片解码成功 - 来源: {} 尺寸: {}x{}",
        raw.source_hint,
        width,
        height
    );

    SourceImage::from_rgba(rgba)
}

/// 仅通过内存中的图片头信息读取宽高。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), LoadError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| LoadError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

    reader
        .into_dimensions()
        .map_err(|e| LoadError::Decode(format!("无法读取图片尺寸：{}", e)))
}

fn validate_pixel_limits(config: &TryOnConfig, width: u32, height: u32) -> Result<(), LoadError> {
    if width == 0 || height == 0 {
        return Err(LoadError::Decode(format!("图片尺寸无效：{}x{}", width, height)));
    }

    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| LoadError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(LoadError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    Ok(())
}

fn validate_decoded_memory_limits(
    config: &TryOnConfig,
    width: u32,
    height: u32,
) -> Result<(), LoadError> {
    let estimated = (width as u64)
        .checked_mul(height as u64)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| LoadError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

    if estimated > config.max_decoded_bytes {
        return Err(LoadError::ResourceLimit(format!(
            "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
            estimated as f64 / 1024.0 / 1024.0,
            config.max_decoded_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}

/// 源图上的裁剪窗口（像素，允许小数）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SourceRegion {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl SourceRegion {
    pub(crate) fn full(image: &RgbaImage) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width: image.width() as f64,
            height: image.height() as f64,
        }
    }

    /// 收缩到图像边界内。
    fn clamp_to(self, image: &RgbaImage) -> Self {
        let (max_w, max_h) = (image.width() as f64, image.height() as f64);
        let left = self.left.clamp(0.0, max_w);
        let top = self.top.clamp(0.0, max_h);
        Self {
            left,
            top,
            width: self.width.clamp(0.0, max_w - left),
            height: self.height.clamp(0.0, max_h - top),
        }
    }

    /// 四条边都落在整数像素上时返回 `(x, y, width, height)`。
    fn pixel_aligned(&self) -> Option<(u32, u32, u32, u32)> {
        let edges = [self.left, self.top, self.width, self.height];
        if edges.iter().all(|v| v.fract() == 0.0) {
            Some((self.left as u32, self.top as u32, self.width as u32, self.height as u32))
        } else {
            None
        }
    }

    /// 覆盖该窗口的最小整数像素矩形，宽高至少为 1。
    fn pixel_bounds(&self, image: &RgbaImage) -> (u32, u32, u32, u32) {
        let x0 = (self.left.floor() as u32).min(image.width().saturating_sub(1));
        let y0 = (self.top.floor() as u32).min(image.height().saturating_sub(1));
        let x1 = ((self.left + self.width).ceil() as u32).clamp(x0 + 1, image.width());
        let y1 = ((self.top + self.height).ceil() as u32).clamp(y0 + 1, image.height());
        (x0, y0, x1 - x0, y1 - y0)
    }
}

/// 将叠加图的 `region` 窗口重采样到目标尺寸，输出大小只取决于目标尺寸。
///
/// 窗口与目标尺寸一致且像素对齐时直接拷贝；
/// `fast_image_resize` 失败时回退 `image::imageops::resize`。
pub(crate) fn resample_region(
    overlay: &RgbaImage,
    region: SourceRegion,
    target_width: u32,
    target_height: u32,
    filter: OverlayFilter,
) -> RgbaImage {
    let region = region.clamp_to(overlay);

    if let Some((x, y, width, height)) = region.pixel_aligned() {
        if (width, height) == (target_width, target_height) {
            return image::imageops::crop_imm(overlay, x, y, width, height).to_image();
        }
    }

    // 不足一个像素的窗口按整像素放大
    if region.width < 1.0 || region.height < 1.0 {
        return resize_pixel_window(overlay, region, target_width, target_height, filter);
    }

    match resize_with_fast_image_resize(overlay, region, target_width, target_height, filter) {
        Ok(resized) => resized,
        Err(err) => {
            log::warn!("⚠️ fast_image_resize 重采样失败，回退 image::imageops::resize：{}", err);
            resize_pixel_window(overlay, region, target_width, target_height, filter)
        }
    }
}

fn resize_pixel_window(
    overlay: &RgbaImage,
    region: SourceRegion,
    target_width: u32,
    target_height: u32,
    filter: OverlayFilter,
) -> RgbaImage {
    let (x, y, width, height) = region.pixel_bounds(overlay);
    let window = image::imageops::crop_imm(overlay, x, y, width, height).to_image();
    image::imageops::resize(&window, target_width, target_height, filter.to_image_filter())
}

fn resize_with_fast_image_resize(
    src: &RgbaImage,
    region: SourceRegion,
    target_width: u32,
    target_height: u32,
    filter: OverlayFilter,
) -> Result<RgbaImage, LoadError> {
    let (src_width, src_height) = src.dimensions();

    let src_image = fr::images::Image::from_vec_u8(
        src_width,
        src_height,
        src.as_raw().clone(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| LoadError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(filter.to_fast_filter()))
        .crop(region.left, region.top, region.width, region.height);

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| LoadError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| LoadError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))
}

//! # 导出模块
//!
//! 将当前画面编码为可下载的图片文件（默认 PNG，可配置 JPEG）。
//! 导出是对画面的纯读取，不修改会话状态。

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Instant;

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use image::{DynamicImage, RgbaImage};

use super::config::ExportFormat;
use super::{TryOnConfig, TryOnError};

/// 编码完成的导出文件。
#[derive(Debug, Clone)]
pub struct ExportedImage {
    pub file_name: String,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub bytes: Bytes,
}

impl ExportedImage {
    /// 转换为 Data URL，可直接作为下载链接的 `href`。
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }

    /// 写入目标目录，返回完整文件路径。
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, TryOnError> {
        fs::create_dir_all(dir)
            .map_err(|e| TryOnError::Export(format!("无法创建导出目录 {}：{}", dir.display(), e)))?;

        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes)
            .map_err(|e| TryOnError::Export(format!("写入导出文件失败 {}：{}", path.display(), e)))?;

        log::info!("💾 导出文件已写入：{}", path.display());
        Ok(path)
    }
}

pub(crate) fn encode_frame(frame: &RgbaImage, config: &TryOnConfig) -> Result<ExportedImage, TryOnError> {
    let start = Instant::now();
    let mut cursor = Cursor::new(Vec::new());

    let encoded = match config.export_format {
        ExportFormat::Png => frame.write_to(&mut cursor, config.export_format.image_format()),
        // JPEG 不支持 alpha 通道
        ExportFormat::Jpeg => DynamicImage::ImageRgba8(frame.clone())
            .to_rgb8()
            .write_to(&mut cursor, config.export_format.image_format()),
    };
    encoded.map_err(|e| TryOnError::Export(format!("图片编码失败：{}", e)))?;

    let bytes = Bytes::from(cursor.into_inner());
    log::info!(
        "📦 画面已导出 - 格式: {} 尺寸: {}x{} 大小: {} 字节 耗时: {:?}",
        config.export_format.mime_type(),
        frame.width(),
        frame.height(),
        bytes.len(),
        start.elapsed()
    );

    Ok(ExportedImage {
        file_name: config.export_file_name.clone(),
        mime_type: config.export_format.mime_type(),
        width: frame.width(),
        height: frame.height(),
        bytes,
    })
}

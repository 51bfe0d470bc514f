//! # 服务层（面向 UI 的入口）
//!
//! ## 设计思路
//!
//! `TryOnService` 组合三件可注入的组件：
//! 1. `TryOnSession`：唯一持有画面与状态
//! 2. `CatalogSource`：服装目录（默认三件示例服装）
//! 3. `EventEmitter`：成功/失败提示与忙碌指示
//!
//! ## 实现思路
//!
//! 每个入口先调用会话，再根据结果发出 `tryon-status` 通知，
//! 错误统一转换为 `AppError` 返回给宿主。
//! 叠加期间额外发出 `tryon-processing`，宿主据此禁用单品按钮；
//! 该信号由会话在抢到忙碌标志后回调发出，被拒绝的调用不会产生忙碌信号。

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::events::{EventEmitter, LogEmitter, TryOnAction, TryOnEvent, TryOnNotification};
use super::export::ExportedImage;
use super::loader::{HttpImageLoader, ImageLoader};
use super::source::UploadedImage;
use super::{OverlayPlacement, TryOnConfig, TryOnError, TryOnSession};
use crate::catalog::{CatalogItem, CatalogSource, ClothingCategory, InMemoryCatalog};
use crate::error::AppError;

/// 试穿服务。
pub struct TryOnService<L: ImageLoader = HttpImageLoader> {
    session: TryOnSession<L>,
    catalog: Arc<dyn CatalogSource>,
    emitter: Arc<dyn EventEmitter>,
    selected_item: Mutex<Option<String>>,
}

impl TryOnService<HttpImageLoader> {
    /// 使用默认加载器、示例目录与日志通知创建服务。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use wardrobe_tryon::tryon::{TryOnConfig, TryOnService};
    ///
    /// # async fn demo() -> Result<(), wardrobe_tryon::error::AppError> {
    /// let service = TryOnService::new(TryOnConfig::default())?;
    /// let photo = std::fs::read("me.jpg")?;
    /// service.upload_photo("me.jpg", photo).await?;
    /// service.try_on("1").await?;
    /// service.download_to_dir(std::path::Path::new("."))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: TryOnConfig) -> Result<Self, AppError> {
        config
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        let session = TryOnSession::new(config)?;

        Ok(Self::with_parts(
            session,
            Arc::new(InMemoryCatalog::with_default_items()),
            Arc::new(LogEmitter),
        ))
    }
}

impl<L: ImageLoader> TryOnService<L> {
    pub fn with_parts(
        session: TryOnSession<L>,
        catalog: Arc<dyn CatalogSource>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            session,
            catalog,
            emitter,
            selected_item: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &TryOnSession<L> {
        &self.session
    }

    /// 读取用户选择的照片作为底图。
    pub async fn upload_photo(
        &self,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<(u32, u32), AppError> {
        let upload = UploadedImage::new(file_name, bytes);

        match self.session.load_base_upload(&upload).await {
            Ok(dimensions) => {
                self.set_selected(None)?;
                self.notify(TryOnNotification::success(
                    TryOnAction::Upload,
                    "图片已上传！请选择一件服装进行试穿。",
                ));
                Ok(dimensions)
            }
            Err(err) => {
                self.notify_failure(TryOnAction::Upload, "图片上传失败，请选择有效的图片文件。", &err, None);
                Err(err.into())
            }
        }
    }

    /// 试穿目录中的单品。
    pub async fn try_on(&self, item_id: &str) -> Result<OverlayPlacement, AppError> {
        let item = match self.catalog.find(item_id) {
            Some(item) => item.clone(),
            None => {
                let err = AppError::Catalog(format!("目录中不存在单品：{}", item_id));
                self.notify(
                    TryOnNotification::failed(TryOnAction::Overlay, "试穿失败，请重试。", err.code(), "overlay")
                        .with_item(item_id),
                );
                return Err(err);
            }
        };

        let on_processing = |processing: bool| self.emitter.emit(TryOnEvent::Processing { processing });
        let result = self
            .session
            .apply_overlay_observed(&item, &on_processing)
            .await;

        match result {
            Ok(placement) => {
                self.set_selected(Some(item.id.clone()))?;
                self.notify(
                    TryOnNotification::success(
                        TryOnAction::Overlay,
                        format!("{} 已应用！可下载或尝试其他单品。", item.display_name),
                    )
                    .with_item(item.id.as_str()),
                );
                Ok(placement)
            }
            // 正在进行的叠加仍会提交，保留其选中状态
            Err(err @ TryOnError::Busy) => {
                self.notify_failure(TryOnAction::Overlay, "正在应用服装，请稍候。", &err, Some(item.id.as_str()));
                Err(err.into())
            }
            Err(err @ TryOnError::InvalidTransition { .. }) => {
                self.notify_failure(TryOnAction::Overlay, "请先上传一张照片。", &err, Some(item.id.as_str()));
                Err(err.into())
            }
            Err(err) => {
                self.set_selected(None)?;
                self.notify_failure(TryOnAction::Overlay, "试穿失败，请重试。", &err, Some(item.id.as_str()));
                Err(err.into())
            }
        }
    }

    /// 移除叠加，恢复原始照片。
    pub fn reset(&self) -> Result<(), AppError> {
        match self.session.reset() {
            Ok(()) => {
                self.set_selected(None)?;
                self.notify(TryOnNotification::success(TryOnAction::Reset, "已恢复原始照片。"));
                Ok(())
            }
            Err(err) => {
                self.notify_failure(TryOnAction::Reset, "当前没有可重置的试穿效果。", &err, None);
                Err(err.into())
            }
        }
    }

    /// 导出当前画面。
    pub fn download(&self) -> Result<ExportedImage, AppError> {
        match self.session.export() {
            Ok(exported) => {
                self.notify(TryOnNotification::success(TryOnAction::Export, "图片已下载！"));
                Ok(exported)
            }
            Err(err) => {
                self.notify_failure(TryOnAction::Export, "下载失败，请先上传照片。", &err, None);
                Err(err.into())
            }
        }
    }

    /// 导出当前画面并写入目录。
    pub fn download_to_dir(&self, dir: &Path) -> Result<PathBuf, AppError> {
        let exported = self.download()?;
        exported.write_to_dir(dir).map_err(AppError::from)
    }

    /// 丢弃照片与叠加，回到初始状态。
    pub fn clear(&self) -> Result<(), AppError> {
        self.session.clear()?;
        self.set_selected(None)?;
        self.notify(TryOnNotification::success(TryOnAction::Clear, "已清空试穿画面。"));
        Ok(())
    }

    /// 衣橱单品列表，`None` 表示全部分类。
    pub fn wardrobe_items(&self, category: Option<ClothingCategory>) -> Vec<CatalogItem> {
        match category {
            Some(category) => self
                .catalog
                .by_category(category)
                .into_iter()
                .cloned()
                .collect(),
            None => self.catalog.items().to_vec(),
        }
    }

    /// 当前已成功应用的单品。
    pub fn selected_item(&self) -> Result<Option<CatalogItem>, AppError> {
        let selected = self
            .selected_item
            .lock()
            .map_err(|_| TryOnError::poisoned())?
            .clone();
        Ok(selected.and_then(|id| self.catalog.find(&id).cloned()))
    }

    pub fn is_processing(&self) -> bool {
        self.session.is_processing()
    }

    fn set_selected(&self, item_id: Option<String>) -> Result<(), AppError> {
        let mut guard = self
            .selected_item
            .lock()
            .map_err(|_| TryOnError::poisoned())?;
        *guard = item_id;
        Ok(())
    }

    fn notify(&self, notification: TryOnNotification) {
        self.emitter.emit(TryOnEvent::Status(notification));
    }

    fn notify_failure(
        &self,
        action: TryOnAction,
        message: &str,
        err: &TryOnError,
        item_id: Option<&str>,
    ) {
        let mut notification = TryOnNotification::failed(action, message, err.code(), err.stage());
        notification.item_id = item_id.map(str::to_string);
        self.notify(notification);
    }
}

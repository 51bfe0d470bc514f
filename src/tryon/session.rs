//! # 试穿会话（绘制表面状态机）
//!
//! ## 设计思路
//!
//! `TryOnSession` 独占一块绘制表面，显式维护 `Empty → BaseLoaded → Composited`
//! 状态迁移，所有错误都在会话边界恢复，画面始终停留在最后一次有效帧。
//!
//! ## 实现思路
//!
//! - **忙碌标志 + RAII Guard**：`apply_overlay` 期间持有 `ProcessingGuard`，
//!   任意退出路径（成功、失败、提前返回）都会在 `Drop` 时释放标志；
//!   挂接的观察者只在抢到标志且状态校验通过后收到 `true`，释放时收到 `false`
//! - **过期结果保护**：`generation` 计数器在底图提交与 `clear` 时递增，
//!   异步加载完成后先比对计数器，不一致则丢弃结果，不触碰表面
//! - **最新底图优先**：每次 `load_base` 开始时领取 `base_request` 序号，
//!   只有最后一次发起的底图请求可以提交，先发起但后完成的请求被丢弃
//! - **锁不跨越 await**：内部状态只在同步片段中加锁，加载期间不持有任何锁
//! - **加载超时**：所有加载都包在 `tokio::time::timeout` 中，避免忙碌状态无限期占用

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use image::RgbaImage;

use super::compositor::{self, OverlayPlacement};
use super::export::{ExportedImage, encode_frame};
use super::loader::{HttpImageLoader, ImageLoader};
use super::source::{SourceImage, UploadedImage};
use super::surface::{DrawingSurface, SurfaceState};
use super::{LoadError, TryOnConfig, TryOnError};
use crate::catalog::CatalogItem;

#[derive(Debug, Default)]
struct SessionInner {
    state: SurfaceState,
    /// 保留的原始底图，与表面分开保存，用于重绘与重置。
    base: Option<Arc<SourceImage>>,
    surface: DrawingSurface,
    active_overlay: Option<CatalogItem>,
}

/// 忙碌状态观察者，参数为新的忙碌状态。
pub type ProcessingObserver<'a> = &'a (dyn Fn(bool) + Sync);

/// 忙碌标志守卫：构造时抢占标志，`Drop` 时自动释放。
struct ProcessingGuard<'a> {
    flag: &'a AtomicBool,
    observer: Option<ProcessingObserver<'a>>,
}

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self {
                flag,
                observer: None,
            })
    }

    /// 挂接观察者并立即通知 `true`。
    fn attach(&mut self, observer: Option<ProcessingObserver<'a>>) {
        if let Some(observer) = observer {
            observer(true);
            self.observer = Some(observer);
        }
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        // 先通知再释放，后一个持有者的 `true` 不会被这里的 `false` 覆盖
        if let Some(observer) = self.observer.take() {
            observer(false);
        }
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// 单个试穿视图的会话状态。
pub struct TryOnSession<L: ImageLoader = HttpImageLoader> {
    loader: L,
    config: Arc<TryOnConfig>,
    inner: Mutex<SessionInner>,
    processing: AtomicBool,
    generation: AtomicU64,
    base_request: AtomicU64,
}

impl TryOnSession<HttpImageLoader> {
    /// 使用默认加载器创建会话。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use wardrobe_tryon::tryon::{TryOnConfig, TryOnSession};
    ///
    /// let session = TryOnSession::new(TryOnConfig::default())?;
    /// # Ok::<(), wardrobe_tryon::tryon::TryOnError>(())
    /// ```
    pub fn new(config: TryOnConfig) -> Result<Self, TryOnError> {
        config
            .validate()
            .map_err(|e| TryOnError::Internal(format!("配置无效：{}", e)))?;

        let config = Arc::new(config);
        let loader = HttpImageLoader::new(Arc::clone(&config))
            .map_err(|e| TryOnError::Internal(e.to_string()))?;

        Ok(Self::from_parts(loader, config))
    }
}

impl<L: ImageLoader> TryOnSession<L> {
    /// 注入自定义加载器（测试或其他来源），配置校验规则与 `new` 相同。
    pub fn with_loader(loader: L, config: TryOnConfig) -> Result<Self, TryOnError> {
        config
            .validate()
            .map_err(|e| TryOnError::Internal(format!("配置无效：{}", e)))?;
        Ok(Self::from_parts(loader, Arc::new(config)))
    }

    fn from_parts(loader: L, config: Arc<TryOnConfig>) -> Self {
        Self {
            loader,
            config,
            inner: Mutex::new(SessionInner::default()),
            processing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            base_request: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &TryOnConfig {
        &self.config
    }

    /// 加载底图，任意状态均可调用。
    ///
    /// 成功后替换保留的底图并重绘表面，状态迁移到 `BaseLoaded`；
    /// 失败返回 `TryOnError::Decode`，状态与画面保持不变。
    /// 并发发起多次时只有最后一次可以提交，其余返回 `TryOnError::Stale`。
    pub async fn load_base(&self, locator: &str) -> Result<(u32, u32), TryOnError> {
        let ticket = self.base_request.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.load(Ordering::SeqCst);
        let start = Instant::now();

        let image = self
            .load_with_timeout(locator)
            .await
            .map_err(|err| {
                log::warn!("⚠️ 底图加载失败：{}", err);
                TryOnError::Decode(err)
            })?;

        let mut inner = self.lock_inner()?;
        if self.base_request.load(Ordering::SeqCst) != ticket {
            log::debug!("⏭️ 已有更新的底图请求，丢弃第 {} 次请求的结果", ticket);
            return Err(TryOnError::Stale);
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            log::debug!("⏭️ 底图加载完成时会话已变更，丢弃结果");
            return Err(TryOnError::Stale);
        }
        self.generation.fetch_add(1, Ordering::SeqCst);

        let image = Arc::new(image);
        inner.surface.draw_base(&image);
        inner.base = Some(Arc::clone(&image));
        inner.active_overlay = None;
        inner.state = SurfaceState::BaseLoaded;

        log::info!(
            "🖼️ 底图已加载 - 尺寸: {}x{} 耗时: {:?}",
            image.width(),
            image.height(),
            start.elapsed()
        );

        Ok(image.dimensions())
    }

    /// 加载用户上传的本地图片作为底图。
    pub async fn load_base_upload(&self, upload: &UploadedImage) -> Result<(u32, u32), TryOnError> {
        let locator = upload.to_data_uri().map_err(TryOnError::Decode)?;
        log::debug!(
            "📤 读取上传文件 - 名称: {} 大小: {} 字节",
            upload.file_name,
            upload.bytes.len()
        );
        self.load_base(&locator).await
    }

    /// 将服装叠加到底图上，仅允许在 `BaseLoaded` / `Composited` 状态调用。
    ///
    /// 先重绘底图再加载叠加图：加载失败时画面只显示底图，
    /// 状态为无激活服装的 `Composited`，并返回 `TryOnError::Load`。
    pub async fn apply_overlay(&self, item: &CatalogItem) -> Result<OverlayPlacement, TryOnError> {
        self.run_overlay(item, None).await
    }

    /// 同 `apply_overlay`，并把忙碌状态变化通知给 `on_processing`。
    ///
    /// 被拒绝的调用（`Busy` 或非法状态）不会触发任何通知。
    pub async fn apply_overlay_observed(
        &self,
        item: &CatalogItem,
        on_processing: ProcessingObserver<'_>,
    ) -> Result<OverlayPlacement, TryOnError> {
        self.run_overlay(item, Some(on_processing)).await
    }

    async fn run_overlay<'a>(
        &'a self,
        item: &CatalogItem,
        observer: Option<ProcessingObserver<'a>>,
    ) -> Result<OverlayPlacement, TryOnError> {
        let mut processing = ProcessingGuard::acquire(&self.processing).ok_or(TryOnError::Busy)?;
        let start = Instant::now();

        let (base, generation) = {
            let mut inner = self.lock_inner()?;
            if !matches!(inner.state, SurfaceState::BaseLoaded | SurfaceState::Composited) {
                return Err(TryOnError::invalid("apply_overlay", inner.state));
            }

            let base = inner
                .base
                .clone()
                .ok_or_else(|| TryOnError::Internal("缺少保留的底图".to_string()))?;
            compositor::prepare_surface(&mut inner.surface, &base);
            (base, self.generation.load(Ordering::SeqCst))
        };
        processing.attach(observer);

        log::debug!(
            "👕 开始叠加服装 - id: {} 名称: {}",
            item.id,
            item.display_name
        );
        let result = self.load_with_timeout(&item.image_locator).await;

        let mut inner = self.lock_inner()?;
        if self.generation.load(Ordering::SeqCst) != generation {
            log::debug!("⏭️ 服装 {} 加载完成时底图已变更，丢弃结果", item.id);
            return Err(TryOnError::Stale);
        }

        inner.state = SurfaceState::Composited;
        inner.active_overlay = None;

        let overlay = result.map_err(|err| {
            log::warn!("⚠️ 服装 {} 加载失败，画面退化为仅显示底图：{}", item.id, err);
            TryOnError::Load(err)
        })?;

        let placement = compositor::apply_overlay(&mut inner.surface, &base, &overlay, &self.config)
            .ok_or_else(|| TryOnError::Internal("绘制表面不可用".to_string()))?;
        inner.active_overlay = Some(item.clone());

        log::info!(
            "✅ 服装已叠加 - id: {} 矩形: ({:.1}, {:.1}, {:.1}x{:.1}) 耗时: {:?}",
            item.id,
            placement.x,
            placement.y,
            placement.width,
            placement.height,
            start.elapsed()
        );

        Ok(placement)
    }

    /// 从保留的底图重绘表面，仅允许在 `Composited` 状态调用。
    pub fn reset(&self) -> Result<(), TryOnError> {
        if self.is_processing() {
            return Err(TryOnError::Busy);
        }

        let mut inner = self.lock_inner()?;
        if inner.state != SurfaceState::Composited {
            return Err(TryOnError::invalid("reset", inner.state));
        }

        let base = inner
            .base
            .clone()
            .ok_or_else(|| TryOnError::Internal("缺少保留的底图".to_string()))?;
        inner.surface.draw_base(&base);
        inner.active_overlay = None;
        inner.state = SurfaceState::BaseLoaded;

        log::info!("↩️ 已重置为原始底图");
        Ok(())
    }

    /// 丢弃底图与表面，回到 `Empty`，任意状态均可调用。
    pub fn clear(&self) -> Result<(), TryOnError> {
        let mut inner = self.lock_inner()?;
        self.generation.fetch_add(1, Ordering::SeqCst);

        inner.surface.clear();
        inner.base = None;
        inner.active_overlay = None;
        inner.state = SurfaceState::Empty;

        log::info!("🧹 试穿会话已清空");
        Ok(())
    }

    /// 编码当前画面，只读不修改。
    ///
    /// `Empty` 状态直接返回 `TryOnError::Export`，不执行任何编码。
    pub fn export(&self) -> Result<ExportedImage, TryOnError> {
        let frame = {
            let inner = self.lock_inner()?;
            if !inner.state.has_content() {
                return Err(TryOnError::Export("画面为空，没有可导出的内容".to_string()));
            }
            if self.is_processing() {
                return Err(TryOnError::Busy);
            }
            inner
                .surface
                .pixels()
                .cloned()
                .ok_or_else(|| TryOnError::Export("绘制表面不可用".to_string()))?
        };

        encode_frame(&frame, &self.config)
    }

    pub fn state(&self) -> Result<SurfaceState, TryOnError> {
        Ok(self.lock_inner()?.state)
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    pub fn active_overlay(&self) -> Result<Option<CatalogItem>, TryOnError> {
        Ok(self.lock_inner()?.active_overlay.clone())
    }

    /// 当前画面像素的拷贝。
    pub fn frame(&self) -> Result<Option<RgbaImage>, TryOnError> {
        Ok(self.lock_inner()?.surface.pixels().cloned())
    }

    pub fn dimensions(&self) -> Result<Option<(u32, u32)>, TryOnError> {
        Ok(self.lock_inner()?.surface.dimensions())
    }

    async fn load_with_timeout(&self, locator: &str) -> Result<SourceImage, LoadError> {
        let timeout = self.config.load_timeout();
        match tokio::time::timeout(timeout, self.loader.load(locator)).await {
            Ok(result) => result,
            Err(_) => Err(LoadError::Timeout(format!(
                "图片加载超时（{} ms）",
                timeout.as_millis()
            ))),
        }
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, SessionInner>, TryOnError> {
        self.inner.lock().map_err(|_| TryOnError::poisoned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ClothingCategory;
    use image::Rgba;
    use std::collections::HashMap;
    use tokio::sync::Notify;

    fn solid(width: u32, height: u32, px: [u8; 4]) -> SourceImage {
        SourceImage::from_rgba(RgbaImage::from_pixel(width, height, Rgba(px))).expect("non-empty image")
    }

    fn item(id: &str, locator: &str) -> CatalogItem {
        CatalogItem {
            id: id.to_string(),
            display_name: format!("item-{}", id),
            category: ClothingCategory::Shirts,
            image_locator: locator.to_string(),
        }
    }

    /// 按定位符返回预置图片；命中 `gated` 时等待放行。
    #[derive(Default)]
    struct StubLoader {
        images: HashMap<String, SourceImage>,
        gated: Option<String>,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl StubLoader {
        fn with(mut self, locator: &str, image: SourceImage) -> Self {
            self.images.insert(locator.to_string(), image);
            self
        }

        fn gate(mut self, locator: &str) -> Self {
            self.gated = Some(locator.to_string());
            self
        }
    }

    impl ImageLoader for StubLoader {
        async fn load(&self, locator: &str) -> Result<SourceImage, LoadError> {
            if self.gated.as_deref() == Some(locator) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.images
                .get(locator)
                .cloned()
                .ok_or_else(|| LoadError::Network(format!("unreachable: {}", locator)))
        }
    }

    fn base_loader() -> StubLoader {
        StubLoader::default()
            .with("base", solid(100, 100, [0, 0, 255, 255]))
            .with("red", solid(60, 120, [255, 0, 0, 255]))
            .with("green", solid(60, 30, [0, 255, 0, 255]))
            .with("base2", solid(50, 40, [255, 255, 0, 255]))
    }

    #[tokio::test]
    async fn operations_follow_state_machine() {
        let session =
            TryOnSession::with_loader(base_loader(), TryOnConfig::default()).expect("session init failed");
        assert_eq!(session.state().expect("state"), SurfaceState::Empty);

        let err = session.apply_overlay(&item("1", "red")).await.expect_err("empty surface");
        assert!(matches!(err, TryOnError::InvalidTransition { operation: "apply_overlay", .. }));
        assert!(matches!(session.reset(), Err(TryOnError::InvalidTransition { .. })));

        session.load_base("base").await.expect("load base failed");
        assert_eq!(session.state().expect("state"), SurfaceState::BaseLoaded);
        assert!(matches!(session.reset(), Err(TryOnError::InvalidTransition { .. })));

        session.apply_overlay(&item("1", "red")).await.expect("overlay failed");
        assert_eq!(session.state().expect("state"), SurfaceState::Composited);
        assert_eq!(session.active_overlay().expect("overlay").map(|i| i.id), Some("1".to_string()));

        session.reset().expect("reset failed");
        assert_eq!(session.state().expect("state"), SurfaceState::BaseLoaded);
        assert!(session.active_overlay().expect("overlay").is_none());

        session.clear().expect("clear failed");
        assert_eq!(session.state().expect("state"), SurfaceState::Empty);
        assert_eq!(session.dimensions().expect("dimensions"), None);
    }

    #[tokio::test]
    async fn failed_base_load_keeps_previous_frame() {
        let session =
            TryOnSession::with_loader(base_loader(), TryOnConfig::default()).expect("session init failed");
        session.load_base("base").await.expect("load base failed");
        session.apply_overlay(&item("1", "red")).await.expect("overlay failed");
        let before = session.frame().expect("frame");

        let err = session.load_base("missing").await.expect_err("missing base");
        assert_eq!(err.code(), "E_DECODE");
        assert_eq!(session.state().expect("state"), SurfaceState::Composited);
        assert_eq!(session.frame().expect("frame"), before);
    }

    #[tokio::test]
    async fn unreachable_overlay_degrades_to_base_only() {
        let session =
            TryOnSession::with_loader(base_loader(), TryOnConfig::default()).expect("session init failed");
        session.load_base("base").await.expect("load base failed");
        let base_frame = session.frame().expect("frame");

        session.apply_overlay(&item("1", "red")).await.expect("overlay failed");
        let err = session.apply_overlay(&item("2", "missing")).await.expect_err("missing overlay");

        assert_eq!(err.code(), "E_LOAD");
        assert_eq!(session.state().expect("state"), SurfaceState::Composited);
        assert!(session.active_overlay().expect("overlay").is_none());
        assert_eq!(session.frame().expect("frame"), base_frame);
        assert!(!session.is_processing());

        session.reset().expect("reset from degraded state");
        assert_eq!(session.state().expect("state"), SurfaceState::BaseLoaded);
    }

    #[tokio::test]
    async fn second_overlay_while_busy_is_rejected() {
        let loader = Arc::new(base_loader().gate("red"));
        let session = Arc::new(
            TryOnSession::with_loader(Arc::clone(&loader), TryOnConfig::default())
                .expect("session init failed"),
        );
        session.load_base("base").await.expect("load base failed");

        let running = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.apply_overlay(&item("1", "red")).await })
        };
        loader.entered.notified().await;

        assert!(session.is_processing());
        assert!(matches!(session.apply_overlay(&item("2", "green")).await, Err(TryOnError::Busy)));
        assert!(matches!(session.reset(), Err(TryOnError::Busy)));
        assert!(matches!(session.export(), Err(TryOnError::Busy)));

        loader.release.notify_one();
        running
            .await
            .expect("task panicked")
            .expect("gated overlay failed");

        assert!(!session.is_processing());
        assert_eq!(session.active_overlay().expect("overlay").map(|i| i.id), Some("1".to_string()));
    }

    #[tokio::test]
    async fn late_overlay_after_clear_is_discarded() {
        let loader = Arc::new(base_loader().gate("red"));
        let session = Arc::new(
            TryOnSession::with_loader(Arc::clone(&loader), TryOnConfig::default())
                .expect("session init failed"),
        );
        session.load_base("base").await.expect("load base failed");

        let running = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.apply_overlay(&item("1", "red")).await })
        };
        loader.entered.notified().await;

        session.clear().expect("clear failed");
        loader.release.notify_one();

        let result = running.await.expect("task panicked");
        assert!(matches!(result, Err(TryOnError::Stale)));
        assert_eq!(session.state().expect("state"), SurfaceState::Empty);
        assert_eq!(session.frame().expect("frame"), None);
        assert!(!session.is_processing());
    }

    #[tokio::test]
    async fn hanging_overlay_load_times_out() {
        let mut config = TryOnConfig::default();
        config.load_timeout_ms = 150;

        let session =
            TryOnSession::with_loader(base_loader().gate("red"), config).expect("session init failed");
        session.load_base("base").await.expect("load base failed");

        let err = session.apply_overlay(&item("1", "red")).await.expect_err("should time out");
        assert_eq!(err.code(), "E_TIMEOUT");
        assert!(!session.is_processing());
        assert_eq!(session.state().expect("state"), SurfaceState::Composited);
    }

    #[test]
    fn invalid_config_is_rejected_for_custom_loader() {
        let mut config = TryOnConfig::default();
        config.layout.opacity = 2.0;

        let err = TryOnSession::with_loader(base_loader(), config).err().expect("opacity 2.0 accepted");
        assert_eq!(err.code(), "E_INTERNAL");
    }

    #[tokio::test]
    async fn clear_during_base_load_discards_the_base() {
        let loader = Arc::new(base_loader().gate("base"));
        let session = Arc::new(
            TryOnSession::with_loader(Arc::clone(&loader), TryOnConfig::default())
                .expect("session init failed"),
        );

        let running = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.load_base("base").await })
        };
        loader.entered.notified().await;

        session.clear().expect("clear failed");
        loader.release.notify_one();

        let result = running.await.expect("task panicked");
        assert!(matches!(result, Err(TryOnError::Stale)));
        assert_eq!(session.state().expect("state"), SurfaceState::Empty);
        assert_eq!(session.frame().expect("frame"), None);
    }

    #[tokio::test]
    async fn new_base_during_overlay_load_wins() {
        let loader = Arc::new(base_loader().gate("red"));
        let session = Arc::new(
            TryOnSession::with_loader(Arc::clone(&loader), TryOnConfig::default())
                .expect("session init failed"),
        );
        session.load_base("base").await.expect("load base failed");

        let running = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.apply_overlay(&item("1", "red")).await })
        };
        loader.entered.notified().await;

        assert_eq!(session.load_base("base2").await.expect("second base failed"), (50, 40));
        let base2_frame = session.frame().expect("frame");
        loader.release.notify_one();

        let result = running.await.expect("task panicked");
        assert!(matches!(result, Err(TryOnError::Stale)));
        assert_eq!(session.state().expect("state"), SurfaceState::BaseLoaded);
        assert_eq!(session.frame().expect("frame"), base2_frame);
        assert!(session.active_overlay().expect("overlay").is_none());
        assert!(!session.is_processing());
    }

    #[tokio::test]
    async fn latest_base_request_wins_over_slower_earlier_one() {
        let loader = Arc::new(base_loader().gate("base"));
        let session = Arc::new(
            TryOnSession::with_loader(Arc::clone(&loader), TryOnConfig::default())
                .expect("session init failed"),
        );

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.load_base("base").await })
        };
        loader.entered.notified().await;

        session.load_base("base2").await.expect("second base failed");
        loader.release.notify_one();

        let result = first.await.expect("task panicked");
        assert!(matches!(result, Err(TryOnError::Stale)));
        assert_eq!(session.dimensions().expect("dimensions"), Some((50, 40)));
        assert_eq!(session.state().expect("state"), SurfaceState::BaseLoaded);
    }

    #[tokio::test]
    async fn observer_only_sees_accepted_overlays() {
        let session =
            TryOnSession::with_loader(base_loader(), TryOnConfig::default()).expect("session init failed");
        let seen = Mutex::new(Vec::new());
        let record = |processing: bool| seen.lock().expect("observer lock").push(processing);

        let err = session
            .apply_overlay_observed(&item("1", "red"), &record)
            .await
            .expect_err("empty surface");
        assert!(matches!(err, TryOnError::InvalidTransition { .. }));
        assert!(seen.lock().expect("observer lock").is_empty());

        session.load_base("base").await.expect("load base failed");
        session
            .apply_overlay_observed(&item("1", "red"), &record)
            .await
            .expect("overlay failed");
        session
            .apply_overlay_observed(&item("2", "missing"), &record)
            .await
            .expect_err("missing overlay");

        assert_eq!(*seen.lock().expect("observer lock"), vec![true, false, true, false]);
    }

    #[tokio::test]
    async fn export_on_empty_surface_fails() {
        let session =
            TryOnSession::with_loader(base_loader(), TryOnConfig::default()).expect("session init failed");
        let err = session.export().expect_err("empty export");
        assert_eq!(err.code(), "E_EXPORT");
    }
}

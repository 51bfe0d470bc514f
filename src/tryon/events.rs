//! # UI 信号模块
//!
//! ## 设计思路
//!
//! 会话本身不关心通知如何展示，只通过 `EventEmitter` 向外发出两类信号：
//! - `tryon-status`：上传、叠加、重置、导出、清空的成功/失败通知
//! - `tryon-processing`：叠加进行中的忙碌指示
//!
//! 默认的 `LogEmitter` 只写日志；`ChannelEmitter` 把事件推入 tokio 通道，
//! 由宿主 UI 自行消费。

use serde::Serialize;
use tokio::sync::mpsc;

pub const TRYON_STATUS_EVENT: &str = "tryon-status";
pub const TRYON_PROCESSING_EVENT: &str = "tryon-processing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TryOnAction {
    Upload,
    Overlay,
    Reset,
    Export,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Success,
    Failed,
}

/// 面向用户的提示通知。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TryOnNotification {
    pub action: TryOnAction,
    pub status: NotificationStatus,
    pub message: String,
    pub item_id: Option<String>,
    pub error_code: Option<&'static str>,
    pub stage: Option<&'static str>,
    pub timestamp_ms: i64,
}

impl TryOnNotification {
    pub fn success(action: TryOnAction, message: impl Into<String>) -> Self {
        Self {
            action,
            status: NotificationStatus::Success,
            message: message.into(),
            item_id: None,
            error_code: None,
            stage: None,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn failed(
        action: TryOnAction,
        message: impl Into<String>,
        error_code: &'static str,
        stage: &'static str,
    ) -> Self {
        Self {
            action,
            status: NotificationStatus::Failed,
            message: message.into(),
            item_id: None,
            error_code: Some(error_code),
            stage: Some(stage),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_item(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TryOnEvent {
    Status(TryOnNotification),
    Processing { processing: bool },
}

impl TryOnEvent {
    /// 事件名，供宿主按名称分发。
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status(_) => TRYON_STATUS_EVENT,
            Self::Processing { .. } => TRYON_PROCESSING_EVENT,
        }
    }
}

pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: TryOnEvent);
}

/// 仅记录日志的默认发送器。
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEmitter;

impl EventEmitter for LogEmitter {
    fn emit(&self, event: TryOnEvent) {
        match &event {
            TryOnEvent::Status(n) if n.status == NotificationStatus::Failed => {
                log::warn!("❌ [{}] {:?}: {}", event.name(), n.action, n.message);
            }
            TryOnEvent::Status(n) => {
                log::info!("🔔 [{}] {:?}: {}", event.name(), n.action, n.message);
            }
            TryOnEvent::Processing { processing } => {
                log::debug!("⏳ [{}] processing={}", event.name(), processing);
            }
        }
    }
}

/// 通过 tokio 无界通道转发事件。
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    sender: mpsc::UnboundedSender<TryOnEvent>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TryOnEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&self, event: TryOnEvent) {
        // 接收端已关闭时直接丢弃
        let _ = self.sender.send(event);
    }
}

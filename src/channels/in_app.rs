//! 应用内渠道 - 实时列表与 toast 提示
//!
//! 不做额外持久化；持久化由通知记录存储负责。

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::{ChannelKind, NotificationChannel, SendResult};
use crate::error::Result;
use crate::store::{Notification, NotificationType};

/// 一条 toast 提示
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toast {
    pub notification_id: String,
    pub title: String,
    pub description: String,
    /// error 类型使用醒目（destructive）样式
    pub destructive: bool,
    pub timestamp: DateTime<Utc>,
}

/// 应用内渠道
#[derive(Default)]
pub struct InAppChannel {
    live: Mutex<Vec<Notification>>,
    toasts: Mutex<Vec<Toast>>,
}

impl InAppChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 弹出 toast（fire-and-forget，永不失败）
    pub fn toast(&self, notification: &Notification) {
        let toast = Toast {
            notification_id: notification.id.clone(),
            title: notification.title.clone(),
            description: notification.description.clone(),
            destructive: notification.notification_type == NotificationType::Error,
            timestamp: Utc::now(),
        };
        debug!(id = %toast.notification_id, destructive = toast.destructive, "Toast surfaced");
        lock(&self.toasts).push(toast);
    }

    /// 实时列表快照（最新在前）
    pub fn live_list(&self) -> Vec<Notification> {
        lock(&self.live).clone()
    }

    /// 已弹出的 toast（按时间顺序）
    pub fn toasts(&self) -> Vec<Toast> {
        lock(&self.toasts).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl NotificationChannel for InAppChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::InApp
    }

    fn send(&self, notification: &Notification) -> Result<SendResult> {
        lock(&self.live).insert(0, notification.clone());
        Ok(SendResult::Sent)
    }

    fn send_async(&self, notification: &Notification) -> Result<()> {
        // 内存操作很快，直接同步执行
        let _ = self.send(notification)?;
        Ok(())
    }
}

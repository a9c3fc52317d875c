//! 推送渠道 - 将通知转成结构化 payload 交给订阅管理器投递

use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::channel::{ChannelKind, NotificationChannel, SendResult};
use crate::error::Result;
use crate::push::{PushAction, PushData, PushPayload, PushSubscriptionManager};
use crate::store::Notification;

/// 推送渠道
pub struct PushChannel {
    manager: Arc<Mutex<PushSubscriptionManager>>,
}

impl PushChannel {
    pub fn new(manager: Arc<Mutex<PushSubscriptionManager>>) -> Self {
        Self { manager }
    }

    /// 由通知构造推送 payload
    pub fn build_payload(notification: &Notification) -> PushPayload {
        let actions = match (&notification.action_url, &notification.action_label) {
            (Some(_), Some(label)) => vec![PushAction {
                action: "open".to_string(),
                title: label.clone(),
            }],
            _ => Vec::new(),
        };
        PushPayload {
            title: notification.title.clone(),
            body: notification.description.clone(),
            data: PushData {
                notification_id: notification.id.clone(),
                category: notification.category.as_str().to_string(),
                action_url: notification.action_url.clone(),
            },
            actions,
        }
    }
}

impl NotificationChannel for PushChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Push
    }

    fn send(&self, notification: &Notification) -> Result<SendResult> {
        let payload = Self::build_payload(notification);
        let manager = self
            .manager
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !manager.is_subscribed() {
            // 未订阅属于预期内的不投递
            return Ok(SendResult::Skipped("push not subscribed".to_string()));
        }

        match manager.send_business_message(&payload) {
            Ok(()) => Ok(SendResult::Sent),
            Err(e) => Ok(SendResult::Failed(e.to_string())),
        }
    }

    fn send_async(&self, notification: &Notification) -> Result<()> {
        let manager = self.manager.clone();
        let payload = Self::build_payload(notification);
        let id = notification.id.clone();

        // 发出后立即返回，不阻塞调用方
        std::thread::spawn(move || {
            let manager = manager.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if !manager.is_subscribed() {
                return;
            }
            if let Err(e) = manager.send_business_message(&payload) {
                warn!(channel = "push", id = %id, error = %e, "Async push delivery failed");
            }
        });
        Ok(())
    }
}
